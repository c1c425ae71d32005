//! Kernel entity handles.
//!
//! The pipeline never owns geometry; it only holds `(dimension, tag)`
//! references into the engine's model and sets of them.

pub mod entity;

pub use entity::{DimTag, EntitySet, MAX_DIM};
