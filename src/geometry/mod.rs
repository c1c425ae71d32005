//! Geometry utilities for domain-mesher.
//!
//! This module provides the bounding-box arithmetic the domain synthesizer
//! and entity resolver run on top of kernel queries.

pub mod bbox;

pub use bbox::BoundingBox;
