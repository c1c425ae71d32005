//! Mesh artifact I/O.
//!
//! The pipeline only decides *where* and *how* a mesh is written; the engine
//! owns the write. This module holds the `.msh` codec used by the in-memory
//! kernel and by tests that inspect exported files.

pub mod gmsh;

pub use gmsh::{ElementKind, GmshReader, GmshWriter, MshDocument, MshElement};
