//! Geometry/mesh engine capability surface.
//!
//! The pipeline never talks to a CAD kernel directly. It drives a
//! [`GeometryEngine`]: an explicit session object owning one model, passed by
//! `&mut` through every stage. Each call is synchronous and blocking; any
//! parallelism lives inside the engine and is configured once through
//! [`GeometryEngine::set_option`] before geometry is touched.
//!
//! [`memory::InMemoryEngine`] is the bundled reference kernel for scenes of
//! axis-aligned primitives. Bindings to a full CAD kernel implement the same
//! trait.

pub mod memory;
pub mod scene;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;
use crate::mesh_error::MesherError;
use crate::topology::{DimTag, EntitySet};

pub use memory::{FaultPlan, InMemoryEngine};

/// Value of a global engine option.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Number(f64),
    Text(String),
}

impl OptionValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            OptionValue::Number(n) => Some(*n),
            OptionValue::Text(_) => None,
        }
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Number(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Number(v as f64)
    }
}

impl From<usize> for OptionValue {
    fn from(v: usize) -> Self {
        OptionValue::Number(v as f64)
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Number(if v { 1.0 } else { 0.0 })
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

/// Opaque identifier of a registered mesh-size or boundary-layer field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FieldHandle(pub i32);

impl fmt::Display for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field types the pipeline registers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Distance,
    Threshold,
    BoundaryLayer,
    Min,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Distance => "Distance",
            FieldKind::Threshold => "Threshold",
            FieldKind::BoundaryLayer => "BoundaryLayer",
            FieldKind::Min => "Min",
        }
    }
}

/// Flags for a boundary query.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BoundaryQuery {
    /// Descend to every lower dimension instead of stopping at `dim - 1`.
    pub recursive: bool,
    /// Treat the input as one shape: boundary entities shared by two inputs cancel.
    pub combined: bool,
    /// Report orientation through the sign of returned tags.
    pub oriented: bool,
}

impl BoundaryQuery {
    /// Per-entity boundary, one level down, unoriented.
    pub const fn per_entity() -> Self {
        BoundaryQuery {
            recursive: false,
            combined: false,
            oriented: false,
        }
    }

    /// Combined boundary of the whole set, one level down, unoriented.
    pub const fn combined() -> Self {
        BoundaryQuery {
            recursive: false,
            combined: true,
            oriented: false,
        }
    }

    pub const fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }
}

/// Repair operations requested from [`GeometryEngine::heal`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealFlags {
    pub fix_degenerated: bool,
    pub fix_small_edges: bool,
    pub fix_small_faces: bool,
    pub sew_faces: bool,
    pub make_solids: bool,
}

impl Default for HealFlags {
    fn default() -> Self {
        HealFlags {
            fix_degenerated: true,
            fix_small_edges: true,
            fix_small_faces: true,
            sew_faces: true,
            make_solids: true,
        }
    }
}

/// Result of a boolean fragmentation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FragmentOutput {
    /// Top-level entities of the fragmented model.
    pub entities: EntitySet,
    /// One entry per input, objects first then tools, listing the
    /// entities that input ended up as.
    pub per_input: Vec<EntitySet>,
}

/// Capabilities the pipeline consumes from a geometry/mesh kernel.
pub trait GeometryEngine {
    /// Sets a global option (thread count, tolerances, algorithm selectors).
    fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), MesherError>;

    /// Reads an exchange file into the current model.
    fn import(&mut self, path: &Path) -> Result<(), MesherError>;

    /// All entities, or those of one dimension, ordered by dimension then tag.
    fn entities(&self, dim: Option<u8>) -> EntitySet;

    /// Box of one entity, or of the whole model when `entity` is `None`.
    fn bounding_box(&self, entity: Option<DimTag>) -> Result<BoundingBox, MesherError>;

    /// Adds an axis-aligned box volume.
    fn add_box(&mut self, bbox: &BoundingBox) -> Result<DimTag, MesherError>;

    /// Closes `surfaces` into a surface loop and builds a volume from it.
    fn add_volume_from_surfaces(&mut self, surfaces: &EntitySet) -> Result<DimTag, MesherError>;

    /// Conformal boolean fragmentation of `objects` by `tools`.
    fn fragment(
        &mut self,
        objects: &EntitySet,
        tools: &EntitySet,
    ) -> Result<FragmentOutput, MesherError>;

    fn boundary(&self, entities: &EntitySet, query: BoundaryQuery)
    -> Result<EntitySet, MesherError>;

    /// In-place repair of `entities`; returns the repaired entities.
    fn heal(
        &mut self,
        entities: &EntitySet,
        tolerance: f64,
        flags: HealFlags,
    ) -> Result<EntitySet, MesherError>;

    fn add_physical_group(&mut self, dim: u8, tags: &[i32], name: &str)
    -> Result<i32, MesherError>;

    fn add_field(&mut self, kind: FieldKind) -> Result<FieldHandle, MesherError>;

    fn set_field_number(
        &mut self,
        field: FieldHandle,
        property: &str,
        value: f64,
    ) -> Result<(), MesherError>;

    fn set_field_numbers(
        &mut self,
        field: FieldHandle,
        property: &str,
        values: &[f64],
    ) -> Result<(), MesherError>;

    fn set_field_string(
        &mut self,
        field: FieldHandle,
        property: &str,
        value: &str,
    ) -> Result<(), MesherError>;

    /// Makes `field` the single active background size field.
    fn set_background_field(&mut self, field: FieldHandle) -> Result<(), MesherError>;

    fn set_boundary_layer_field(&mut self, field: FieldHandle) -> Result<(), MesherError>;

    /// Generates the mesh up to `dim` (1, 2 or 3).
    fn generate(&mut self, dim: u8) -> Result<(), MesherError>;

    fn export_mesh(&mut self, path: &Path, binary: bool, version: f64)
    -> Result<(), MesherError>;

    /// Opens the engine's interactive viewer, if it has one.
    fn run_gui(&mut self) -> Result<(), MesherError> {
        Ok(())
    }
}
