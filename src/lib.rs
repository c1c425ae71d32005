#![cfg_attr(docsrs, feature(doc_cfg))]
//! # domain-mesher
//!
//! domain-mesher turns an imported CAD solid into a CFD-ready fluid domain:
//! it wraps the solid in a far-field box, fragments the two into a conformal
//! topology, works out which entities are the fluid, the wetted (intake)
//! walls and their bounding curves, and configures a graded size field and
//! a boundary-layer field before driving staged mesh generation.
//!
//! Boolean algebra, healing and element generation belong to the geometry
//! kernel behind the [`engine::GeometryEngine`] trait. This crate decides
//! which entities to hand the kernel and how to configure it.
//!
//! ## Features
//! - Tiered entity resolution with explicit, ordered fallbacks
//! - Degenerate-aware far-field box synthesis
//! - Best-effort healing that never fails a run
//! - 2D algorithm fallback and `_debug` partial dumps on meshing failure
//! - A deterministic in-memory kernel ([`engine::InMemoryEngine`]) for
//!   axis-aligned scenes, with fault injection for testing fallbacks
//!
//! ## Determinism
//!
//! Identical input and configuration produce identical entity tags and
//! field parameters: every resolution tier breaks ties by ascending tag.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use domain_mesher::prelude::*;
//!
//! let mut engine = InMemoryEngine::new();
//! let report = run_pipeline(
//!     &mut engine,
//!     Path::new("part.json"),
//!     Path::new("part.msh"),
//!     &PipelineConfig::default(),
//! )?;
//! println!("{} intake surfaces", report.resolution.intake.entities.len());
//! # Ok::<(), MesherError>(())
//! ```

pub mod config;
pub mod engine;
pub mod geometry;
pub mod io;
pub mod mesh_error;
pub mod pipeline;
pub mod topology;

pub use mesh_error::MesherError;
pub use pipeline::{PipelineReport, run_pipeline};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::config::{
        BoundaryLayerConfig, HealOptions, IntersectionMode, MeshOptions, PipelineConfig,
    };
    pub use crate::engine::{
        BoundaryQuery, FaultPlan, FieldHandle, FieldKind, GeometryEngine, HealFlags,
        InMemoryEngine, OptionValue,
    };
    pub use crate::geometry::BoundingBox;
    pub use crate::mesh_error::MesherError;
    pub use crate::pipeline::{
        EdgeTier, FluidTier, IntakeTier, MeshStage, PipelineReport, run_pipeline,
    };
    pub use crate::topology::{DimTag, EntitySet};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(DimTag: Copy, Ord, std::hash::Hash, Send, Sync);
    assert_impl_all!(MesherError: std::error::Error, Send, Sync, Clone);
    assert_impl_all!(InMemoryEngine: GeometryEngine, Send);
    assert_impl_all!(PipelineConfig: serde::Serialize, serde::de::DeserializeOwned);
}
