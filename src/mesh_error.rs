//! MesherError: Unified error type for domain-mesher public APIs
//!
//! Every pipeline stage returns `Result<_, MesherError>`. Variants follow the
//! failure taxonomy of the pipeline: import, geometry, resolution, mesh
//! generation and export failures, plus configuration and generic engine
//! failures. Recoverable failures (healing, missing boundary edges) never
//! surface as a `MesherError`; they are logged and the pipeline continues.

use thiserror::Error;

use crate::pipeline::mesh_driver::MeshStage;

/// Unified error type for domain-mesher operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MesherError {
    /// Configuration rejected before any engine call.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Input missing, empty, unparseable, or without usable geometry.
    #[error("import error: {0}")]
    Import(String),
    /// Boolean fragmentation or healing failed inside the kernel.
    #[error("geometry error: {0}")]
    Geometry(String),
    /// Every fallback tier of a resolution came back empty.
    #[error("resolution error: {0}")]
    Resolution(String),
    /// A generation stage failed (after its fallback, if it has one).
    #[error("mesh generation failed at {stage} stage: {message}")]
    MeshGeneration { stage: MeshStage, message: String },
    /// Writing the mesh artifact failed.
    #[error("export error: {0}")]
    Export(String),
    /// A capability call failed outside the categories above.
    #[error("engine error: {0}")]
    Engine(String),
}

impl MesherError {
    /// Process exit code for this failure category. Always nonzero.
    pub fn exit_code(&self) -> i32 {
        match self {
            MesherError::InvalidConfig(_) => 2,
            MesherError::Import(_) => 3,
            MesherError::Geometry(_) => 4,
            MesherError::Resolution(_) => 5,
            MesherError::MeshGeneration { .. } => 6,
            MesherError::Export(_) => 7,
            MesherError::Engine(_) => 8,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        MesherError::InvalidConfig(message.into())
    }

    pub(crate) fn import(message: impl Into<String>) -> Self {
        MesherError::Import(message.into())
    }

    pub(crate) fn geometry(message: impl Into<String>) -> Self {
        MesherError::Geometry(message.into())
    }

    pub(crate) fn engine(message: impl Into<String>) -> Self {
        MesherError::Engine(message.into())
    }

    pub(crate) fn export(message: impl Into<String>) -> Self {
        MesherError::Export(message.into())
    }
}
