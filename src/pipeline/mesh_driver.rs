//! Staged 1D → 2D → 3D generation and export.
//!
//! The driver walks [`DriverState`] forward one blocking `generate` call at a
//! time. Only the surface stage has a fallback: one retry with a more
//! tolerant 2D algorithm. Any fatal generation failure first tries to dump
//! the partial mesh next to the requested output with a `_debug` suffix; the
//! dump's own failure is logged and dropped.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::MeshOptions;
use crate::engine::GeometryEngine;
use crate::mesh_error::MesherError;

/// One generation stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MeshStage {
    Curve,
    Surface,
    Volume,
}

impl MeshStage {
    pub const ALL: [MeshStage; 3] = [MeshStage::Curve, MeshStage::Surface, MeshStage::Volume];

    pub const fn dimension(self) -> u8 {
        match self {
            MeshStage::Curve => 1,
            MeshStage::Surface => 2,
            MeshStage::Volume => 3,
        }
    }

    fn next(self) -> DriverState {
        match self {
            MeshStage::Curve => DriverState::Generating(MeshStage::Surface),
            MeshStage::Surface => DriverState::Generating(MeshStage::Volume),
            MeshStage::Volume => DriverState::Exporting,
        }
    }
}

impl fmt::Display for MeshStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}D", self.dimension())
    }
}

/// Position of the driver in its forward-only state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DriverState {
    Generating(MeshStage),
    Exporting,
    Exported,
}

/// What the driver did on a successful run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshOutcome {
    /// 2D algorithm that produced the surface mesh.
    pub algorithm_2d: i32,
    pub surface_fallback_used: bool,
    /// Number of `generate` calls issued.
    pub generate_calls: usize,
    pub output: PathBuf,
}

/// `<dir>/<stem>_debug.<ext>` next to `output`.
pub fn debug_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_string());
    let name = match output.extension() {
        Some(ext) => format!("{stem}_debug.{}", ext.to_string_lossy()),
        None => format!("{stem}_debug"),
    };
    output.with_file_name(name)
}

/// Sets the global meshing options consumed by `generate`.
pub fn configure_mesh_options<E>(engine: &mut E, opts: &MeshOptions) -> Result<(), MesherError>
where
    E: GeometryEngine + ?Sized,
{
    let settings: [(&str, f64); 8] = [
        ("Mesh.Algorithm", opts.algorithm_2d as f64),
        ("Mesh.Algorithm3D", opts.algorithm_3d as f64),
        ("Mesh.MeshSizeMin", opts.size_min()),
        ("Mesh.MeshSizeMax", opts.size_max()),
        ("Mesh.MeshSizeExtendFromBoundary", 0.0),
        ("Mesh.Optimize", 1.0),
        ("Mesh.OptimizeNetgen", if opts.optimize_netgen { 1.0 } else { 0.0 }),
        ("Mesh.Binary", if opts.binary { 1.0 } else { 0.0 }),
    ];
    for (name, value) in settings {
        log::debug!("option {name} = {value}");
        engine.set_option(name, value.into())?;
    }
    Ok(())
}

fn generation_error(stage: MeshStage, err: MesherError) -> MesherError {
    match err {
        MesherError::MeshGeneration { .. } => err,
        other => MesherError::MeshGeneration {
            stage,
            message: other.to_string(),
        },
    }
}

fn dump_partial<E>(engine: &mut E, opts: &MeshOptions, output: &Path)
where
    E: GeometryEngine + ?Sized,
{
    let path = debug_path(output);
    match engine.export_mesh(&path, opts.binary, opts.format_version) {
        Ok(()) => log::warn!("partial mesh written to {}", path.display()),
        Err(e) => log::warn!("could not write partial mesh {}: {e}", path.display()),
    }
}

/// Generates the mesh stage by stage and exports it to `output`.
pub fn run_mesh_driver<E>(
    engine: &mut E,
    opts: &MeshOptions,
    output: &Path,
) -> Result<MeshOutcome, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    configure_mesh_options(engine, opts)?;

    let mut outcome = MeshOutcome {
        algorithm_2d: opts.algorithm_2d,
        surface_fallback_used: false,
        generate_calls: 0,
        output: output.to_path_buf(),
    };
    let mut state = DriverState::Generating(MeshStage::Curve);

    loop {
        state = match state {
            DriverState::Generating(stage) => {
                log::info!("generating {stage} mesh");
                outcome.generate_calls += 1;
                match engine.generate(stage.dimension()) {
                    Ok(()) => stage.next(),
                    Err(first) if stage == MeshStage::Surface => {
                        let fallback = opts.fallback_2d();
                        log::warn!(
                            "2D meshing with algorithm {} failed ({first}); retrying with algorithm {fallback}",
                            opts.algorithm_2d
                        );
                        let retried = match engine.set_option("Mesh.Algorithm", fallback.into()) {
                            Ok(()) => {
                                outcome.generate_calls += 1;
                                engine.generate(stage.dimension())
                            }
                            Err(e) => Err(e),
                        };
                        match retried {
                            Ok(()) => {
                                outcome.algorithm_2d = fallback;
                                outcome.surface_fallback_used = true;
                                stage.next()
                            }
                            Err(second) => {
                                dump_partial(engine, opts, output);
                                return Err(generation_error(stage, second));
                            }
                        }
                    }
                    Err(err) => {
                        dump_partial(engine, opts, output);
                        return Err(generation_error(stage, err));
                    }
                }
            }
            DriverState::Exporting => {
                engine
                    .export_mesh(output, opts.binary, opts.format_version)
                    .map_err(|e| match e {
                        MesherError::Export(_) => e,
                        other => MesherError::export(other.to_string()),
                    })?;
                log::info!("mesh written to {}", output.display());
                DriverState::Exported
            }
            DriverState::Exported => return Ok(outcome),
        };
    }
}
