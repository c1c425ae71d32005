//! The meshing pipeline.
//!
//! Stages run strictly in order, each consuming the previous stage's output:
//!
//! 1. [`import`]: import the exchange file and detect the new entities.
//! 2. [`domain`]: synthesize the far-field box.
//! 3. [`fragment`]: fragment the box by the imported geometry.
//! 4. [`resolve`]: resolve fluid volume, intake surfaces and layer curves.
//! 5. [`heal`]: best-effort repair of the fluid volume.
//! 6. [`groups`]: register physical groups.
//! 7. [`size_field`]: distance-graded background size field.
//! 8. [`boundary_layer`]: inflation field on the layer curves.
//! 9. [`mesh_driver`]: staged generation, fallback and export.
//!
//! The engine is an explicit session passed by `&mut`; nothing here keeps
//! process-wide state.

pub mod boundary_layer;
pub mod domain;
pub mod fragment;
pub mod groups;
pub mod heal;
pub mod import;
pub mod mesh_driver;
pub mod resolve;
pub mod size_field;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::engine::{FieldHandle, GeometryEngine};
use crate::mesh_error::MesherError;
use crate::topology::EntitySet;

pub use domain::DomainBox;
pub use fragment::FragmentationMap;
pub use groups::PhysicalGroups;
pub use heal::{HealOutcome, HealStatus};
pub use mesh_driver::{MeshOutcome, MeshStage};
pub use resolve::{EdgeTier, FluidTier, IntakeTier, Resolution};
pub use size_field::SizeField;

/// Worker threads used when hardware parallelism cannot be detected.
pub const FALLBACK_THREADS: usize = 4;

/// Everything a successful run decided.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub threads: usize,
    pub imported: EntitySet,
    pub domain: DomainBox,
    pub fragmentation: FragmentationMap,
    pub resolution: Resolution,
    pub heal: HealOutcome,
    pub groups: PhysicalGroups,
    pub size_field: SizeField,
    pub boundary_layer: Option<FieldHandle>,
    pub mesh: MeshOutcome,
}

/// Explicit thread count, else detected parallelism, else [`FALLBACK_THREADS`].
pub fn resolve_thread_count(explicit: Option<usize>) -> usize {
    if let Some(n) = explicit {
        return n;
    }
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            log::warn!("could not detect CPU count ({e}); using {FALLBACK_THREADS} threads");
            FALLBACK_THREADS
        }
    }
}

/// Session-wide engine options, set once before any geometry call.
pub fn configure_session<E>(engine: &mut E, config: &PipelineConfig) -> Result<usize, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    let threads = resolve_thread_count(config.mesh.threads);
    engine.set_option("General.NumThreads", threads.into())?;
    engine.set_option("Geometry.OCCParallel", true.into())?;
    if config.debug {
        engine.set_option("General.Verbosity", 99.into())?;
        engine.set_option("General.Terminal", 1.into())?;
    }
    if config.heal.enabled {
        let tol = config.heal.tolerance;
        let flags = config.heal.flags;
        engine.set_option("Geometry.Tolerance", tol.into())?;
        engine.set_option("Geometry.ToleranceBoolean", tol.into())?;
        engine.set_option("Geometry.OCCFixDegenerated", flags.fix_degenerated.into())?;
        engine.set_option("Geometry.OCCFixSmallEdges", flags.fix_small_edges.into())?;
        engine.set_option("Geometry.OCCFixSmallFaces", flags.fix_small_faces.into())?;
        engine.set_option("Geometry.OCCSewFaces", flags.sew_faces.into())?;
        engine.set_option("Geometry.OCCMakeSolids", flags.make_solids.into())?;
    }
    log::info!("engine session: {threads} threads");
    Ok(threads)
}

/// Runs every stage on `engine`, writing the mesh to `output`.
///
/// The configuration is validated before the engine is touched.
pub fn run_pipeline<E>(
    engine: &mut E,
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> Result<PipelineReport, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    config.validate()?;
    let threads = configure_session(engine, config)?;

    let imported = import::import_geometry(engine, input)?;
    let domain = domain::synthesize_domain(engine, &imported, config.mesh.domain_scale)?;
    let fragmentation = fragment::fragment_domain(engine, &domain, &imported)?;
    let resolution = resolve::resolve_entities(engine, &domain, &fragmentation.map)?;
    let heal = heal::heal_fluid(engine, &resolution.fluid.entities, &config.heal);
    let groups = groups::add_physical_groups(engine, &resolution, &heal.volumes)?;
    let size_field = size_field::build_size_field(
        engine,
        &resolution.intake.entities,
        config.mesh.base_mesh_size,
        domain.max_dim,
    )?;
    let boundary_layer = match &config.boundary_layer {
        Some(bl) => boundary_layer::build_boundary_layer(engine, &resolution.edges, bl)?,
        None => {
            log::info!("boundary layer disabled");
            None
        }
    };
    let mesh = mesh_driver::run_mesh_driver(engine, &config.mesh, output)?;

    Ok(PipelineReport {
        threads,
        imported,
        domain,
        fragmentation: fragmentation.map,
        resolution,
        heal,
        groups,
        size_field,
        boundary_layer,
        mesh,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InMemoryEngine, OptionValue};

    #[test]
    fn explicit_threads_win() {
        assert_eq!(resolve_thread_count(Some(3)), 3);
        assert!(resolve_thread_count(None) >= 1);
    }

    #[test]
    fn session_sets_threads_and_tolerances() {
        let mut eng = InMemoryEngine::new();
        let mut cfg = PipelineConfig::default();
        cfg.mesh.threads = Some(2);
        configure_session(&mut eng, &cfg).unwrap();
        assert_eq!(eng.option("General.NumThreads"), Some(&OptionValue::Number(2.0)));
        assert_eq!(eng.option("Geometry.Tolerance"), Some(&OptionValue::Number(1e-2)));
        assert!(eng.option("General.Verbosity").is_none());
    }

    #[test]
    fn invalid_config_fails_before_engine_use() {
        let mut eng = InMemoryEngine::new();
        let mut cfg = PipelineConfig::default();
        cfg.mesh.base_mesh_size = 0.0;
        let err = run_pipeline(&mut eng, Path::new("x.json"), Path::new("y.msh"), &cfg).unwrap_err();
        assert!(matches!(err, MesherError::InvalidConfig(_)));
        assert!(eng.option("General.NumThreads").is_none());
    }
}
