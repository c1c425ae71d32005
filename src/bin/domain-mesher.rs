//! domain-mesher command-line interface.
//!
//! Reads a scene, builds the fluid domain and writes a `.msh` file. Options
//! come from an optional JSON config file, overridden by flags.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use domain_mesher::prelude::*;

/// Fluid-domain mesher with graded boundary layers
#[derive(Parser, Debug)]
#[command(name = "domain-mesher")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build a CFD fluid-domain mesh around an imported solid", long_about = None)]
struct Cli {
    /// Input geometry file
    input: PathBuf,
    /// Output mesh file (.msh)
    output: PathBuf,

    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Far-field box size relative to the geometry
    #[arg(long)]
    domain_scale: Option<f64>,
    /// Base mesh size
    #[arg(long)]
    mesh_size: Option<f64>,
    /// 2D meshing algorithm
    #[arg(long = "algo-2d")]
    algo_2d: Option<i32>,
    /// 3D meshing algorithm
    #[arg(long = "algo-3d")]
    algo_3d: Option<i32>,
    /// Engine worker threads (default: detected)
    #[arg(long)]
    threads: Option<usize>,

    /// Skip the boundary-layer field
    #[arg(long)]
    no_boundary_layer: bool,
    /// First boundary-layer thickness
    #[arg(long)]
    bl_first_layer: Option<f64>,
    /// Boundary-layer growth ratio
    #[arg(long)]
    bl_progression: Option<f64>,
    /// Total boundary-layer thickness
    #[arg(long)]
    bl_thickness: Option<f64>,
    /// Explicit number of layers (0 = automatic)
    #[arg(long)]
    bl_layers: Option<u32>,
    /// Disable boundary-layer smoothing
    #[arg(long)]
    no_bl_smoothing: bool,
    /// Boundary-layer angle tolerance in degrees
    #[arg(long)]
    bl_angle_tol: Option<f64>,
    /// Boundary-layer intersection handling
    #[arg(long, value_name = "none|restrict|split")]
    bl_intersection: Option<IntersectionMode>,

    /// Disable Netgen optimization
    #[arg(long)]
    no_netgen: bool,
    /// Skip shape healing
    #[arg(long)]
    no_heal: bool,
    /// Write an ASCII mesh instead of binary
    #[arg(long)]
    ascii: bool,
    /// Mesh file format version
    #[arg(long)]
    format_version: Option<f64>,

    /// Verbose logging and engine output
    #[arg(long)]
    debug: bool,
    /// Do not open the viewer after meshing
    #[arg(long)]
    nopopup: bool,
}

impl Cli {
    fn to_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        let mesh = &mut cfg.mesh;
        if let Some(v) = self.domain_scale {
            mesh.domain_scale = v;
        }
        if let Some(v) = self.mesh_size {
            mesh.base_mesh_size = v;
        }
        if let Some(v) = self.algo_2d {
            mesh.algorithm_2d = v;
        }
        if let Some(v) = self.algo_3d {
            mesh.algorithm_3d = v;
        }
        if self.threads.is_some() {
            mesh.threads = self.threads;
        }
        if let Some(v) = self.format_version {
            mesh.format_version = v;
        }
        mesh.optimize_netgen &= !self.no_netgen;
        mesh.binary &= !self.ascii;

        if self.no_boundary_layer {
            cfg.boundary_layer = None;
        } else {
            let bl = cfg.boundary_layer.get_or_insert_with(BoundaryLayerConfig::default);
            if let Some(v) = self.bl_first_layer {
                bl.first_layer_thickness = v;
            }
            if let Some(v) = self.bl_progression {
                bl.growth_ratio = v;
            }
            if let Some(v) = self.bl_thickness {
                bl.thickness = v;
            }
            if let Some(v) = self.bl_layers {
                bl.layer_count = v;
            }
            if let Some(v) = self.bl_angle_tol {
                bl.angle_tolerance_deg = v;
            }
            if let Some(v) = self.bl_intersection {
                bl.intersection = v;
            }
            bl.smoothing &= !self.no_bl_smoothing;
        }

        cfg.heal.enabled &= !self.no_heal;
        cfg.debug |= self.debug;
        cfg.headless |= self.nopopup;
        Ok(cfg)
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn run(
    cli: &Cli,
    cfg: &PipelineConfig,
    engine: &mut InMemoryEngine,
) -> anyhow::Result<PipelineReport> {
    let report = run_pipeline(engine, &cli.input, &cli.output, cfg)?;

    log::info!(
        "done: fluid {:?}, {} intake surfaces, {} layer curves, 2D algorithm {}",
        report.resolution.fluid.entities.as_slice(),
        report.resolution.intake.entities.len(),
        report.resolution.edges.curves.len(),
        report.mesh.algorithm_2d
    );
    if !cfg.headless && std::io::stdout().is_terminal() {
        engine.run_gui()?;
    }
    Ok(report)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    // Log level follows the merged config, file included.
    let cfg = cli.to_config();
    init_logging(cfg.as_ref().map_or(cli.debug, |c| c.debug));

    let mut engine = InMemoryEngine::new();
    match cfg.and_then(|cfg| run(&cli, &cfg, &mut engine)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            let code = err
                .chain()
                .find_map(|e| e.downcast_ref::<MesherError>())
                .map_or(1, MesherError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
