#![allow(dead_code)]
use std::fs;
use std::path::{Path, PathBuf};

use domain_mesher::prelude::*;
use tempfile::TempDir;

pub const UNIT_CUBE: &str = r#"{"shapes":[{"kind":"solid","min":[0,0,0],"max":[1,1,1]}]}"#;
pub const FLAT_SHEET: &str = r#"{"shapes":[{"kind":"sheet","min":[0,0,0],"max":[2,1,0]}]}"#;
pub const CUBE_SHELL: &str = r#"{"shapes":[{"kind":"shell","min":[0,0,0],"max":[1,1,1]}]}"#;

/// Scratch directory holding `input.json` with `scene`.
pub fn workspace(scene: &str) -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("input.json");
    fs::write(&input, scene).expect("write scene");
    let output = dir.path().join("fluid.msh");
    (dir, input, output)
}

/// Defaults with a fixed thread count and no viewer.
pub fn config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.mesh.threads = Some(1);
    cfg.headless = true;
    cfg
}

/// Like [`config`], but writing ASCII so tests can read the file back.
pub fn ascii_config() -> PipelineConfig {
    let mut cfg = config();
    cfg.mesh.binary = false;
    cfg
}

pub fn run_scene(
    engine: &mut InMemoryEngine,
    scene: &str,
    cfg: &PipelineConfig,
) -> (TempDir, PathBuf, Result<PipelineReport, MesherError>) {
    let (dir, input, output) = workspace(scene);
    let result = run_pipeline(engine, &input, &output, cfg);
    (dir, output, result)
}

pub fn exists(path: &Path) -> bool {
    path.metadata().map(|m| m.len() > 0).unwrap_or(false)
}
