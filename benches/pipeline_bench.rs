use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::fs;

use domain_mesher::engine::scene::{Scene, ShapeSpec};
use domain_mesher::prelude::*;

// Row of `n` unit solids along x, with a sheet above them.
fn row_scene(n: usize) -> Scene {
    let mut shapes: Vec<ShapeSpec> = (0..n)
        .map(|i| {
            let x = 2.0 * i as f64;
            ShapeSpec::Solid {
                min: [x, 0.0, 0.0],
                max: [x + 1.0, 1.0, 1.0],
            }
        })
        .collect();
    shapes.push(ShapeSpec::Sheet {
        min: [0.0, 0.0, 2.0],
        max: [2.0 * n as f64, 1.0, 2.0],
    });
    Scene { shapes }
}

fn bench_pipeline(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cfg = PipelineConfig::default();
    cfg.headless = true;
    cfg.mesh.threads = Some(1);
    cfg.mesh.domain_scale = 1.5;

    let mut group = c.benchmark_group("run_pipeline");
    for &n in &[1usize, 4, 16] {
        let input = dir.path().join(format!("row{n}.json"));
        fs::write(&input, row_scene(n).to_json_string()).expect("write scene");
        let output = dir.path().join(format!("row{n}.msh"));
        // Keep the lattice size comparable across rows.
        cfg.mesh.base_mesh_size = n as f64 * 0.5;

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut engine = InMemoryEngine::new();
                run_pipeline(&mut engine, &input, &output, &cfg).expect("pipeline")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
