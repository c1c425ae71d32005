mod util;

use domain_mesher::pipeline::domain::synthesize_domain;
use domain_mesher::pipeline::fragment::FragmentationMap;
use domain_mesher::pipeline::resolve::{resolve_intake_surfaces, resolve_layer_edges};
use domain_mesher::prelude::*;
use util::*;

fn faults(plan: FaultPlan) -> InMemoryEngine {
    InMemoryEngine::with_faults(plan)
}

#[test]
fn missing_fragment_map_falls_back_to_shell_exclusion() {
    let mut engine = faults(FaultPlan {
        drop_fragment_map: true,
        ..FaultPlan::default()
    });
    let (_dir, _output, result) = run_scene(&mut engine, UNIT_CUBE, &config());
    let report = result.expect("pipeline");

    // The retained solid has the lowest tag but is not the fluid.
    assert_eq!(report.resolution.fluid.tier, FluidTier::FirstVolume);
    assert_eq!(report.resolution.fluid.entities.first(), Some(report.domain.volume));

    let intake = &report.resolution.intake;
    assert_eq!(intake.tier, IntakeTier::ExcludeOuterShell);
    assert_eq!(intake.entities.len(), 6);
    assert!(intake.entities.iter().all(|s| !report.domain.outer_shell.contains(*s)));
}

#[test]
fn sheet_without_map_degrades_to_whole_boundary() {
    let mut engine = faults(FaultPlan {
        drop_fragment_map: true,
        ..FaultPlan::default()
    });
    let (_dir, _output, result) = run_scene(&mut engine, FLAT_SHEET, &config());
    let report = result.expect("pipeline");

    assert_eq!(report.resolution.intake.tier, IntakeTier::AllFluidBoundary);
    assert_eq!(report.resolution.intake.entities, report.domain.outer_shell);
    assert_eq!(report.groups.far_field, None);
}

#[test]
fn lost_volumes_are_rebuilt_from_a_surface_loop() {
    let mut engine = faults(FaultPlan {
        drop_volumes_after_fragment: true,
        ..FaultPlan::default()
    });
    let (_dir, _output, result) = run_scene(&mut engine, UNIT_CUBE, &config());
    let report = result.expect("pipeline");

    assert_eq!(report.resolution.fluid.tier, FluidTier::SurfaceLoop);
    assert_eq!(report.resolution.fluid.entities.len(), 1);
    assert_eq!(report.resolution.intake.tier, IntakeTier::FragmentationMap);
}

#[test]
fn open_surfaces_fall_back_to_enlarged_box() {
    let mut engine = faults(FaultPlan {
        drop_volumes_after_fragment: true,
        ..FaultPlan::default()
    });
    let (_dir, _output, result) = run_scene(&mut engine, FLAT_SHEET, &config());
    let report = result.expect("pipeline");

    let fluid = &report.resolution.fluid;
    assert_eq!(fluid.tier, FluidTier::EnlargedBoundingBox);
    let v = fluid.entities.first().expect("fluid volume");
    let b = engine.bounding_box(Some(v)).unwrap();
    assert!(b.strictly_contains(&report.domain.bbox));
}

#[test]
fn exhausted_intake_tiers_are_a_resolution_error() {
    let mut engine = InMemoryEngine::new();
    engine
        .add_box(&BoundingBox::new([0.0; 3], [1.0; 3]))
        .unwrap();
    let imported = engine.entities(None);
    let domain = synthesize_domain(&mut engine, &imported, 3.0).unwrap();

    let err = resolve_intake_surfaces(
        &engine,
        &domain,
        &FragmentationMap::default(),
        &EntitySet::new(),
    )
    .unwrap_err();
    assert!(matches!(err, MesherError::Resolution(_)));
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn intake_tier_one_wins_even_when_later_tiers_would_differ() {
    let mut engine = InMemoryEngine::new();
    engine
        .add_box(&BoundingBox::new([0.0; 3], [1.0; 3]))
        .unwrap();
    let imported = engine.entities(None);
    let domain = synthesize_domain(&mut engine, &imported, 3.0).unwrap();
    let picked = EntitySet::from(vec![DimTag::surface(2)]);
    let map = FragmentationMap::new(EntitySet::from(vec![domain.volume]), picked.clone());

    let fluid = EntitySet::from(vec![domain.volume]);
    let r = resolve_intake_surfaces(&engine, &domain, &map, &fluid).unwrap();
    assert_eq!(r.tier, IntakeTier::FragmentationMap);
    assert_eq!(r.entities, picked);
}

#[test]
fn layer_edges_are_sorted_and_unique() {
    let mut engine = InMemoryEngine::new();
    engine
        .add_box(&BoundingBox::new([0.0; 3], [1.0; 3]))
        .unwrap();
    // Two adjacent faces in descending order share one curve.
    let faces = EntitySet::from(vec![DimTag::surface(6), DimTag::surface(1)]);
    let edges = resolve_layer_edges(&engine, &faces);
    let tags = edges.curves.tags();
    let mut sorted = tags.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(tags, sorted);
    assert_eq!(edges.tier, Some(EdgeTier::RecursiveBoundary));
}

#[test]
fn no_edges_is_only_a_warning() {
    let engine = InMemoryEngine::new();
    let edges = resolve_layer_edges(&engine, &EntitySet::new());
    assert!(edges.curves.is_empty());
    assert_eq!(edges.tier, None);
}
