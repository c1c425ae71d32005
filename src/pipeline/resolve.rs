//! Tiered entity resolution.
//!
//! Three independent resolutions run in order: the fluid volume, the intake
//! (wetted) surfaces, and the curves bounding the intake surfaces. Each has
//! an explicit, ordered tier list. Tiers are tried one at a time and the
//! first non-empty result wins; a later tier never runs when an earlier one
//! produced something. Every tier transition is logged as a warning.
//!
//! All results are sorted by ascending tag so identical input always
//! resolves identically.
//!
//! | resolution | tiers                                                        | exhausted |
//! |------------|--------------------------------------------------------------|-----------|
//! | fluid      | first volume, surface-loop volume, enlarged bounding box     | fatal     |
//! | intake     | fragmentation map, fluid boundary minus shell, all boundary   | fatal     |
//! | edges      | recursive combined boundary, per-surface boundary            | warning   |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::{BoundaryQuery, GeometryEngine};
use crate::mesh_error::MesherError;
use crate::pipeline::domain::DomainBox;
use crate::pipeline::fragment::FragmentationMap;
use crate::topology::{DimTag, EntitySet};

/// Margin of the last-resort fluid box, as a fraction of each side.
pub const ENLARGE_FRACTION: f64 = 0.01;
/// Tolerance, relative to the geometry's max dimension, for deciding that a
/// surface lies on a domain-box plane.
pub const SHELL_PLANE_TOLERANCE: f64 = 1e-6;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FluidTier {
    /// First volume present after fragmentation.
    FirstVolume,
    /// Volume built from a surface loop over every surface.
    SurfaceLoop,
    /// Box around the whole model with a 1% margin.
    EnlargedBoundingBox,
}

impl FluidTier {
    pub const ORDER: [FluidTier; 3] = [
        FluidTier::FirstVolume,
        FluidTier::SurfaceLoop,
        FluidTier::EnlargedBoundingBox,
    ];
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntakeTier {
    /// Surfaces the imported geometry became during fragmentation.
    FragmentationMap,
    /// Fluid boundary surfaces that are not part of the domain box shell.
    ExcludeOuterShell,
    /// Every fluid boundary surface.
    AllFluidBoundary,
}

impl IntakeTier {
    pub const ORDER: [IntakeTier; 3] = [
        IntakeTier::FragmentationMap,
        IntakeTier::ExcludeOuterShell,
        IntakeTier::AllFluidBoundary,
    ];
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeTier {
    /// Recursive boundary of the intake surfaces taken as one shape.
    RecursiveBoundary,
    /// Union of each intake surface's own curves.
    PerSurface,
}

impl EdgeTier {
    pub const ORDER: [EdgeTier; 2] = [EdgeTier::RecursiveBoundary, EdgeTier::PerSurface];
}

macro_rules! tier_display {
    ($($ty:ty),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    )*};
}
tier_display!(FluidTier, IntakeTier, EdgeTier);

/// A non-empty resolved set and the tier that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolved<T> {
    pub entities: EntitySet,
    pub tier: T,
}

/// Boundary curves for layering. `tier` is `None` when every tier came back
/// empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerEdges {
    pub curves: EntitySet,
    pub tier: Option<EdgeTier>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub fluid: Resolved<FluidTier>,
    pub intake: Resolved<IntakeTier>,
    pub edges: LayerEdges,
}

/// Runs `attempt` for each tier in order until one yields a non-empty set.
///
/// Errors inside a tier are treated like an empty result.
fn first_nonempty<T, F>(what: &str, tiers: &[T], mut attempt: F) -> Option<Resolved<T>>
where
    T: Copy + fmt::Display,
    F: FnMut(T) -> Result<EntitySet, MesherError>,
{
    for (i, &tier) in tiers.iter().enumerate() {
        let outcome = attempt(tier);
        match outcome {
            Ok(set) if !set.is_empty() => {
                log::debug!("{what}: tier {tier} -> {:?}", set.as_slice());
                return Some(Resolved { entities: set, tier });
            }
            Ok(_) => log::warn!("{what}: tier {} ({tier}) produced nothing", i + 1),
            Err(e) => log::warn!("{what}: tier {} ({tier}) failed: {e}", i + 1),
        }
        if let Some(next) = tiers.get(i + 1) {
            log::warn!("{what}: falling back to tier {} ({next})", i + 2);
        }
    }
    None
}

fn sorted_surfaces(set: &EntitySet) -> EntitySet {
    set.of_dim(2).canonical()
}

fn fluid_boundary<E>(engine: &E, fluid: &EntitySet) -> Result<EntitySet, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    Ok(sorted_surfaces(&engine.boundary(fluid, BoundaryQuery::per_entity())?))
}

/// Picks the volume that surrounds the imported geometry.
///
/// Preference: volumes the domain box became that the imported geometry did
/// not, then a volume whose box matches the domain box, then the lowest tag.
fn first_volume<E>(
    engine: &E,
    domain: &DomainBox,
    map: &FragmentationMap,
) -> Result<EntitySet, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    let volumes = engine.entities(Some(3)).canonical();
    if volumes.is_empty() {
        return Ok(EntitySet::new());
    }
    let carved = map
        .domain()
        .of_dim(3)
        .difference(map.imported())
        .canonical();
    if let Some(v) = carved.iter().copied().find(|v| volumes.contains(*v)) {
        return Ok(EntitySet::from(vec![v]));
    }
    let tol = SHELL_PLANE_TOLERANCE * domain.max_dim;
    for &v in volumes.iter() {
        let b = engine.bounding_box(Some(v))?;
        if b.contains(&domain.bbox, tol) && domain.bbox.contains(&b, tol) {
            return Ok(EntitySet::from(vec![v]));
        }
    }
    Ok(volumes.first().into_iter().collect())
}

/// Fluid volume: the first tier that yields a volume wins.
pub fn resolve_fluid_volume<E>(
    engine: &mut E,
    domain: &DomainBox,
    map: &FragmentationMap,
) -> Result<Resolved<FluidTier>, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    first_nonempty("fluid volume", &FluidTier::ORDER, |tier| match tier {
        FluidTier::FirstVolume => first_volume(&*engine, domain, map),
        FluidTier::SurfaceLoop => {
            let surfaces = engine.entities(Some(2));
            if surfaces.is_empty() {
                return Ok(EntitySet::new());
            }
            Ok(EntitySet::from(vec![engine.add_volume_from_surfaces(&surfaces)?]))
        }
        FluidTier::EnlargedBoundingBox => {
            let bbox = engine.bounding_box(None)?;
            if bbox.is_empty() || !(bbox.max_extent() > 0.0) {
                return Ok(EntitySet::new());
            }
            Ok(EntitySet::from(vec![
                engine.add_box(&bbox.enlarged(ENLARGE_FRACTION))?,
            ]))
        }
    })
    .ok_or_else(|| MesherError::Resolution("no fluid volume could be resolved".into()))
}

/// Surfaces of the domain box: the shell recorded at creation plus whatever
/// the box's volume reports now, if it still exists.
fn outer_shell<E>(engine: &E, domain: &DomainBox) -> EntitySet
where
    E: GeometryEngine + ?Sized,
{
    let mut shell = domain.outer_shell.clone();
    match engine.boundary(&EntitySet::from(vec![domain.volume]), BoundaryQuery::per_entity()) {
        Ok(current) => {
            // The carved domain also bounds the imported solid's faces; keep
            // only those on the box planes.
            let tol = SHELL_PLANE_TOLERANCE * domain.max_dim;
            for &s in current.of_dim(2).iter() {
                if lies_on_domain_planes(engine, s, domain, tol) {
                    shell.push(s);
                }
            }
        }
        Err(e) => log::debug!("domain box boundary unavailable: {e}"),
    }
    shell.canonical()
}

fn lies_on_domain_planes<E>(engine: &E, surface: DimTag, domain: &DomainBox, tol: f64) -> bool
where
    E: GeometryEngine + ?Sized,
{
    engine
        .bounding_box(Some(surface))
        .is_ok_and(|b| b.lies_on_boundary_of(&domain.bbox, tol))
}

/// Intake surfaces: what the imported geometry became, else the fluid
/// boundary without the far-field shell, else the whole fluid boundary.
pub fn resolve_intake_surfaces<E>(
    engine: &E,
    domain: &DomainBox,
    map: &FragmentationMap,
    fluid: &EntitySet,
) -> Result<Resolved<IntakeTier>, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    first_nonempty("intake surfaces", &IntakeTier::ORDER, |tier| match tier {
        IntakeTier::FragmentationMap => Ok(sorted_surfaces(map.imported())),
        IntakeTier::ExcludeOuterShell => {
            let shell = outer_shell(engine, domain);
            let tol = SHELL_PLANE_TOLERANCE * domain.max_dim;
            let boundary = fluid_boundary(engine, fluid)?;
            Ok(boundary
                .iter()
                .copied()
                .filter(|s| !shell.contains(*s) && !lies_on_domain_planes(engine, *s, domain, tol))
                .collect())
        }
        IntakeTier::AllFluidBoundary => fluid_boundary(engine, fluid),
    })
    .ok_or_else(|| MesherError::Resolution("no intake surfaces could be resolved".into()))
}

/// Curves bounding the intake surfaces. An empty result is not an error.
pub fn resolve_layer_edges<E>(engine: &E, intake: &EntitySet) -> LayerEdges
where
    E: GeometryEngine + ?Sized,
{
    let found = first_nonempty("boundary-layer edges", &EdgeTier::ORDER, |tier| {
        let query = match tier {
            EdgeTier::RecursiveBoundary => BoundaryQuery::combined().recursive(),
            EdgeTier::PerSurface => BoundaryQuery::per_entity(),
        };
        Ok(engine.boundary(intake, query)?.of_dim(1).canonical())
    });
    match found {
        Some(r) => LayerEdges {
            curves: r.entities,
            tier: Some(r.tier),
        },
        None => {
            log::warn!("no boundary curves found on the intake surfaces; boundary layer will be skipped");
            LayerEdges {
                curves: EntitySet::new(),
                tier: None,
            }
        }
    }
}

/// Runs the three resolutions in order.
pub fn resolve_entities<E>(
    engine: &mut E,
    domain: &DomainBox,
    map: &FragmentationMap,
) -> Result<Resolution, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    let fluid = resolve_fluid_volume(engine, domain, map)?;
    let intake = resolve_intake_surfaces(&*engine, domain, map, &fluid.entities)?;
    let edges = resolve_layer_edges(&*engine, &intake.entities);
    log::info!(
        "resolved fluid {:?} ({}), {} intake surfaces ({}), {} layer curves",
        fluid.entities.as_slice(),
        fluid.tier,
        intake.entities.len(),
        intake.tier,
        edges.curves.len()
    );
    Ok(Resolution {
        fluid,
        intake,
        edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn later_tiers_only_run_after_empty_results() {
        let calls = RefCell::new(Vec::new());
        let r = first_nonempty("test", &IntakeTier::ORDER, |tier| {
            calls.borrow_mut().push(tier);
            Ok(match tier {
                IntakeTier::FragmentationMap => EntitySet::new(),
                _ => EntitySet::from(vec![DimTag::surface(7)]),
            })
        })
        .unwrap();
        assert_eq!(r.tier, IntakeTier::ExcludeOuterShell);
        assert_eq!(
            *calls.borrow(),
            vec![IntakeTier::FragmentationMap, IntakeTier::ExcludeOuterShell]
        );
    }

    #[test]
    fn tier_errors_fall_through() {
        let r = first_nonempty("test", &EdgeTier::ORDER, |tier| match tier {
            EdgeTier::RecursiveBoundary => Err(MesherError::engine("boom")),
            EdgeTier::PerSurface => Ok(EntitySet::from(vec![DimTag::curve(1)])),
        })
        .unwrap();
        assert_eq!(r.tier, EdgeTier::PerSurface);
    }

    #[test]
    fn exhaustion_returns_none() {
        let r = first_nonempty("test", &FluidTier::ORDER, |_| Ok(EntitySet::new()));
        assert!(r.is_none());
    }
}
