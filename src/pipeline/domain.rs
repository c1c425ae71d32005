//! Far-field domain box synthesis.

use serde::{Deserialize, Serialize};

use crate::engine::{BoundaryQuery, GeometryEngine};
use crate::geometry::BoundingBox;
use crate::mesh_error::MesherError;
use crate::topology::{DimTag, EntitySet};

/// Geometry extents below this fraction of the largest geometry extent are
/// treated as degenerate.
pub const DEGENERATE_AXIS_FRACTION: f64 = 0.01;

/// The synthesized far-field box and the scalars later stages need.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainBox {
    pub volume: DimTag,
    /// Box of the imported surfaces and volumes.
    pub geometry_bbox: BoundingBox,
    pub bbox: BoundingBox,
    pub centroid: [f64; 3],
    /// Largest axis extent of the imported geometry.
    pub max_dim: f64,
    /// Faces of the domain box as created, before fragmentation.
    pub outer_shell: EntitySet,
}

/// Per-axis domain extents for a geometry box.
///
/// Each axis is `scale × extent`. A flat or near-flat axis, one whose own
/// extent is below 1% of the largest geometry extent, takes the largest
/// extent instead. Since `scale > 1`, every axis whose scaled extent is below
/// that threshold is caught too.
pub fn domain_extents(geometry: &BoundingBox, scale: f64) -> [f64; 3] {
    let max_dim = geometry.max_extent();
    geometry.extents().map(|x| {
        if is_degenerate(x, max_dim) {
            max_dim
        } else {
            scale * x
        }
    })
}

fn is_degenerate(extent: f64, max_dim: f64) -> bool {
    extent < DEGENERATE_AXIS_FRACTION * max_dim
}

/// Adds the far-field box around the imported surfaces and volumes.
pub fn synthesize_domain<E>(
    engine: &mut E,
    imported: &EntitySet,
    scale: f64,
) -> Result<DomainBox, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    let mut geometry_bbox = BoundingBox::empty();
    for &e in imported.at_least_dim(2).iter() {
        geometry_bbox.include(&engine.bounding_box(Some(e))?);
    }
    let max_dim = geometry_bbox.max_extent();
    if geometry_bbox.is_empty() || !(max_dim > 0.0) || !max_dim.is_finite() {
        return Err(MesherError::geometry(format!(
            "imported geometry has no extent (max dimension {max_dim})"
        )));
    }

    let extents = domain_extents(&geometry_bbox, scale);
    for (axis, extent) in geometry_bbox.extents().into_iter().enumerate() {
        if is_degenerate(extent, max_dim) {
            log::warn!(
                "geometry is degenerate along axis {axis} (extent {extent}); domain uses {max_dim} there"
            );
        }
    }

    let centroid = geometry_bbox.centroid();
    let bbox = BoundingBox::centered(centroid, extents);
    let volume = engine.add_box(&bbox)?;
    let outer_shell = engine
        .boundary(&EntitySet::from(vec![volume]), BoundaryQuery::per_entity())?
        .of_dim(2);

    log::info!(
        "domain box {volume}: extents {:?} centered at {:?}",
        extents,
        centroid
    );
    Ok(DomainBox {
        volume,
        geometry_bbox,
        bbox,
        centroid,
        max_dim,
        outer_shell,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryEngine;
    use proptest::prelude::*;

    #[test]
    fn flat_axis_takes_largest_extent() {
        let sheet = BoundingBox::new([0.0, 0.0, 1.0], [2.0, 1.0, 1.0]);
        assert_eq!(domain_extents(&sheet, 5.0), [10.0, 5.0, 2.0]);
    }

    #[test]
    fn near_flat_plate_gets_full_thickness() {
        // 0.01 < 0.01 × 2, even though 5 × 0.01 is not
        let plate = BoundingBox::new([0.0; 3], [2.0, 2.0, 0.01]);
        assert_eq!(domain_extents(&plate, 5.0), [10.0, 10.0, 2.0]);
    }

    #[test]
    fn thin_axis_at_threshold_is_scaled() {
        let plate = BoundingBox::new([0.0; 3], [2.0, 2.0, 0.5]);
        assert_eq!(domain_extents(&plate, 4.0), [8.0, 8.0, 2.0]);
    }

    #[test]
    fn domain_records_outer_shell() {
        let mut eng = InMemoryEngine::new();
        let cube = eng.add_box(&BoundingBox::new([0.0; 3], [1.0; 3])).unwrap();
        let imported = eng.entities(None);
        let domain = synthesize_domain(&mut eng, &imported, 5.0).unwrap();
        assert_ne!(domain.volume, cube);
        assert_eq!(domain.outer_shell.len(), 6);
        assert_eq!(domain.bbox.extents(), [5.0, 5.0, 5.0]);
        assert_eq!(domain.bbox.centroid(), [0.5, 0.5, 0.5]);
    }

    proptest! {
        #[test]
        fn domain_strictly_contains_geometry(
            min in prop::array::uniform3(-100.0f64..100.0),
            size in prop::array::uniform3(0.01f64..50.0),
            scale in 1.01f64..8.0,
        ) {
            let geometry = BoundingBox::new(min, [min[0] + size[0], min[1] + size[1], min[2] + size[2]]);
            let domain = BoundingBox::centered(geometry.centroid(), domain_extents(&geometry, scale));
            prop_assert!(domain.strictly_contains(&geometry));
        }

        #[test]
        fn degenerate_axes_never_collapse(
            size in prop::array::uniform3(0.0f64..10.0),
            flat in 0usize..3,
            scale in 1.01f64..8.0,
        ) {
            let mut max = size;
            max[flat] = 0.0;
            let geometry = BoundingBox::new([0.0; 3], max);
            prop_assume!(geometry.max_extent() > 0.0);
            let e = domain_extents(&geometry, scale);
            prop_assert!(e.iter().all(|&x| x > 0.0));
            prop_assert_eq!(e[flat], geometry.max_extent());
        }

        #[test]
        fn near_flat_axes_are_at_least_max_dim(
            thin in 0.0f64..0.0099,
            scale in 1.01f64..8.0,
        ) {
            let geometry = BoundingBox::new([0.0; 3], [1.0, 1.0, thin]);
            let e = domain_extents(&geometry, scale);
            prop_assert_eq!(e[2], 1.0);
        }
    }
}
