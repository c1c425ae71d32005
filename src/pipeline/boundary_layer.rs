//! Boundary-layer inflation field.

use crate::config::BoundaryLayerConfig;
use crate::engine::{FieldHandle, FieldKind, GeometryEngine};
use crate::mesh_error::MesherError;
use crate::pipeline::resolve::LayerEdges;

/// Registers one boundary-layer field on `edges` and activates it.
///
/// Returns `Ok(None)` without touching the engine when there are no edges.
pub fn build_boundary_layer<E>(
    engine: &mut E,
    edges: &LayerEdges,
    cfg: &BoundaryLayerConfig,
) -> Result<Option<FieldHandle>, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    if edges.curves.is_empty() {
        log::warn!("boundary layer skipped: no anchor curves");
        return Ok(None);
    }
    let curves: Vec<f64> = edges.curves.of_dim(1).tags().into_iter().map(f64::from).collect();

    let field = engine.add_field(FieldKind::BoundaryLayer)?;
    engine.set_field_numbers(field, "CurvesList", &curves)?;
    engine.set_field_number(field, "Size", cfg.first_layer_thickness)?;
    engine.set_field_number(field, "Ratio", cfg.growth_ratio)?;
    engine.set_field_number(field, "Thickness", cfg.thickness)?;
    if cfg.layer_count > 0 {
        engine.set_field_number(field, "NbLayers", f64::from(cfg.layer_count))?;
    }
    engine.set_field_number(field, "Quads", 0.0)?;
    engine.set_field_number(field, "Smoothing", if cfg.smoothing { 1.0 } else { 0.0 })?;
    engine.set_field_number(field, "AngleTolerance", cfg.angle_tolerance_deg)?;
    engine.set_field_string(field, "IntersectionMode", cfg.intersection.as_str())?;
    engine.set_boundary_layer_field(field)?;

    log::info!(
        "boundary layer field {field} on {} curves: first {} ratio {} thickness {}",
        curves.len(),
        cfg.first_layer_thickness,
        cfg.growth_ratio,
        cfg.thickness
    );
    Ok(Some(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntersectionMode;
    use crate::engine::InMemoryEngine;
    use crate::topology::{DimTag, EntitySet};

    #[test]
    fn no_edges_registers_nothing() {
        let mut eng = InMemoryEngine::new();
        let edges = LayerEdges {
            curves: EntitySet::new(),
            tier: None,
        };
        let out = build_boundary_layer(&mut eng, &edges, &BoundaryLayerConfig::default()).unwrap();
        assert!(out.is_none());
        assert!(eng.boundary_layer_field().is_none());
    }

    #[test]
    fn field_carries_configuration() {
        let mut eng = InMemoryEngine::new();
        let edges = LayerEdges {
            curves: EntitySet::from(vec![DimTag::curve(3), DimTag::curve(5)]),
            tier: None,
        };
        let cfg = BoundaryLayerConfig {
            layer_count: 12,
            smoothing: false,
            intersection: IntersectionMode::Split,
            ..BoundaryLayerConfig::default()
        };
        let field = build_boundary_layer(&mut eng, &edges, &cfg).unwrap().unwrap();
        assert_eq!(eng.boundary_layer_field(), Some(field));
        let rec = eng.field(field).unwrap();
        assert_eq!(rec.list("CurvesList"), Some(&[3.0, 5.0][..]));
        assert_eq!(rec.number("NbLayers"), Some(12.0));
        assert_eq!(rec.number("Smoothing"), Some(0.0));
        assert_eq!(rec.string("IntersectionMode"), Some("split"));
    }

    #[test]
    fn automatic_layer_count_omits_property() {
        let mut eng = InMemoryEngine::new();
        let edges = LayerEdges {
            curves: EntitySet::from(vec![DimTag::curve(1)]),
            tier: None,
        };
        let field = build_boundary_layer(&mut eng, &edges, &BoundaryLayerConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(eng.field(field).unwrap().number("NbLayers"), None);
    }
}
