//! Distance-graded background size field.

use serde::{Deserialize, Serialize};

use crate::engine::{FieldHandle, FieldKind, GeometryEngine};
use crate::mesh_error::MesherError;
use crate::topology::EntitySet;

/// Points sampled per source surface by the distance field.
pub const DISTANCE_SAMPLING: f64 = 100.0;

/// Handles and parameters of the registered size field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeField {
    pub distance: FieldHandle,
    pub threshold: FieldHandle,
    pub size_min: f64,
    pub size_max: f64,
    pub dist_min: f64,
    pub dist_max: f64,
}

impl SizeField {
    /// Threshold parameters for a base size and geometry max dimension.
    pub fn parameters(base_mesh_size: f64, max_dim: f64) -> (f64, f64, f64, f64) {
        (
            base_mesh_size / 5.0,
            base_mesh_size,
            0.1 * max_dim,
            0.5 * max_dim,
        )
    }

    /// Size the threshold field assigns at `distance` from the intake
    /// surfaces: clamped linear interpolation between the two control points.
    pub fn size_at(&self, distance: f64) -> f64 {
        if distance <= self.dist_min {
            return self.size_min;
        }
        if distance >= self.dist_max {
            return self.size_max;
        }
        let t = (distance - self.dist_min) / (self.dist_max - self.dist_min);
        self.size_min + t * (self.size_max - self.size_min)
    }
}

/// Registers a distance field on `intake` and a threshold field over it, and
/// makes the threshold the background field.
pub fn build_size_field<E>(
    engine: &mut E,
    intake: &EntitySet,
    base_mesh_size: f64,
    max_dim: f64,
) -> Result<SizeField, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    let surfaces: Vec<f64> = intake.of_dim(2).tags().into_iter().map(f64::from).collect();

    let distance = engine.add_field(FieldKind::Distance)?;
    engine.set_field_numbers(distance, "SurfacesList", &surfaces)?;
    engine.set_field_number(distance, "Sampling", DISTANCE_SAMPLING)?;

    let (size_min, size_max, dist_min, dist_max) = SizeField::parameters(base_mesh_size, max_dim);
    let threshold = engine.add_field(FieldKind::Threshold)?;
    engine.set_field_number(threshold, "InField", f64::from(distance.0))?;
    engine.set_field_number(threshold, "SizeMin", size_min)?;
    engine.set_field_number(threshold, "SizeMax", size_max)?;
    engine.set_field_number(threshold, "DistMin", dist_min)?;
    engine.set_field_number(threshold, "DistMax", dist_max)?;
    engine.set_background_field(threshold)?;

    log::info!(
        "size field {threshold} (distance {distance}): size {size_min}..{size_max} over distance {dist_min}..{dist_max}"
    );
    Ok(SizeField {
        distance,
        threshold,
        size_min,
        size_max,
        dist_min,
        dist_max,
    })
}
