//! Named physical groups carried into the exported mesh.

use serde::{Deserialize, Serialize};

use crate::engine::{BoundaryQuery, GeometryEngine};
use crate::mesh_error::MesherError;
use crate::pipeline::resolve::Resolution;
use crate::topology::EntitySet;

pub const INTAKE_WALLS: &str = "intake_walls";
pub const FAR_FIELD: &str = "far_field";
pub const FLUID_VOLUME: &str = "fluid_volume";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalGroups {
    pub intake_walls: i32,
    /// `None` when every fluid boundary surface is an intake surface.
    pub far_field: Option<i32>,
    pub fluid_volume: i32,
}

/// Registers `intake_walls`, `far_field` and `fluid_volume`.
pub fn add_physical_groups<E>(
    engine: &mut E,
    resolution: &Resolution,
    fluid: &EntitySet,
) -> Result<PhysicalGroups, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    let intake = &resolution.intake.entities;
    let far = engine
        .boundary(fluid, BoundaryQuery::per_entity())?
        .of_dim(2)
        .canonical()
        .difference(intake);

    let intake_walls = engine.add_physical_group(2, &intake.tags(), INTAKE_WALLS)?;
    let far_field = if far.is_empty() {
        log::warn!("fluid boundary has no far-field surfaces; '{FAR_FIELD}' group omitted");
        None
    } else {
        Some(engine.add_physical_group(2, &far.tags(), FAR_FIELD)?)
    };
    let fluid_volume = engine.add_physical_group(3, &fluid.of_dim(3).tags(), FLUID_VOLUME)?;

    log::debug!(
        "physical groups: {INTAKE_WALLS}={intake_walls} ({} surfaces), {FAR_FIELD}={far_field:?} ({} surfaces), {FLUID_VOLUME}={fluid_volume}",
        intake.len(),
        far.len()
    );
    Ok(PhysicalGroups {
        intake_walls,
        far_field,
        fluid_volume,
    })
}
