//! Geometry import and new-entity detection.

use std::fs;
use std::path::Path;

use crate::engine::GeometryEngine;
use crate::mesh_error::MesherError;
use crate::topology::EntitySet;

/// Imports `path` and returns the entities the import introduced.
///
/// The result is the element-wise difference between the model's entities
/// immediately after and immediately before the import call, in the order
/// the engine lists them. It must hold at least one surface or volume.
pub fn import_geometry<E>(engine: &mut E, path: &Path) -> Result<EntitySet, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    let meta = fs::metadata(path)
        .map_err(|e| MesherError::import(format!("{}: {e}", path.display())))?;
    if !meta.is_file() {
        return Err(MesherError::import(format!(
            "{}: not a regular file",
            path.display()
        )));
    }
    if meta.len() == 0 {
        return Err(MesherError::import(format!("{}: file is empty", path.display())));
    }

    let before = engine.entities(None);
    engine.import(path).map_err(|e| match e {
        MesherError::Import(_) => e,
        other => MesherError::import(format!("{}: {other}", path.display())),
    })?;
    let after = engine.entities(None);
    let new = after.difference(&before);

    log::info!(
        "imported {}: {} new entities ({} surfaces, {} volumes)",
        path.display(),
        new.len(),
        new.of_dim(2).len(),
        new.of_dim(3).len()
    );
    log::debug!("new entities: {:?}", new.as_slice());

    if new.max_dim().is_none_or(|d| d < 2) {
        return Err(MesherError::import(format!(
            "{}: no usable geometry (no surfaces or volumes were imported)",
            path.display()
        )));
    }
    Ok(new)
}
