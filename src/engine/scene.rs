//! JSON scene files read by the in-memory kernel.
//!
//! A scene is a list of axis-aligned primitives:
//!
//! ```json
//! { "shapes": [
//!     { "kind": "solid", "min": [0, 0, 0], "max": [1, 1, 1] },
//!     { "kind": "shell", "min": [2, 0, 0], "max": [3, 1, 1] },
//!     { "kind": "sheet", "min": [0, 0, 2], "max": [1, 1, 2] }
//! ] }
//! ```
//!
//! - `solid`: a box volume with its six faces.
//! - `shell`: the six faces of a box without a volume (surface-only export).
//! - `sheet`: one planar rectangle; exactly one axis must have zero extent.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;
use crate::mesh_error::MesherError;

/// One primitive of a scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ShapeSpec {
    Solid { min: [f64; 3], max: [f64; 3] },
    Shell { min: [f64; 3], max: [f64; 3] },
    Sheet { min: [f64; 3], max: [f64; 3] },
}

impl ShapeSpec {
    pub fn bbox(&self) -> BoundingBox {
        match *self {
            ShapeSpec::Solid { min, max }
            | ShapeSpec::Shell { min, max }
            | ShapeSpec::Sheet { min, max } => BoundingBox::new(min, max),
        }
    }

    fn validate(&self, index: usize) -> Result<(), MesherError> {
        let b = self.bbox();
        if b.min.iter().chain(b.max.iter()).any(|v| !v.is_finite()) {
            return Err(MesherError::import(format!(
                "shape {index}: coordinates must be finite"
            )));
        }
        let e = b.extents();
        if (0..3).any(|i| b.max[i] < b.min[i]) {
            return Err(MesherError::import(format!(
                "shape {index}: max must not be below min"
            )));
        }
        match self {
            ShapeSpec::Solid { .. } | ShapeSpec::Shell { .. } => {
                if e.iter().any(|&x| x <= 0.0) {
                    return Err(MesherError::import(format!(
                        "shape {index}: box needs a positive extent on every axis"
                    )));
                }
            }
            ShapeSpec::Sheet { .. } => {
                let flat = e.iter().filter(|&&x| x == 0.0).count();
                if flat != 1 {
                    return Err(MesherError::import(format!(
                        "shape {index}: sheet needs exactly one zero-extent axis, found {flat}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parsed scene file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub shapes: Vec<ShapeSpec>,
}

impl Scene {
    pub fn from_json_str(text: &str) -> Result<Scene, MesherError> {
        let scene: Scene = serde_json::from_str(text)
            .map_err(|e| MesherError::import(format!("unparseable scene: {e}")))?;
        for (i, shape) in scene.shapes.iter().enumerate() {
            shape.validate(i)?;
        }
        Ok(scene)
    }

    pub fn from_path(path: &Path) -> Result<Scene, MesherError> {
        let text = fs::read_to_string(path)
            .map_err(|e| MesherError::import(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> String {
        // Plain data with finite floats; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_shape_kinds() {
        let scene = Scene::from_json_str(
            r#"{"shapes":[
                {"kind":"solid","min":[0,0,0],"max":[1,1,1]},
                {"kind":"shell","min":[2,0,0],"max":[3,1,1]},
                {"kind":"sheet","min":[0,0,2],"max":[1,1,2]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(scene.shapes.len(), 3);
        assert!(matches!(scene.shapes[2], ShapeSpec::Sheet { .. }));
    }

    #[test]
    fn rejects_flat_solid_and_thick_sheet() {
        let flat_solid = r#"{"shapes":[{"kind":"solid","min":[0,0,0],"max":[1,1,0]}]}"#;
        assert!(matches!(
            Scene::from_json_str(flat_solid),
            Err(MesherError::Import(_))
        ));
        let thick_sheet = r#"{"shapes":[{"kind":"sheet","min":[0,0,0],"max":[1,1,1]}]}"#;
        assert!(matches!(
            Scene::from_json_str(thick_sheet),
            Err(MesherError::Import(_))
        ));
    }

    #[test]
    fn garbage_is_an_import_error() {
        assert!(matches!(
            Scene::from_json_str("ISO-10303-21;"),
            Err(MesherError::Import(_))
        ));
    }
}
