//! Pipeline configuration.
//!
//! Every section is `#[serde(default)]`, so a JSON file only needs the keys
//! it overrides:
//!
//! ```json
//! { "mesh": { "domain_scale": 3.0, "base_mesh_size": 0.25 },
//!   "boundary_layer": { "first_layer_thickness": 0.01, "layer_count": 8 } }
//! ```
//!
//! [`PipelineConfig::validate`] runs before the engine is touched; every
//! rejection is a [`MesherError::InvalidConfig`].

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::HealFlags;
use crate::mesh_error::MesherError;

/// Recommended range for [`MeshOptions::domain_scale`].
pub const RECOMMENDED_DOMAIN_SCALE: (f64, f64) = (1.5, 5.0);

/// Gmsh 2D algorithm codes used by the driver.
pub mod algorithm {
    pub const MESH_ADAPT: i32 = 1;
    pub const AUTOMATIC: i32 = 2;
    pub const DELAUNAY: i32 = 5;
    pub const FRONTAL_DELAUNAY: i32 = 6;
    /// 3D Delaunay.
    pub const DELAUNAY_3D: i32 = 1;
}

/// How boundary layers behave where they meet each other.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntersectionMode {
    None,
    #[default]
    Restrict,
    Split,
}

impl IntersectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IntersectionMode::None => "none",
            IntersectionMode::Restrict => "restrict",
            IntersectionMode::Split => "split",
        }
    }
}

impl fmt::Display for IntersectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntersectionMode {
    type Err = MesherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(IntersectionMode::None),
            "restrict" => Ok(IntersectionMode::Restrict),
            "split" => Ok(IntersectionMode::Split),
            other => Err(MesherError::config(format!(
                "unknown intersection mode '{other}' (expected none, restrict or split)"
            ))),
        }
    }
}

/// Near-wall inflation parameters. Built once from CLI/config input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryLayerConfig {
    pub first_layer_thickness: f64,
    pub growth_ratio: f64,
    pub thickness: f64,
    /// Explicit number of layers; 0 lets the mesher derive it.
    pub layer_count: u32,
    pub smoothing: bool,
    pub angle_tolerance_deg: f64,
    pub intersection: IntersectionMode,
}

impl Default for BoundaryLayerConfig {
    fn default() -> Self {
        BoundaryLayerConfig {
            first_layer_thickness: 0.05,
            growth_ratio: 1.2,
            thickness: 0.5,
            layer_count: 0,
            smoothing: true,
            angle_tolerance_deg: 30.0,
            intersection: IntersectionMode::Restrict,
        }
    }
}

impl BoundaryLayerConfig {
    pub fn validate(&self) -> Result<(), MesherError> {
        let finite = [
            ("first_layer_thickness", self.first_layer_thickness),
            ("growth_ratio", self.growth_ratio),
            ("thickness", self.thickness),
            ("angle_tolerance_deg", self.angle_tolerance_deg),
        ];
        if let Some((name, v)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(MesherError::config(format!(
                "boundary layer {name} must be finite, got {v}"
            )));
        }
        if self.first_layer_thickness <= 0.0 {
            return Err(MesherError::config(format!(
                "boundary layer first_layer_thickness must be > 0, got {}",
                self.first_layer_thickness
            )));
        }
        if self.thickness <= 0.0 {
            return Err(MesherError::config(format!(
                "boundary layer thickness must be > 0, got {}",
                self.thickness
            )));
        }
        if self.thickness < self.first_layer_thickness {
            return Err(MesherError::config(format!(
                "boundary layer thickness {} is below first_layer_thickness {}",
                self.thickness, self.first_layer_thickness
            )));
        }
        if self.growth_ratio <= 0.0 {
            return Err(MesherError::config(format!(
                "boundary layer growth_ratio must be > 0, got {}",
                self.growth_ratio
            )));
        }
        if !(self.angle_tolerance_deg > 0.0 && self.angle_tolerance_deg < 180.0) {
            return Err(MesherError::config(format!(
                "boundary layer angle_tolerance_deg must be in (0, 180), got {}",
                self.angle_tolerance_deg
            )));
        }
        if self.growth_ratio <= 1.0 {
            log::warn!(
                "boundary layer growth_ratio {} <= 1: layers will not grow away from the wall",
                self.growth_ratio
            );
        }
        Ok(())
    }
}

/// Mesh sizing, algorithm and output options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshOptions {
    /// Far-field box extent as a multiple of the geometry extent.
    pub domain_scale: f64,
    pub base_mesh_size: f64,
    pub algorithm_2d: i32,
    /// Tried once when 2D generation fails. Derived from `algorithm_2d`
    /// when unset.
    pub fallback_algorithm_2d: Option<i32>,
    pub algorithm_3d: i32,
    /// Engine worker threads; `None` auto-detects.
    pub threads: Option<usize>,
    pub optimize_netgen: bool,
    pub binary: bool,
    pub format_version: f64,
}

impl Default for MeshOptions {
    fn default() -> Self {
        MeshOptions {
            domain_scale: 5.0,
            base_mesh_size: 1.0,
            algorithm_2d: algorithm::FRONTAL_DELAUNAY,
            fallback_algorithm_2d: None,
            algorithm_3d: algorithm::DELAUNAY_3D,
            threads: None,
            optimize_netgen: true,
            binary: true,
            format_version: 2.2,
        }
    }
}

impl MeshOptions {
    /// 2D algorithm for the single retry after a surface-meshing failure.
    pub fn fallback_2d(&self) -> i32 {
        match self.fallback_algorithm_2d {
            Some(a) => a,
            None if self.algorithm_2d == algorithm::DELAUNAY => algorithm::FRONTAL_DELAUNAY,
            None => algorithm::DELAUNAY,
        }
    }

    pub fn size_min(&self) -> f64 {
        self.base_mesh_size / 5.0
    }

    pub fn size_max(&self) -> f64 {
        self.base_mesh_size
    }

    pub fn validate(&self) -> Result<(), MesherError> {
        if !self.domain_scale.is_finite() || self.domain_scale <= 1.0 {
            return Err(MesherError::config(format!(
                "domain_scale must be a finite value > 1, got {}",
                self.domain_scale
            )));
        }
        let (lo, hi) = RECOMMENDED_DOMAIN_SCALE;
        if self.domain_scale < lo || self.domain_scale > hi {
            log::warn!(
                "domain_scale {} is outside the recommended range [{lo}, {hi}]",
                self.domain_scale
            );
        }
        if !self.base_mesh_size.is_finite() || self.base_mesh_size <= 0.0 {
            return Err(MesherError::config(format!(
                "base_mesh_size must be a finite value > 0, got {}",
                self.base_mesh_size
            )));
        }
        if self.fallback_2d() == self.algorithm_2d {
            return Err(MesherError::config(format!(
                "fallback_algorithm_2d must differ from algorithm_2d ({})",
                self.algorithm_2d
            )));
        }
        if self.threads == Some(0) {
            return Err(MesherError::config("threads must be at least 1"));
        }
        if !self.format_version.is_finite() || self.format_version <= 0.0 {
            return Err(MesherError::config(format!(
                "format_version must be positive, got {}",
                self.format_version
            )));
        }
        Ok(())
    }
}

/// Best-effort shape healing after fragmentation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealOptions {
    pub enabled: bool,
    pub tolerance: f64,
    pub flags: HealFlags,
}

impl Default for HealOptions {
    fn default() -> Self {
        HealOptions {
            enabled: true,
            tolerance: 1e-2,
            flags: HealFlags::default(),
        }
    }
}

impl HealOptions {
    pub fn validate(&self) -> Result<(), MesherError> {
        if self.enabled && !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(MesherError::config(format!(
                "heal tolerance must be a finite value > 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Whole-run configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mesh: MeshOptions,
    /// `None` skips the boundary-layer field entirely.
    pub boundary_layer: Option<BoundaryLayerConfig>,
    pub heal: HealOptions,
    /// Verbose engine output.
    pub debug: bool,
    /// Never open the engine viewer.
    pub headless: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            mesh: MeshOptions::default(),
            boundary_layer: Some(BoundaryLayerConfig::default()),
            heal: HealOptions::default(),
            debug: false,
            headless: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, MesherError> {
        serde_json::from_str(text)
            .map_err(|e| MesherError::config(format!("unparseable configuration: {e}")))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, MesherError> {
        let text = fs::read_to_string(path)
            .map_err(|e| MesherError::config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), MesherError> {
        self.mesh.validate()?;
        if let Some(bl) = &self.boundary_layer {
            bl.validate()?;
        }
        self.heal.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = PipelineConfig::from_json_str(
            r#"{"mesh":{"base_mesh_size":0.25},"boundary_layer":{"layer_count":8}}"#,
        )
        .unwrap();
        assert_eq!(cfg.mesh.base_mesh_size, 0.25);
        assert_eq!(cfg.mesh.domain_scale, 5.0);
        let bl = cfg.boundary_layer.unwrap();
        assert_eq!(bl.layer_count, 8);
        assert_eq!(bl.growth_ratio, 1.2);
        assert!(cfg.heal.flags.sew_faces);
    }

    #[test]
    fn null_boundary_layer_disables_it() {
        let cfg = PipelineConfig::from_json_str(r#"{"boundary_layer":null}"#).unwrap();
        assert!(cfg.boundary_layer.is_none());
    }

    #[test]
    fn boundary_layer_thickness_rules() {
        let thin = BoundaryLayerConfig {
            thickness: 0.01,
            first_layer_thickness: 0.05,
            ..BoundaryLayerConfig::default()
        };
        assert!(matches!(thin.validate(), Err(MesherError::InvalidConfig(_))));

        let zero_first = BoundaryLayerConfig {
            first_layer_thickness: 0.0,
            ..BoundaryLayerConfig::default()
        };
        assert!(zero_first.validate().is_err());

        let negative = BoundaryLayerConfig {
            thickness: -1.0,
            ..BoundaryLayerConfig::default()
        };
        assert!(negative.validate().is_err());

        // Equal thickness is a single layer and is accepted.
        let single = BoundaryLayerConfig {
            thickness: 0.05,
            ..BoundaryLayerConfig::default()
        };
        single.validate().unwrap();
    }

    #[test]
    fn fallback_algorithm_never_repeats_primary() {
        let mut opts = MeshOptions::default();
        assert_eq!(opts.fallback_2d(), algorithm::DELAUNAY);
        opts.algorithm_2d = algorithm::DELAUNAY;
        assert_eq!(opts.fallback_2d(), algorithm::FRONTAL_DELAUNAY);
        opts.fallback_algorithm_2d = Some(algorithm::MESH_ADAPT);
        assert_eq!(opts.fallback_2d(), algorithm::MESH_ADAPT);
    }

    #[test]
    fn domain_scale_must_exceed_one() {
        let opts = MeshOptions {
            domain_scale: 1.0,
            ..MeshOptions::default()
        };
        assert!(opts.validate().is_err());
        let wide = MeshOptions {
            domain_scale: 8.0,
            ..MeshOptions::default()
        };
        wide.validate().unwrap();
    }

    #[test]
    fn intersection_mode_parses_case_insensitively() {
        assert_eq!("Split".parse::<IntersectionMode>().unwrap(), IntersectionMode::Split);
        assert!("merge".parse::<IntersectionMode>().is_err());
    }
}
