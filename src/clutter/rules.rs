//! Placement rules for scatterable object types.

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::terrain::NoiseSettings;

/// Index into the prefab table of a world configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PrefabKind(pub u16);

/// A pooled prefab and how many instances to create up front
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefabSpec {
    pub name: String,
    #[serde(default)]
    pub prewarm: usize,
}

impl PrefabSpec {
    pub fn new(name: impl Into<String>, prewarm: usize) -> Self {
        Self {
            name: name.into(),
            prewarm,
        }
    }
}

/// Resolve a prefab name to its kind
pub fn resolve_prefab(prefabs: &[PrefabSpec], name: &str) -> Option<PrefabKind> {
    prefabs
        .iter()
        .position(|p| p.name == name)
        .map(|i| PrefabKind(i as u16))
}

/// How a placed object is oriented
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// Upright along world Y
    #[default]
    Vertical,
    /// Up axis follows the surface normal
    SurfaceAligned,
}

fn default_random_yaw() -> bool {
    true
}

/// Where and how one object type is scattered over the terrain surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementRule {
    pub name: String,
    /// Prefab name, resolved against the prefab table
    pub prefab: String,
    /// Fraction of placement-noise space that accepts objects (0..=1)
    pub coverage: f32,
    /// Clustering noise sampled at each candidate floor
    pub noise: NoiseSettings,
    /// Accepted surface height, normalized by chunk height
    pub height_range: [f32; 2],
    /// Accepted slope in degrees from world up
    pub slope_range: [f32; 2],
    pub scale_range: [f32; 2],
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default = "default_random_yaw")]
    pub random_yaw: bool,
}

impl PlacementRule {
    pub fn validate(&self, prefabs: &[PrefabSpec]) -> Result<()> {
        let malformed = |what: String| Error::config(format!("placement rule '{}': {what}", self.name));

        if !(0.0..=1.0).contains(&self.coverage) {
            return Err(malformed(format!("coverage must be within [0, 1], got {}", self.coverage)));
        }
        self.noise.validate(&format!("placement rule '{}'", self.name))?;

        let ranges = [
            ("height_range", self.height_range),
            ("slope_range", self.slope_range),
            ("scale_range", self.scale_range),
        ];
        for (name, [min, max]) in ranges {
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(malformed(format!("{name} [{min}, {max}] is inverted or not finite")));
            }
        }
        if self.scale_range[0] <= 0.0 {
            return Err(malformed("scale_range must be positive".to_string()));
        }
        if self.slope_range[0] < 0.0 || self.slope_range[1] > 180.0 {
            return Err(malformed("slope_range must lie within [0, 180] degrees".to_string()));
        }
        if resolve_prefab(prefabs, &self.prefab).is_none() {
            return Err(malformed(format!("unknown prefab '{}'", self.prefab)));
        }
        Ok(())
    }
}
