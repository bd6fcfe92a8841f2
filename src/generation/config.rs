//! World generation configuration.
//!
//! Loaded once at startup from JSON (or built from defaults) and validated
//! before any chunk is generated. Nothing here changes mid-session.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clutter::rules::{Orientation, PlacementRule, PrefabSpec};
use crate::core::{Error, Result};
use crate::navigation::NavBakeSettings;
use crate::streaming::lod::{LodDescriptor, LodInfo};
use crate::terrain::{BiomeParams, NoiseSettings};

/// Configuration for terrain generation and streaming.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Seed for every noise layer and placement stream.
    pub seed: u32,
    /// Chunk width, height and depth in world units.
    pub chunk_dimensions: [u32; 3],
    /// Density threshold separating solid from air.
    pub iso_level: f32,
    /// LOD table, ascending by visible distance; entry 0 is highest detail.
    pub lods: Vec<LodInfo>,
    /// Minimum seconds between two navmesh bake dispatches.
    pub nav_rebuild_interval_secs: f32,
    /// Maximum navmesh bakes running at once.
    pub max_concurrent_bakes: usize,
    /// Layer filter passed to navigation source collection.
    pub nav_layer_mask: u32,
    /// Agent parameters for navmesh bakes.
    pub nav_agent: NavBakeSettings,
    /// Background worker threads (0 = one per core).
    pub worker_threads: usize,
    pub biome: BiomeParams,
    pub placement_rules: Vec<PlacementRule>,
    pub prefabs: Vec<PrefabSpec>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            chunk_dimensions: [32, 128, 32],
            iso_level: 0.0,
            lods: vec![
                LodInfo::new(0, 64.0),
                LodInfo::new(1, 128.0),
                LodInfo::new(2, 256.0),
            ],
            nav_rebuild_interval_secs: 1.0,
            max_concurrent_bakes: 1,
            nav_layer_mask: u32::MAX,
            nav_agent: NavBakeSettings::default(),
            worker_threads: 0,
            biome: BiomeParams::default(),
            placement_rules: vec![
                PlacementRule {
                    name: "pines".to_string(),
                    prefab: "pine".to_string(),
                    coverage: 0.3,
                    noise: NoiseSettings {
                        octaves: 3,
                        frequency: 0.05,
                        ..Default::default()
                    },
                    height_range: [0.05, 0.7],
                    slope_range: [0.0, 30.0],
                    scale_range: [0.8, 1.4],
                    orientation: Orientation::Vertical,
                    random_yaw: true,
                },
                PlacementRule {
                    name: "boulders".to_string(),
                    prefab: "boulder".to_string(),
                    coverage: 0.08,
                    noise: NoiseSettings {
                        octaves: 2,
                        frequency: 0.11,
                        ..Default::default()
                    },
                    height_range: [0.0, 1.0],
                    slope_range: [0.0, 60.0],
                    scale_range: [0.5, 2.0],
                    orientation: Orientation::SurfaceAligned,
                    random_yaw: true,
                },
            ],
            prefabs: vec![PrefabSpec::new("pine", 512), PrefabSpec::new("boulder", 128)],
        }
    }
}

impl GenerationConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!(
            "Loaded generation config from {} (seed {}, {} LODs, {} placement rules)",
            path.display(),
            config.seed,
            config.lods.len(),
            config.placement_rules.len()
        );
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check everything generation depends on. Any failure is fatal.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_dimensions.contains(&0) {
            return Err(Error::config(format!(
                "chunk dimensions must be non-zero, got {:?}",
                self.chunk_dimensions
            )));
        }
        if !self.iso_level.is_finite() {
            return Err(Error::config("iso_level must be finite"));
        }

        let lods = self.lod_descriptor()?;
        for lod in lods.levels() {
            let step = lod.step();
            if self.chunk_dimensions.iter().any(|d| d % step != 0) {
                return Err(Error::config(format!(
                    "chunk dimensions {:?} are not divisible by the LOD {} stride {step}",
                    self.chunk_dimensions, lod.level
                )));
            }
        }

        self.nav_rebuild_interval()?;
        if self.max_concurrent_bakes == 0 {
            return Err(Error::config("max_concurrent_bakes must be at least 1"));
        }

        self.biome.validate()?;

        let mut names = HashSet::new();
        for prefab in &self.prefabs {
            if !names.insert(prefab.name.as_str()) {
                return Err(Error::config(format!("prefab '{}' is declared twice", prefab.name)));
            }
        }
        if self.prefabs.len() > u16::MAX as usize {
            return Err(Error::config("too many prefab kinds"));
        }
        for rule in &self.placement_rules {
            rule.validate(&self.prefabs)?;
        }

        Ok(())
    }

    /// Minimum time between navmesh bake dispatches.
    ///
    /// Fails for negative, non-finite or unrepresentably large values.
    pub fn nav_rebuild_interval(&self) -> Result<Duration> {
        Duration::try_from_secs_f32(self.nav_rebuild_interval_secs).map_err(|e| {
            Error::config(format!(
                "nav_rebuild_interval_secs must be a non-negative duration, got {}: {e}",
                self.nav_rebuild_interval_secs
            ))
        })
    }

    pub fn lod_descriptor(&self) -> Result<LodDescriptor> {
        LodDescriptor::new(self.lods.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GenerationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");

        let config = GenerationConfig {
            seed: 777,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = GenerationConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"seed": 42, "chunk_dimensions": [16, 64, 16]}"#).unwrap();

        let loaded = GenerationConfig::load(&path).unwrap();
        assert_eq!(loaded.seed, 42);
        assert_eq!(loaded.chunk_dimensions, [16, 64, 16]);
        assert_eq!(loaded.lods, GenerationConfig::default().lods);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GenerationConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ seed: ").unwrap();
        assert!(matches!(GenerationConfig::load(&path), Err(Error::Parse(_))));
    }

    #[test]
    fn test_missing_macro_layer_refused_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_erosion.json");
        let mut config = GenerationConfig::default();
        config.biome.erosion = None;
        config.save(&path).unwrap();

        assert!(matches!(GenerationConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_stride_must_divide_dimensions() {
        let config = GenerationConfig {
            chunk_dimensions: [30, 128, 32],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_ascending_lods_refused() {
        let config = GenerationConfig {
            lods: vec![LodInfo::new(0, 100.0), LodInfo::new(1, 90.0)],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_prefab_refused() {
        let mut config = GenerationConfig::default();
        config.prefabs.push(PrefabSpec::new("pine", 1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_prefab_in_rule_refused() {
        let mut config = GenerationConfig::default();
        config.prefabs.retain(|p| p.name != "boulder");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nav_interval_must_fit_duration() {
        for secs in [1e20, f32::INFINITY, f32::NAN, -0.5] {
            let config = GenerationConfig {
                nav_rebuild_interval_secs: secs,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(Error::Config(_))), "accepted {secs}");
        }

        let config = GenerationConfig {
            nav_rebuild_interval_secs: 0.25,
            ..Default::default()
        };
        assert_eq!(config.nav_rebuild_interval().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_bake_concurrency_refused() {
        let config = GenerationConfig {
            max_concurrent_bakes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
