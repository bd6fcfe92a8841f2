//! Biome parameter sets: the noise layers and curves that shape terrain

use serde::{Deserialize, Serialize};

use super::curve::CurveSpec;
use super::noise::{NoiseFunction, NoiseSettings};
use crate::core::{Error, Result};

fn default_power() -> f32 {
    1.0
}

fn default_terrace_steps() -> u32 {
    4
}

/// A 2D macro layer (continentalness, erosion or peaks-and-valleys)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MacroLayer {
    pub noise: NoiseSettings,
    /// Response curve applied to the shaped noise value
    pub curve: CurveSpec,
    /// Contribution to the weighted macro sum
    pub weight: f32,
    #[serde(default)]
    pub functions: Vec<NoiseFunction>,
    #[serde(default = "default_power")]
    pub power: f32,
    #[serde(default = "default_terrace_steps")]
    pub terrace_steps: u32,
}

impl MacroLayer {
    fn validate(&self, name: &str) -> Result<()> {
        self.noise.validate(name)?;
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(Error::config(format!("{name}: weight must be non-negative, got {}", self.weight)));
        }
        if !self.power.is_finite() {
            return Err(Error::config(format!("{name}: power must be finite")));
        }
        self.curve.bake()?;
        Ok(())
    }
}

/// 3D detail layer that carves caves and adds overhangs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetailLayer {
    pub noise: NoiseSettings,
    /// Scale of the 3D modifier relative to the macro amplitude
    pub influence: f32,
    #[serde(default)]
    pub carve_bias: f32,
}

/// Domain-warped Worley caverns added on top of the detail layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CavernParams {
    pub frequency: f32,
    pub strength: f32,
    pub sharpness: f32,
    pub warp: NoiseSettings,
    pub warp_strength: f32,
    pub vertical_gradient: CurveSpec,
}

/// Scales the whole 3D modifier by the macro terrain height
///
/// `mask = macro_noise^height_bias * strength`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaveHeightMask {
    pub height_bias: f32,
    pub strength: f32,
}

impl CaveHeightMask {
    pub fn sample(&self, macro_noise: f32) -> f32 {
        macro_noise.max(0.0).powf(self.height_bias) * self.strength
    }
}

/// Complete procedural description of one biome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiomeParams {
    pub name: String,
    /// Peak terrain height in world units
    pub terrain_amplitude: f32,
    pub continentalness: Option<MacroLayer>,
    pub erosion: Option<MacroLayer>,
    pub peaks_and_valleys: Option<MacroLayer>,
    pub detail: DetailLayer,
    /// Scales the 3D modifier by normalized world height
    pub vertical_gradient: CurveSpec,
    #[serde(default)]
    pub caverns: Option<CavernParams>,
    /// Absent means the 3D modifier applies at full strength everywhere
    #[serde(default)]
    pub cave_mask: Option<CaveHeightMask>,
}

impl BiomeParams {
    /// The three macro layers in evaluation order.
    ///
    /// Fails if any is missing, since density is computed for every voxel.
    pub fn macro_layers(&self) -> Result<[&MacroLayer; 3]> {
        let missing = |layer: &str| {
            Error::config(format!("biome '{}' is missing its {layer} layer", self.name))
        };
        Ok([
            self.continentalness.as_ref().ok_or_else(|| missing("continentalness"))?,
            self.erosion.as_ref().ok_or_else(|| missing("erosion"))?,
            self.peaks_and_valleys.as_ref().ok_or_else(|| missing("peaks-and-valleys"))?,
        ])
    }

    pub fn validate(&self) -> Result<()> {
        if !self.terrain_amplitude.is_finite() || self.terrain_amplitude < 1.0 {
            return Err(Error::config(format!(
                "biome '{}': terrain_amplitude must be at least 1, got {}",
                self.name, self.terrain_amplitude
            )));
        }

        let layers = self.macro_layers()?;
        let names = ["continentalness", "erosion", "peaks-and-valleys"];
        for (layer, name) in layers.iter().zip(names) {
            layer.validate(&format!("biome '{}' {name}", self.name))?;
        }
        let total_weight: f32 = layers.iter().map(|l| l.weight).sum();
        if total_weight <= 0.0 {
            return Err(Error::config(format!("biome '{}': macro layer weights sum to zero", self.name)));
        }

        self.detail.noise.validate(&format!("biome '{}' detail", self.name))?;
        if !self.detail.influence.is_finite() {
            return Err(Error::config(format!("biome '{}': detail influence must be finite", self.name)));
        }
        if !(-1.0..=1.0).contains(&self.detail.carve_bias) {
            return Err(Error::config(format!(
                "biome '{}': carve_bias must be within [-1, 1], got {}",
                self.name, self.detail.carve_bias
            )));
        }
        self.vertical_gradient.bake()?;

        if let Some(caverns) = &self.caverns {
            caverns.warp.validate(&format!("biome '{}' cavern warp", self.name))?;
            if !caverns.frequency.is_finite() || caverns.frequency <= 0.0 {
                return Err(Error::config(format!("biome '{}': cavern frequency must be positive", self.name)));
            }
            if !caverns.sharpness.is_finite() || caverns.sharpness <= 0.0 {
                return Err(Error::config(format!("biome '{}': cavern sharpness must be positive", self.name)));
            }
            caverns.vertical_gradient.bake()?;
        }

        if let Some(mask) = &self.cave_mask {
            if !mask.height_bias.is_finite() || mask.height_bias < 0.0 {
                return Err(Error::config(format!(
                    "biome '{}': cave mask height_bias must be non-negative, got {}",
                    self.name, mask.height_bias
                )));
            }
            if !mask.strength.is_finite() {
                return Err(Error::config(format!("biome '{}': cave mask strength must be finite", self.name)));
            }
        }

        Ok(())
    }
}

impl Default for BiomeParams {
    /// Rolling hills with occasional overhangs
    fn default() -> Self {
        Self {
            name: "hills".to_string(),
            terrain_amplitude: 96.0,
            continentalness: Some(MacroLayer {
                noise: NoiseSettings {
                    octaves: 4,
                    frequency: 0.002,
                    ..Default::default()
                },
                curve: CurveSpec::keys(&[[0.0, 0.15], [0.35, 0.3], [0.6, 0.55], [1.0, 0.85]]),
                weight: 1.0,
                functions: Vec::new(),
                power: 1.0,
                terrace_steps: 4,
            }),
            erosion: Some(MacroLayer {
                noise: NoiseSettings {
                    octaves: 3,
                    frequency: 0.004,
                    ..Default::default()
                },
                curve: CurveSpec::linear(0.7, 0.3),
                weight: 0.6,
                functions: vec![NoiseFunction::Standard, NoiseFunction::Billow],
                power: 1.0,
                terrace_steps: 4,
            }),
            peaks_and_valleys: Some(MacroLayer {
                noise: NoiseSettings {
                    octaves: 5,
                    frequency: 0.008,
                    ..Default::default()
                },
                curve: CurveSpec::keys(&[[0.0, 0.2], [0.5, 0.45], [1.0, 1.0]]),
                weight: 0.4,
                functions: vec![NoiseFunction::Ridged],
                power: 1.0,
                terrace_steps: 4,
            }),
            detail: DetailLayer {
                noise: NoiseSettings {
                    octaves: 3,
                    frequency: 0.03,
                    ..Default::default()
                },
                influence: 0.08,
                carve_bias: 0.0,
            },
            vertical_gradient: CurveSpec::keys(&[[0.0, 0.0], [0.1, 1.0], [0.75, 1.0], [1.0, 0.0]]),
            caverns: None,
            cave_mask: None,
        }
    }
}
