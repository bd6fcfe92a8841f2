//! Density field evaluation from layered noise

use glam::Vec3;

use super::biome::{BiomeParams, CaveHeightMask, MacroLayer};
use super::curve::BakedCurve;
use super::noise::{apply_noise_functions, worley_f1_f2, FbmLayer2d, FbmLayer3d, NoiseFunction};
use crate::core::Result;

/// Seed offsets for each derived noise layer
pub const MACRO_SEED_STRIDE: u32 = 10;
pub const DETAIL_SEED_OFFSET: u32 = 30;
pub const WARP_SEED_OFFSET: u32 = 40;
pub const PLACEMENT_SEED_OFFSET: u32 = 50;

struct MacroSampler {
    noise: FbmLayer2d,
    curve: BakedCurve,
    weight: f32,
    functions: Vec<NoiseFunction>,
    power: f32,
    terrace_steps: u32,
}

impl MacroSampler {
    fn new(layer: &MacroLayer, seed: u32) -> Result<Self> {
        Ok(Self {
            noise: FbmLayer2d::new(layer.noise.clone(), seed),
            curve: layer.curve.bake()?,
            weight: layer.weight,
            functions: layer.functions.clone(),
            power: layer.power,
            terrace_steps: layer.terrace_steps,
        })
    }

    fn weighted(&self, x: f32, z: f32) -> f32 {
        let raw = self.noise.sample(x, z);
        let shaped = apply_noise_functions(raw, &self.functions, self.power, self.terrace_steps);
        self.curve.sample(shaped) * self.weight
    }
}

struct CavernSampler {
    warp: FbmLayer3d,
    warp_strength: f32,
    frequency: f32,
    strength: f32,
    sharpness: f32,
    gradient: BakedCurve,
}

impl CavernSampler {
    fn carve(&self, p: Vec3, normalized_y: f32, span: f32) -> f32 {
        let warped = p + Vec3::splat(self.warp.sample(p) * self.warp_strength);
        let (f1, f2) = worley_f1_f2(warped * self.frequency);
        let ridge = (1.0 - (f2 - f1)).clamp(0.0, 1.0);
        let gradient = self.gradient.sample(normalized_y).clamp(0.0, 1.0);
        ridge.powf(self.sharpness) * span * gradient * self.strength
    }
}

/// Deterministic density field for one biome and seed.
///
/// Positive density is solid, negative is air. Immutable once built, so it is
/// shared across worker threads behind an `Arc`.
pub struct TerrainGenerator {
    seed: u32,
    chunk_height: f32,
    /// `terrain_amplitude - 1`, the span normalized noise is stretched over
    amplitude_span: f32,
    macro_layers: [MacroSampler; 3],
    total_weight: f32,
    detail: FbmLayer3d,
    detail_influence: f32,
    vertical_gradient: BakedCurve,
    caverns: Option<CavernSampler>,
    cave_mask: Option<CaveHeightMask>,
}

impl TerrainGenerator {
    /// Bake curves and octave offsets for `biome`.
    ///
    /// Fails with a configuration error if the biome is incomplete.
    pub fn new(biome: &BiomeParams, seed: u32, chunk_height: u32) -> Result<Self> {
        biome.validate()?;
        let [continentalness, erosion, peaks] = biome.macro_layers()?;

        let macro_layers = [
            MacroSampler::new(continentalness, seed)?,
            MacroSampler::new(erosion, seed.wrapping_add(MACRO_SEED_STRIDE))?,
            MacroSampler::new(peaks, seed.wrapping_add(2 * MACRO_SEED_STRIDE))?,
        ];
        let total_weight = macro_layers.iter().map(|l| l.weight).sum();

        let caverns = match &biome.caverns {
            Some(params) => Some(CavernSampler {
                warp: FbmLayer3d::new(params.warp.clone(), seed.wrapping_add(WARP_SEED_OFFSET), 0.0),
                warp_strength: params.warp_strength,
                frequency: params.frequency,
                strength: params.strength,
                sharpness: params.sharpness,
                gradient: params.vertical_gradient.bake()?,
            }),
            None => None,
        };

        log::debug!(
            "Terrain generator for biome '{}' (seed {seed}, height {chunk_height}, caverns: {})",
            biome.name,
            caverns.is_some()
        );

        Ok(Self {
            seed,
            chunk_height: chunk_height as f32,
            amplitude_span: biome.terrain_amplitude - 1.0,
            macro_layers,
            total_weight,
            detail: FbmLayer3d::new(
                biome.detail.noise.clone(),
                seed.wrapping_add(DETAIL_SEED_OFFSET),
                biome.detail.carve_bias,
            ),
            detail_influence: biome.detail.influence,
            vertical_gradient: biome.vertical_gradient.bake()?,
            caverns,
            cave_mask: biome.cave_mask.clone(),
        })
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn chunk_height(&self) -> f32 {
        self.chunk_height
    }

    /// Weighted macro noise at world (x, z), in `[0,1]`
    pub fn macro_noise(&self, x: f32, z: f32) -> f32 {
        let sum: f32 = self.macro_layers.iter().map(|l| l.weighted(x, z)).sum();
        sum / self.total_weight
    }

    /// Surface height of the 2D terrain at world (x, z), before 3D carving
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.clamp_height(self.macro_noise(x, z))
    }

    fn clamp_height(&self, macro_noise: f32) -> f32 {
        (macro_noise * self.amplitude_span).clamp(0.0, (self.chunk_height - 1.0).max(0.0))
    }

    /// Density at a world position
    pub fn density(&self, p: Vec3) -> f32 {
        let macro_noise = self.macro_noise(p.x, p.z);
        let base = self.clamp_height(macro_noise) - p.y;
        base - self.masked_modifier(p, macro_noise)
    }

    /// 3D modifier subtracted from the 2D base density.
    ///
    /// Positive carves material away, negative adds it.
    pub fn modifier(&self, p: Vec3) -> f32 {
        match self.cave_mask {
            Some(_) => self.masked_modifier(p, self.macro_noise(p.x, p.z)),
            None => self.unmasked_modifier(p),
        }
    }

    fn masked_modifier(&self, p: Vec3, macro_noise: f32) -> f32 {
        let modifier = self.unmasked_modifier(p);
        match &self.cave_mask {
            Some(mask) => modifier * mask.sample(macro_noise),
            None => modifier,
        }
    }

    fn unmasked_modifier(&self, p: Vec3) -> f32 {
        let normalized_y = if self.chunk_height > 0.0 { p.y / self.chunk_height } else { 0.0 };
        let gradient = self.vertical_gradient.sample(normalized_y).clamp(0.0, 1.0);

        let mut modifier = self.detail.sample(p) * self.detail_influence * gradient * self.amplitude_span;
        if let Some(caverns) = &self.caverns {
            modifier += caverns.carve(p, normalized_y, self.amplitude_span);
        }
        modifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::biome::{CaveHeightMask, CavernParams};
    use crate::terrain::curve::CurveSpec;
    use crate::terrain::noise::NoiseSettings;

    fn generator() -> TerrainGenerator {
        TerrainGenerator::new(&BiomeParams::default(), 1337, 128).unwrap()
    }

    #[test]
    fn test_density_deterministic() {
        let a = generator();
        let b = generator();
        for i in 0..100 {
            let p = Vec3::new(i as f32 * 3.7 - 50.0, (i % 40) as f32 * 2.0, i as f32 * -1.3);
            let da = a.density(p);
            assert_eq!(da.to_bits(), a.density(p).to_bits());
            assert_eq!(da.to_bits(), b.density(p).to_bits());
        }
    }

    #[test]
    fn test_height_clamped() {
        let biome = BiomeParams {
            terrain_amplitude: 10_000.0,
            ..Default::default()
        };
        let generator = TerrainGenerator::new(&biome, 3, 64).unwrap();
        for i in 0..50 {
            let h = generator.height_at(i as f32 * 13.0, i as f32 * 5.0);
            assert!((0.0..=63.0).contains(&h));
        }
    }

    #[test]
    fn test_macro_noise_in_unit_range() {
        let generator = generator();
        for i in 0..100 {
            let v = generator.macro_noise(i as f32 * 17.0, i as f32 * -9.0);
            assert!((0.0..=1.0).contains(&v), "macro noise {v}");
        }
    }

    #[test]
    fn test_no_detail_gives_height_field() {
        let mut biome = BiomeParams::default();
        biome.detail.influence = 0.0;
        let generator = TerrainGenerator::new(&biome, 5, 128).unwrap();
        let h = generator.height_at(10.0, 20.0);
        assert!(generator.density(Vec3::new(10.0, h - 1.0, 20.0)) > 0.0);
        assert!(generator.density(Vec3::new(10.0, h + 1.0, 20.0)) < 0.0);
        assert!((generator.density(Vec3::new(10.0, 0.0, 20.0)) - h).abs() < 1e-4);
    }

    #[test]
    fn test_positive_modifier_carves() {
        let mut biome = BiomeParams::default();
        biome.detail.carve_bias = 1.0;
        biome.detail.influence = 0.2;
        biome.vertical_gradient = CurveSpec::Samples(vec![1.0]);
        let generator = TerrainGenerator::new(&biome, 5, 128).unwrap();
        let p = Vec3::new(4.0, 8.0, 4.0);
        let base = generator.height_at(p.x, p.z) - p.y;
        assert!(generator.modifier(p) >= 0.0);
        assert!(generator.density(p) <= base);
    }

    #[test]
    fn test_vertical_gradient_suppresses_detail() {
        let mut biome = BiomeParams::default();
        biome.vertical_gradient = CurveSpec::Samples(vec![0.0]);
        let generator = TerrainGenerator::new(&biome, 5, 128).unwrap();
        assert_eq!(generator.modifier(Vec3::new(1.0, 30.0, 2.0)), 0.0);
    }

    #[test]
    fn test_caverns_only_carve() {
        let mut biome = BiomeParams::default();
        biome.detail.influence = 0.0;
        biome.caverns = Some(CavernParams {
            frequency: 0.05,
            strength: 0.5,
            sharpness: 2.0,
            warp: NoiseSettings::default(),
            warp_strength: 4.0,
            vertical_gradient: CurveSpec::Samples(vec![1.0]),
        });
        let generator = TerrainGenerator::new(&biome, 5, 128).unwrap();
        for i in 0..40 {
            let p = Vec3::new(i as f32 * 2.5, 20.0, i as f32 * 1.5);
            assert!(generator.modifier(p) >= 0.0);
        }
    }

    #[test]
    fn test_cave_mask_weakens_carving_in_lowlands() {
        let mut carving = BiomeParams::default();
        carving.detail.carve_bias = 1.0;
        carving.detail.influence = 0.2;
        carving.vertical_gradient = CurveSpec::Samples(vec![1.0]);
        let masked_biome = BiomeParams {
            cave_mask: Some(CaveHeightMask {
                height_bias: 2.0,
                strength: 1.0,
            }),
            ..carving.clone()
        };
        let plain = TerrainGenerator::new(&carving, 9, 128).unwrap();
        let masked = TerrainGenerator::new(&masked_biome, 9, 128).unwrap();

        for i in 0..40 {
            let p = Vec3::new(i as f32 * 11.0, 16.0, i as f32 * -7.0);
            let n = plain.macro_noise(p.x, p.z);
            let unmasked = plain.modifier(p);
            let weakened = masked.modifier(p);

            // Same macro field; only the 3D term is scaled
            assert_eq!(n.to_bits(), masked.macro_noise(p.x, p.z).to_bits());
            assert!((weakened - unmasked * n * n).abs() < 1e-3);
            assert!(weakened <= unmasked + 1e-4);
            assert!(masked.density(p) >= plain.density(p) - 1e-3);
        }
    }

    #[test]
    fn test_zero_height_removes_carving() {
        let mut biome = BiomeParams::default();
        biome.detail.carve_bias = 1.0;
        biome.cave_mask = Some(CaveHeightMask {
            height_bias: 1.0,
            strength: 1.0,
        });
        let mask = biome.cave_mask.clone().unwrap();
        assert_eq!(mask.sample(0.0), 0.0);
        assert_eq!(mask.sample(1.0), 1.0);
        assert!((mask.sample(0.25) - 0.25).abs() < 1e-6);
        assert!(TerrainGenerator::new(&biome, 2, 64).is_ok());
    }

    #[test]
    fn test_incomplete_biome_refused() {
        let biome = BiomeParams {
            peaks_and_valleys: None,
            ..Default::default()
        };
        assert!(TerrainGenerator::new(&biome, 1, 64).is_err());
    }
}
