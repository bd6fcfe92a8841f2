//! Fractal noise primitives shared by the density field and scatter placement.
//!
//! All functions here are pure: the same position, settings and octave
//! offsets always produce the same value. Octave offsets are drawn once per
//! layer from a seed, so a world is fully reproducible from its seed.

use glam::{IVec3, Vec2, Vec3};
use noise::{NoiseFn, Simplex};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Range (exclusive upper bound) of the integer offsets applied per octave.
const OCTAVE_OFFSET_RANGE: i32 = 100_000;

fn default_amplitude() -> f32 {
    1.0
}

/// Base attributes of one fractal noise layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseSettings {
    pub octaves: u32,
    pub frequency: f32,
    pub lacunarity: f32,
    pub persistence: f32,
    /// Amplitude of the first octave (1.0 for everything but warp layers)
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            octaves: 4,
            frequency: 0.01,
            lacunarity: 2.0,
            persistence: 0.5,
            amplitude: 1.0,
        }
    }
}

impl NoiseSettings {
    /// Reject settings that would make fbm undefined.
    pub fn validate(&self, layer: &str) -> Result<()> {
        if self.octaves == 0 {
            return Err(Error::config(format!("{layer}: octaves must be at least 1")));
        }
        let positive = [
            ("frequency", self.frequency),
            ("lacunarity", self.lacunarity),
            ("amplitude", self.amplitude),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::config(format!("{layer}: {name} must be positive, got {value}")));
            }
        }
        if !self.persistence.is_finite() || self.persistence < 0.0 {
            return Err(Error::config(format!(
                "{layer}: persistence must be non-negative, got {}",
                self.persistence
            )));
        }
        Ok(())
    }
}

/// Shaping functions applied to a normalized 2D layer before curve lookup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseFunction {
    Standard,
    Power,
    Billow,
    Ridged,
    Terraced,
}

/// Apply each function to `value` and average the results.
///
/// Every function maps `[0,1]` into `[0,1]`, so the average does too.
/// An empty list returns `value` unchanged.
pub fn apply_noise_functions(value: f32, functions: &[NoiseFunction], power: f32, terrace_steps: u32) -> f32 {
    if functions.is_empty() {
        return value;
    }

    let total: f32 = functions
        .iter()
        .map(|function| match function {
            NoiseFunction::Standard => value,
            NoiseFunction::Power => value.powf(power),
            NoiseFunction::Billow => (value * 2.0 - 1.0).abs(),
            NoiseFunction::Ridged => 1.0 - (value * 2.0 - 1.0).abs(),
            NoiseFunction::Terraced => {
                let steps = terrace_steps.max(1) as f32;
                (value * steps).floor() / steps
            }
        })
        .sum();

    total / functions.len() as f32
}

/// Per-octave 2D offsets drawn from a seed
pub fn octave_offsets_2d(seed: u32, octaves: u32) -> Vec<Vec2> {
    let mut rng = Pcg32::seed_from_u64(seed as u64);
    (0..octaves)
        .map(|_| {
            Vec2::new(
                rng.gen_range(-OCTAVE_OFFSET_RANGE..OCTAVE_OFFSET_RANGE) as f32,
                rng.gen_range(-OCTAVE_OFFSET_RANGE..OCTAVE_OFFSET_RANGE) as f32,
            )
        })
        .collect()
}

/// Per-octave 3D offsets drawn from a seed
pub fn octave_offsets_3d(seed: u32, octaves: u32) -> Vec<Vec3> {
    let mut rng = Pcg32::seed_from_u64(seed as u64);
    (0..octaves)
        .map(|_| {
            Vec3::new(
                rng.gen_range(-OCTAVE_OFFSET_RANGE..OCTAVE_OFFSET_RANGE) as f32,
                rng.gen_range(-OCTAVE_OFFSET_RANGE..OCTAVE_OFFSET_RANGE) as f32,
                rng.gen_range(-OCTAVE_OFFSET_RANGE..OCTAVE_OFFSET_RANGE) as f32,
            )
        })
        .collect()
}

/// 2D fractal Brownian motion over the XZ plane, remapped to `[0,1]`.
///
/// One octave is summed per entry of `offsets`.
pub fn fbm2d(source: &Simplex, pos: Vec2, settings: &NoiseSettings, offsets: &[Vec2]) -> f32 {
    let mut frequency = settings.frequency;
    let mut amplitude = settings.amplitude;
    let mut sum = 0.0f32;
    let mut max_amplitude = 0.0f32;

    for offset in offsets {
        let p = (pos + *offset) * frequency;
        sum += source.get([p.x as f64, p.y as f64]) as f32 * amplitude;
        max_amplitude += amplitude;

        frequency *= settings.lacunarity;
        amplitude *= settings.persistence;
    }

    if max_amplitude <= 0.0 {
        return 0.5;
    }

    ((sum + max_amplitude) / (2.0 * max_amplitude)).clamp(0.0, 1.0)
}

/// 3D fractal Brownian motion remapped to `[-1,1]` for signed carving.
///
/// `carve_bias` shifts and narrows the output:
/// `n * (1 - |bias|/2) + bias/2`. A bias of zero keeps the plain range.
pub fn fbm3d(source: &Simplex, pos: Vec3, settings: &NoiseSettings, offsets: &[Vec3], carve_bias: f32) -> f32 {
    let mut frequency = settings.frequency;
    let mut amplitude = settings.amplitude;
    let mut sum = 0.0f32;
    let mut max_amplitude = 0.0f32;

    // Offsets shift each octave after scaling, unlike the 2D variant
    for offset in offsets {
        let p = pos * frequency + *offset;
        sum += source.get([p.x as f64, p.y as f64, p.z as f64]) as f32 * amplitude;
        max_amplitude += amplitude;

        frequency *= settings.lacunarity;
        amplitude *= settings.persistence;
    }

    if max_amplitude <= 0.0 {
        return carve_bias * 0.5;
    }

    let normalized = (sum + max_amplitude) / (2.0 * max_amplitude);
    let centered = ((normalized - 0.5) * 2.0).clamp(-1.0, 1.0);
    let bias = carve_bias.clamp(-1.0, 1.0);
    centered * (1.0 - 0.5 * bias.abs()) + bias * 0.5
}

fn fract(v: Vec3) -> Vec3 {
    v - v.floor()
}

/// Deterministic pseudo-random point inside a Worley cell.
fn cell_hash(cell: IVec3) -> Vec3 {
    let mut p3 = fract(cell.as_vec3() * Vec3::new(0.1031, 0.1030, 0.0973));
    let swizzled = Vec3::new(p3.y, p3.z, p3.x) + Vec3::splat(33.33);
    p3 += Vec3::splat(p3.dot(swizzled));
    fract((Vec3::new(p3.x, p3.x, p3.y) + Vec3::new(p3.y, p3.z, p3.z)) * Vec3::new(p3.z, p3.y, p3.x))
}

/// Distances to the nearest (F1) and second-nearest (F2) Worley feature points.
pub fn worley_f1_f2(pos: Vec3) -> (f32, f32) {
    let cell = pos.floor().as_ivec3();
    let mut f1 = f32::MAX;
    let mut f2 = f32::MAX;

    for x in -1..=1 {
        for y in -1..=1 {
            for z in -1..=1 {
                let neighbor = cell + IVec3::new(x, y, z);
                let feature = neighbor.as_vec3() + cell_hash(neighbor);
                let dist = pos.distance(feature);

                if dist < f1 {
                    f2 = f1;
                    f1 = dist;
                } else if dist < f2 {
                    f2 = dist;
                }
            }
        }
    }

    (f1, f2)
}

/// A 2D fbm layer with its noise source and octave offsets baked once.
#[derive(Clone)]
pub struct FbmLayer2d {
    settings: NoiseSettings,
    source: Simplex,
    offsets: Vec<Vec2>,
}

impl FbmLayer2d {
    pub fn new(settings: NoiseSettings, seed: u32) -> Self {
        let offsets = octave_offsets_2d(seed, settings.octaves);
        Self {
            settings,
            source: Simplex::new(seed),
            offsets,
        }
    }

    /// Sample at world (x, z), result in `[0,1]`
    pub fn sample(&self, x: f32, z: f32) -> f32 {
        fbm2d(&self.source, Vec2::new(x, z), &self.settings, &self.offsets)
    }

    pub fn settings(&self) -> &NoiseSettings {
        &self.settings
    }
}

/// A 3D fbm layer with its noise source and octave offsets baked once.
#[derive(Clone)]
pub struct FbmLayer3d {
    settings: NoiseSettings,
    source: Simplex,
    offsets: Vec<Vec3>,
    carve_bias: f32,
}

impl FbmLayer3d {
    pub fn new(settings: NoiseSettings, seed: u32, carve_bias: f32) -> Self {
        let offsets = octave_offsets_3d(seed, settings.octaves);
        Self {
            settings,
            source: Simplex::new(seed),
            offsets,
            carve_bias,
        }
    }

    /// Sample at a world position, result in `[-1,1]`
    pub fn sample(&self, pos: Vec3) -> f32 {
        fbm3d(&self.source, pos, &self.settings, &self.offsets, self.carve_bias)
    }

    /// Sample remapped to `[0,1]`
    pub fn sample_unit(&self, pos: Vec3) -> f32 {
        (self.sample(pos) + 1.0) * 0.5
    }
}
