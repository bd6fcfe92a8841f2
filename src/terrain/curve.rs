//! Baked 1D remap curves sampled in `[0,1]`

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Default number of samples when baking a curve from keys
pub const DEFAULT_CURVE_RESOLUTION: usize = 256;

/// Sample a baked curve table at `t`.
///
/// `t` is clamped to `[0,1]` (NaN maps to 0) and the two nearest samples are
/// linearly interpolated. `t = 0` returns the first sample and `t = 1` the last.
/// An empty table returns 0.
pub fn sample_curve(t: f32, samples: &[f32]) -> f32 {
    let Some(last) = samples.len().checked_sub(1) else {
        return 0.0;
    };
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

    let position = t * last as f32;
    let lower = (position.floor() as usize).min(last);
    let upper = (position.ceil() as usize).min(last);
    let frac = position - lower as f32;

    let a = samples[lower];
    let b = samples[upper];
    a + (b - a) * frac
}

/// Serialized form of a curve.
///
/// Either a pre-baked sample table or a list of `[time, value]` keys that is
/// baked piecewise-linearly at load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CurveSpec {
    Samples(Vec<f32>),
    Keys {
        keys: Vec<[f32; 2]>,
        #[serde(default)]
        resolution: Option<usize>,
    },
}

impl CurveSpec {
    pub fn linear(from: f32, to: f32) -> Self {
        CurveSpec::Keys {
            keys: vec![[0.0, from], [1.0, to]],
            resolution: None,
        }
    }

    pub fn keys(keys: &[[f32; 2]]) -> Self {
        CurveSpec::Keys {
            keys: keys.to_vec(),
            resolution: None,
        }
    }

    /// Bake into a sample table
    pub fn bake(&self) -> Result<BakedCurve> {
        match self {
            CurveSpec::Samples(samples) => BakedCurve::from_samples(samples.clone()),
            CurveSpec::Keys { keys, resolution } => {
                BakedCurve::from_keys(keys, resolution.unwrap_or(DEFAULT_CURVE_RESOLUTION))
            }
        }
    }
}

/// Immutable sample table for a remap curve
#[derive(Clone, Debug, PartialEq)]
pub struct BakedCurve {
    samples: Vec<f32>,
}

impl BakedCurve {
    pub fn from_samples(samples: Vec<f32>) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::config("curve has no samples"));
        }
        if let Some(bad) = samples.iter().find(|s| !s.is_finite()) {
            return Err(Error::config(format!("curve sample is not finite: {bad}")));
        }
        Ok(Self { samples })
    }

    /// Bake `[time, value]` keys at a fixed resolution.
    ///
    /// Keys must have ascending times. Values before the first key and after
    /// the last are held constant.
    pub fn from_keys(keys: &[[f32; 2]], resolution: usize) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::config("curve has no keys"));
        }
        if resolution < 2 {
            return Err(Error::config(format!("curve resolution must be at least 2, got {resolution}")));
        }
        if keys.windows(2).any(|w| w[1][0] < w[0][0]) {
            return Err(Error::config("curve keys must be sorted by time"));
        }

        let samples = (0..resolution)
            .map(|i| {
                let t = i as f32 / (resolution - 1) as f32;
                evaluate_keys(keys, t)
            })
            .collect();

        Self::from_samples(samples)
    }

    /// Curve that returns `value` everywhere
    pub fn constant(value: f32) -> Self {
        Self { samples: vec![value] }
    }

    pub fn sample(&self, t: f32) -> f32 {
        sample_curve(t, &self.samples)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

fn evaluate_keys(keys: &[[f32; 2]], t: f32) -> f32 {
    let first = keys[0];
    let last = keys[keys.len() - 1];
    if t <= first[0] {
        return first[1];
    }
    if t >= last[0] {
        return last[1];
    }

    for pair in keys.windows(2) {
        let [t0, v0] = pair[0];
        let [t1, v1] = pair[1];
        if t >= t0 && t <= t1 {
            let span = t1 - t0;
            if span <= f32::EPSILON {
                return v1;
            }
            return v0 + (v1 - v0) * ((t - t0) / span);
        }
    }

    last[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_endpoints() {
        let samples = [2.0, 4.0, 8.0];
        assert_eq!(sample_curve(0.0, &samples), 2.0);
        assert_eq!(sample_curve(1.0, &samples), 8.0);
        assert_eq!(sample_curve(-3.0, &samples), 2.0);
        assert_eq!(sample_curve(7.0, &samples), 8.0);
        assert_eq!(sample_curve(f32::NAN, &samples), 2.0);
    }

    #[test]
    fn test_sample_interpolates() {
        let samples = [0.0, 10.0];
        assert!((sample_curve(0.25, &samples) - 2.5).abs() < 1e-6);
        let samples = [0.0, 1.0, 0.0];
        assert!((sample_curve(0.5, &samples) - 1.0).abs() < 1e-6);
        assert!((sample_curve(0.75, &samples) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_single_and_empty_tables() {
        assert_eq!(sample_curve(0.7, &[3.0]), 3.0);
        assert_eq!(sample_curve(0.7, &[]), 0.0);
        assert_eq!(BakedCurve::constant(5.0).sample(0.2), 5.0);
    }

    #[test]
    fn test_bake_from_keys() {
        let curve = BakedCurve::from_keys(&[[0.0, 0.0], [0.5, 1.0], [1.0, 0.0]], 257).unwrap();
        assert_eq!(curve.samples().len(), 257);
        assert!((curve.sample(0.5) - 1.0).abs() < 1e-4);
        assert!((curve.sample(0.25) - 0.5).abs() < 1e-3);
        assert!(curve.sample(1.0).abs() < 1e-6);
    }

    #[test]
    fn test_keys_hold_outside_range() {
        let curve = BakedCurve::from_keys(&[[0.2, 0.3], [0.8, 0.9]], 64).unwrap();
        assert!((curve.sample(0.0) - 0.3).abs() < 1e-6);
        assert!((curve.sample(1.0) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_curves() {
        assert!(BakedCurve::from_samples(vec![]).is_err());
        assert!(BakedCurve::from_samples(vec![0.0, f32::INFINITY]).is_err());
        assert!(BakedCurve::from_keys(&[], 16).is_err());
        assert!(BakedCurve::from_keys(&[[0.0, 1.0]], 1).is_err());
        assert!(BakedCurve::from_keys(&[[0.6, 1.0], [0.2, 0.0]], 16).is_err());
    }

    #[test]
    fn test_curve_spec_json_forms() {
        let table: CurveSpec = serde_json::from_str("[0.0, 0.5, 1.0]").unwrap();
        assert_eq!(table, CurveSpec::Samples(vec![0.0, 0.5, 1.0]));

        let keyed: CurveSpec = serde_json::from_str(r#"{"keys": [[0.0, 1.0], [1.0, 0.0]]}"#).unwrap();
        let baked = keyed.bake().unwrap();
        assert_eq!(baked.samples().len(), DEFAULT_CURVE_RESOLUTION);
        assert!((baked.sample(0.5) - 0.5).abs() < 1e-2);
    }
}
