//! Level of Detail (LOD) selection by viewer distance
//!
//! Each LOD entry pairs a detail level with the furthest distance at which it
//! is shown. Detail level `n` samples the density grid every `2^n` units, so
//! each step up halves the resolution along every axis.

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Highest detail level accepted (stride 2^MAX_DETAIL_LEVEL)
pub const MAX_DETAIL_LEVEL: u32 = 8;

/// One entry of the LOD table
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LodInfo {
    /// Detail level; the grid stride is `2^level`
    pub level: u32,
    /// Furthest chunk distance at which this entry is selected
    pub visible_distance: f32,
}

impl LodInfo {
    pub fn new(level: u32, visible_distance: f32) -> Self {
        Self { level, visible_distance }
    }

    /// Grid stride for this level
    pub fn step(&self) -> u32 {
        1 << self.level
    }
}

/// Ordered LOD table, ascending by visible distance.
///
/// Entry 0 is the highest-detail level.
#[derive(Clone, Debug, PartialEq)]
pub struct LodDescriptor {
    levels: Vec<LodInfo>,
}

impl LodDescriptor {
    pub fn new(levels: Vec<LodInfo>) -> Result<Self> {
        if levels.is_empty() {
            return Err(Error::config("at least one LOD level is required"));
        }
        for lod in &levels {
            if lod.level > MAX_DETAIL_LEVEL {
                return Err(Error::config(format!(
                    "LOD level {} exceeds the maximum of {MAX_DETAIL_LEVEL}",
                    lod.level
                )));
            }
            if !lod.visible_distance.is_finite() || lod.visible_distance < 0.0 {
                return Err(Error::config(format!(
                    "LOD visible distance must be a non-negative number, got {}",
                    lod.visible_distance
                )));
            }
        }
        if levels.windows(2).any(|w| w[1].visible_distance <= w[0].visible_distance) {
            return Err(Error::config("LOD visible distances must be strictly ascending"));
        }
        Ok(Self { levels })
    }

    /// Index of the first entry whose threshold is at least `distance`.
    ///
    /// Returns `None` past the last threshold, where the chunk is not visible.
    /// Non-decreasing in `distance`.
    pub fn select(&self, distance: f32) -> Option<usize> {
        self.levels.iter().position(|lod| distance <= lod.visible_distance)
    }

    pub fn get(&self, index: usize) -> Option<&LodInfo> {
        self.levels.get(index)
    }

    pub fn levels(&self) -> &[LodInfo] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Largest distance at which any chunk is visible
    pub fn max_distance(&self) -> f32 {
        self.levels.last().map_or(0.0, |lod| lod.visible_distance)
    }
}
