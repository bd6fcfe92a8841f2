//! Navigation collaborator interface

use serde::{Deserialize, Serialize};

use crate::core::Result;
use crate::math::Aabb;

/// Agent parameters passed to every navmesh bake
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavBakeSettings {
    pub agent_radius: f32,
    pub agent_height: f32,
    /// Steepest walkable slope in degrees
    pub max_slope: f32,
    pub step_height: f32,
}

impl Default for NavBakeSettings {
    fn default() -> Self {
        Self {
            agent_radius: 0.5,
            agent_height: 2.0,
            max_slope: 45.0,
            step_height: 0.4,
        }
    }
}

/// Navmesh baking service.
///
/// The backend owns its navmesh data; the baker only tells it which region
/// to rebuild and polls the returned operation.
pub trait NavigationBackend {
    /// Geometry gathered for one bake
    type Sources;
    /// Handle to an in-flight bake
    type Operation;

    fn collect_build_sources(&mut self, bounds: &Aabb, layer_mask: u32) -> Self::Sources;

    fn begin_async_bake(
        &mut self,
        settings: &NavBakeSettings,
        sources: Self::Sources,
        bounds: &Aabb,
    ) -> Result<Self::Operation>;

    fn is_complete(&mut self, operation: &Self::Operation) -> bool;
}

/// In-process backend that records bake requests.
///
/// Each bake completes after a fixed number of polls. Used by the headless
/// driver and tests.
#[derive(Debug, Default)]
pub struct RecordingNavigation {
    /// Polls an operation needs before it reports completion
    pub polls_to_complete: u32,
    /// Bounds of every accepted bake, in dispatch order
    pub baked: Vec<Aabb>,
    /// Source collections requested, with their layer mask
    pub collected: Vec<(Aabb, u32)>,
    /// Refuse every bake (for failure handling)
    pub refuse: bool,
}

/// A recorded bake operation
#[derive(Debug)]
pub struct RecordedBake {
    pub bounds: Aabb,
    polls_left: std::cell::Cell<u32>,
}

impl RecordingNavigation {
    pub fn new(polls_to_complete: u32) -> Self {
        Self {
            polls_to_complete,
            ..Default::default()
        }
    }
}

impl NavigationBackend for RecordingNavigation {
    type Sources = Aabb;
    type Operation = RecordedBake;

    fn collect_build_sources(&mut self, bounds: &Aabb, layer_mask: u32) -> Aabb {
        self.collected.push((*bounds, layer_mask));
        *bounds
    }

    fn begin_async_bake(&mut self, _settings: &NavBakeSettings, sources: Aabb, bounds: &Aabb) -> Result<RecordedBake> {
        if self.refuse {
            return Err(crate::core::Error::Navigation(format!("bake of {:?} refused", bounds)));
        }
        self.baked.push(sources);
        Ok(RecordedBake {
            bounds: *bounds,
            polls_left: std::cell::Cell::new(self.polls_to_complete),
        })
    }

    fn is_complete(&mut self, operation: &RecordedBake) -> bool {
        let left = operation.polls_left.get();
        if left == 0 {
            return true;
        }
        operation.polls_left.set(left - 1);
        false
    }
}
