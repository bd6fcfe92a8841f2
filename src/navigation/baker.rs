//! Rate-limited incremental navmesh baking
//!
//! Dirty world bounds are queued FIFO and drained one per dispatch. A
//! dispatch only happens when the minimum interval has elapsed since the
//! previous one and fewer than `max_concurrent` bakes are in flight.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::backend::{NavBakeSettings, NavigationBackend};
use crate::math::Aabb;

/// Counters for bake activity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NavBakeStats {
    pub enqueued: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
}

pub struct NavBaker<N: NavigationBackend> {
    backend: N,
    settings: NavBakeSettings,
    layer_mask: u32,
    min_interval: Duration,
    max_concurrent: usize,
    queue: VecDeque<Aabb>,
    in_flight: Vec<N::Operation>,
    last_dispatch: Option<Instant>,
    stats: NavBakeStats,
}

impl<N: NavigationBackend> NavBaker<N> {
    pub fn new(
        backend: N,
        settings: NavBakeSettings,
        layer_mask: u32,
        min_interval: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            backend,
            settings,
            layer_mask,
            min_interval,
            max_concurrent: max_concurrent.max(1),
            queue: VecDeque::new(),
            in_flight: Vec::new(),
            last_dispatch: None,
            stats: NavBakeStats::default(),
        }
    }

    /// Queue `bounds` for incorporation. Returns false if it is already queued.
    pub fn enqueue(&mut self, bounds: Aabb) -> bool {
        if self.queue.contains(&bounds) {
            return false;
        }
        self.queue.push_back(bounds);
        self.stats.enqueued += 1;
        true
    }

    /// Prune finished bakes and dispatch the next queued bounds if allowed.
    pub fn update(&mut self, now: Instant) {
        let before = self.in_flight.len();
        let backend = &mut self.backend;
        self.in_flight.retain(|op| !backend.is_complete(op));
        self.stats.completed += (before - self.in_flight.len()) as u64;

        if self.in_flight.len() >= self.max_concurrent {
            return;
        }
        if let Some(last) = self.last_dispatch {
            if now.saturating_duration_since(last) < self.min_interval {
                return;
            }
        }
        let Some(bounds) = self.queue.pop_front() else {
            return;
        };

        self.last_dispatch = Some(now);
        let sources = self.backend.collect_build_sources(&bounds, self.layer_mask);
        match self.backend.begin_async_bake(&self.settings, sources, &bounds) {
            Ok(operation) => {
                log::debug!("Navmesh bake dispatched for {:?} ({} queued)", bounds, self.queue.len());
                self.in_flight.push(operation);
                self.stats.dispatched += 1;
            }
            Err(e) => {
                // Not retried; overlapping terrain marks the region dirty again
                log::warn!("Navmesh bake for {:?} failed: {}", bounds, e);
                self.stats.failed += 1;
            }
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    pub fn stats(&self) -> NavBakeStats {
        self.stats
    }

    pub fn backend(&self) -> &N {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut N {
        &mut self.backend
    }

    /// Drop queued work and return the backend.
    pub fn into_backend(self) -> N {
        if !self.queue.is_empty() || !self.in_flight.is_empty() {
            log::debug!(
                "Dropping {} queued and {} in-flight navmesh bakes",
                self.queue.len(),
                self.in_flight.len()
            );
        }
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::backend::RecordingNavigation;
    use glam::Vec3;

    fn bounds(i: f32) -> Aabb {
        Aabb::from_min_size(Vec3::new(i * 32.0, 0.0, 0.0), Vec3::new(32.0, 64.0, 32.0))
    }

    fn baker(polls: u32, interval_ms: u64, max_concurrent: usize) -> NavBaker<RecordingNavigation> {
        NavBaker::new(
            RecordingNavigation::new(polls),
            NavBakeSettings::default(),
            0b101,
            Duration::from_millis(interval_ms),
            max_concurrent,
        )
    }

    #[test]
    fn test_fifo_order() {
        let mut baker = baker(0, 0, 1);
        let t0 = Instant::now();
        for i in 0..3 {
            baker.enqueue(bounds(i as f32));
        }
        for i in 0..6 {
            baker.update(t0 + Duration::from_millis(i));
        }
        assert_eq!(baker.backend().baked, vec![bounds(0.0), bounds(1.0), bounds(2.0)]);
        assert_eq!(baker.backend().collected[0].1, 0b101);
        assert!(baker.is_idle());
    }

    #[test]
    fn test_duplicate_bounds_not_requeued() {
        let mut baker = baker(0, 0, 1);
        assert!(baker.enqueue(bounds(0.0)));
        assert!(!baker.enqueue(bounds(0.0)));
        assert_eq!(baker.queued(), 1);
    }

    #[test]
    fn test_min_interval() {
        let mut baker = baker(0, 1000, 4);
        baker.enqueue(bounds(0.0));
        baker.enqueue(bounds(1.0));
        let t0 = Instant::now();

        baker.update(t0);
        assert_eq!(baker.stats().dispatched, 1);
        baker.update(t0 + Duration::from_millis(500));
        assert_eq!(baker.stats().dispatched, 1);
        baker.update(t0 + Duration::from_millis(1000));
        assert_eq!(baker.stats().dispatched, 2);
    }

    #[test]
    fn test_single_bake_in_flight() {
        let mut baker = baker(3, 0, 1);
        baker.enqueue(bounds(0.0));
        baker.enqueue(bounds(1.0));
        let t0 = Instant::now();

        baker.update(t0);
        assert_eq!(baker.in_flight(), 1);
        baker.update(t0);
        baker.update(t0);
        assert_eq!(baker.stats().dispatched, 1);
        assert_eq!(baker.queued(), 1);

        // Completes on the fourth poll after dispatch
        baker.update(t0);
        baker.update(t0);
        assert_eq!(baker.stats().completed, 1);
        assert_eq!(baker.stats().dispatched, 2);
    }

    #[test]
    fn test_concurrency_limit() {
        let mut baker = baker(100, 0, 2);
        for i in 0..4 {
            baker.enqueue(bounds(i as f32));
        }
        let t0 = Instant::now();
        for _ in 0..10 {
            baker.update(t0);
        }
        assert_eq!(baker.in_flight(), 2);
        assert_eq!(baker.queued(), 2);
    }

    #[test]
    fn test_failure_not_retried() {
        let mut baker = baker(0, 0, 1);
        baker.backend_mut().refuse = true;
        baker.enqueue(bounds(0.0));
        baker.update(Instant::now());
        assert_eq!(baker.stats().failed, 1);
        assert!(baker.is_idle());
        assert!(baker.backend().baked.is_empty());
    }
}
