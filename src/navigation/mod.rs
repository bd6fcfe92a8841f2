//! Incremental navmesh rebuilding

pub mod backend;
pub use backend::{NavBakeSettings, NavigationBackend, RecordingNavigation};

pub mod baker;
pub use baker::{NavBakeStats, NavBaker};
