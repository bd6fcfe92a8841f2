//! Surface object placement.
//!
//! Rules describe which prefab goes where; the scatter engine scans a
//! chunk's density grid for floors that pass every rule gate, and placed
//! objects are drawn from a pooled set of instances per prefab kind.

pub mod rules;
pub mod pool;
pub mod scatter;

pub use rules::{Orientation, PlacementRule, PrefabKind, PrefabSpec};
pub use pool::{InstanceHandle, InstancePool, InstanceSlot, ObjectPool};
pub use scatter::{PlacementRecord, ScatterEngine, GUARD_DEPTH};
