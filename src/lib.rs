//! Strata - chunked procedural terrain streaming

pub mod core;
pub mod math;
pub mod terrain;
pub mod mesh;
pub mod generation;
pub mod clutter;
pub mod streaming;
pub mod navigation;
