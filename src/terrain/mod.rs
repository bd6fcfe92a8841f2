//! Procedural terrain: noise, curves, biomes and the density field

pub mod noise;
pub use noise::{fbm2d, fbm3d, FbmLayer2d, FbmLayer3d, NoiseFunction, NoiseSettings};

pub mod curve;
pub use curve::{sample_curve, BakedCurve, CurveSpec};

pub mod biome;
pub use biome::{BiomeParams, CaveHeightMask, CavernParams, DetailLayer, MacroLayer};

pub mod generator;
pub use generator::TerrainGenerator;
