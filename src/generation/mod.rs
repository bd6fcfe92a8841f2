//! Background chunk generation: configuration, worker threads, scratch
//! memory, density sampling and the mesh job.

pub mod config;
pub mod worker;
pub mod scratch;
pub mod density_grid;
pub mod mesh_job;

pub use config::GenerationConfig;
pub use worker::{TaskHandle, WorkerPool};
pub use scratch::{ScratchBuffer, ScratchRegistry};
pub use density_grid::{DensityGrid, GridShape};
pub use mesh_job::{MeshJob, MeshJobContext, MeshJobOutput};
