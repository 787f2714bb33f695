//! Mesh surface sampling and height map generation.
//!
//! The core is [`orchestrator::SamplingOrchestrator`], which draws an exact
//! number of area-weighted surface points on the CPU worker pool or a GPU
//! device. [`converter::MeshConverter`] wraps it into the OBJ to height map
//! pipeline used by the binary.

pub mod bounds;
pub mod chunk_stream;
pub mod cli;
pub mod config;
pub mod converter;
pub mod dds_writer;
pub mod device;
pub mod error;
pub mod heightmap;
pub mod loader;
pub mod logging;
pub mod mesh;
pub mod orchestrator;
pub mod progress;
pub mod resolution;
pub mod sampling;

pub use error::{Error, Result};
