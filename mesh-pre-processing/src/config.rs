/// Pipeline configuration shared by the command line and JSON config files
use crate::error::{Error, Result};
use crate::heightmap::{BitDepth, validate_split};
use crate::orchestrator::SamplingOptions;
use crate::resolution::UpAxis;
use crate::sampling::SamplingMode;
use constants::heightmap::{
    DEFAULT_BIT_DEPTH, DEFAULT_MAX_RESOLUTION, DEFAULT_OUTPUT_PATH, DEFAULT_SPLIT,
    SUPPORTED_BIT_DEPTHS,
};
use constants::sampling::{DEFAULT_CHUNK_SIZE, DEFAULT_NUM_SAMPLES, DEFAULT_NUM_THREADS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Every option of one mesh to height map conversion. Missing JSON fields
/// take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_path: PathBuf,
    /// Pixels along the longest horizontal edge.
    pub max_resolution: u32,
    pub use_gpu: bool,
    pub num_samples: usize,
    pub num_threads: usize,
    pub bit_depth: u8,
    /// Stream bounds and sampling in chunks of `chunk_size`.
    pub large_model: bool,
    pub chunk_size: usize,
    /// Number of output tiles.
    pub split: u32,
    pub seed: Option<u64>,
    pub up_axis: UpAxis,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            max_resolution: DEFAULT_MAX_RESOLUTION,
            use_gpu: false,
            num_samples: DEFAULT_NUM_SAMPLES,
            num_threads: DEFAULT_NUM_THREADS,
            bit_depth: DEFAULT_BIT_DEPTH,
            large_model: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            split: DEFAULT_SPLIT,
            seed: None,
            up_axis: UpAxis::default(),
            show_progress: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_resolution == 0 {
            return Err(Error::invalid_configuration(
                "maximum resolution must be a positive integer",
            ));
        }
        if self.num_samples == 0 {
            return Err(Error::invalid_configuration(
                "number of samples must be a positive integer",
            ));
        }
        if self.num_threads == 0 {
            return Err(Error::invalid_configuration(
                "number of threads must be at least 1",
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::invalid_configuration(
                "chunk size must be a positive integer",
            ));
        }
        if !SUPPORTED_BIT_DEPTHS.contains(&self.bit_depth) {
            return Err(Error::invalid_configuration(format!(
                "bit depth must be one of {SUPPORTED_BIT_DEPTHS:?}, got {}",
                self.bit_depth
            )));
        }
        validate_split(self.split)
    }

    pub fn bit_depth(&self) -> Result<BitDepth> {
        BitDepth::try_from(self.bit_depth)
    }

    /// Streaming chunks for large models, whole-mesh sampling otherwise.
    pub fn sampling_options(&self) -> SamplingOptions {
        SamplingOptions {
            num_samples: self.num_samples,
            use_gpu: self.use_gpu,
            chunk_size: self.chunk_size,
            worker_count: self.num_threads,
            mode: if self.large_model {
                SamplingMode::Streaming
            } else {
                SamplingMode::InMemory
            },
            seed: self.seed,
            remainder: None,
            show_progress: self.show_progress,
        }
    }
}
