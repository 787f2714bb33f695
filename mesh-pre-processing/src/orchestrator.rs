/// Sampling entry point: picks the GPU or CPU path for each call
use crate::device::GpuContext;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::sampling::{
    CpuSampler, GpuSampler, RemainderScope, SampleRequest, SampleSet, SamplingMode,
    SurfaceSampler,
};
use constants::sampling::{DEFAULT_CHUNK_SIZE, DEFAULT_NUM_SAMPLES, DEFAULT_NUM_THREADS};
use std::sync::Arc;

/// Parameters of one orchestrated sampling call.
#[derive(Debug, Clone)]
pub struct SamplingOptions {
    pub num_samples: usize,
    pub use_gpu: bool,
    pub chunk_size: usize,
    pub worker_count: usize,
    pub mode: SamplingMode,
    /// `None` draws a fresh seed, logged at debug level for replay.
    pub seed: Option<u64>,
    /// `None` keeps the chosen sampler's default.
    pub remainder: Option<RemainderScope>,
    pub show_progress: bool,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            num_samples: DEFAULT_NUM_SAMPLES,
            use_gpu: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            worker_count: DEFAULT_NUM_THREADS,
            mode: SamplingMode::Streaming,
            seed: None,
            remainder: None,
            show_progress: false,
        }
    }
}

impl SamplingOptions {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::invalid_configuration(
                "chunk size must be a positive integer",
            ));
        }
        if self.worker_count == 0 {
            return Err(Error::invalid_configuration(
                "worker count must be a positive integer",
            ));
        }
        Ok(())
    }
}

/// Routes sampling calls to the GPU when asked for and available, otherwise
/// to the CPU worker pool.
#[derive(Debug)]
pub struct SamplingOrchestrator {
    gpu: Option<GpuSampler>,
}

impl SamplingOrchestrator {
    pub fn new(context: Option<Arc<GpuContext>>) -> Self {
        let gpu = context.and_then(|context| match GpuSampler::new(context) {
            Ok(sampler) => Some(sampler),
            Err(err) => {
                log::warn!("GPU sampling disabled: {err}");
                None
            }
        });
        Self { gpu }
    }

    /// Probe for a compatible device. Each call still checks that the device
    /// has not been lost since.
    pub fn detect() -> Self {
        Self::new(GpuContext::probe())
    }

    pub fn cpu_only() -> Self {
        Self { gpu: None }
    }

    /// Whether a compatible device is usable right now.
    pub fn device_available(&self) -> bool {
        self.usable_gpu().is_some()
    }

    fn usable_gpu(&self) -> Option<&GpuSampler> {
        self.gpu.as_ref().filter(|gpu| gpu.context().is_available())
    }

    /// Always returns exactly `options.num_samples` points, or an error.
    pub fn sample(&self, mesh: &Mesh, options: &SamplingOptions) -> Result<SampleSet> {
        options.validate()?;

        let seed = options.seed.unwrap_or_else(|| {
            let seed = rand::random();
            log::debug!("Drew sampling seed {seed}");
            seed
        });
        let mut request = SampleRequest::new(options.num_samples, options.chunk_size, seed)
            .with_mode(options.mode);
        request.remainder = options.remainder;
        request.show_progress = options.show_progress;

        let cpu;
        let sampler: &dyn SurfaceSampler = match self.usable_gpu() {
            Some(gpu) if options.use_gpu => gpu,
            _ => {
                if options.use_gpu {
                    log::warn!(
                        "GPU requested but no compatible device is available, falling back to CPU"
                    );
                }
                cpu = CpuSampler::new(options.worker_count)?;
                &cpu
            }
        };

        log::info!(
            "Sampling {} points on the {:?} path ({:?} mode)...",
            options.num_samples,
            sampler.backend(),
            options.mode
        );
        let set = sampler.sample(mesh, &request)?;
        log::info!("Sampling complete: {} points generated.", set.len());
        Ok(set)
    }
}
