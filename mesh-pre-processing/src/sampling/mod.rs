//! Area-weighted surface sampling on the CPU worker pool or a GPU device.
//!
//! Both samplers share one policy. With `total_faces` faces and `n` requested
//! points, every face chunk of length `c` receives `(n / total_faces) * c`
//! points drawn from the area distribution of that chunk alone. The
//! `n % total_faces` leftover points are drawn from the distribution named by
//! [`RemainderScope`]. The two samplers default to different scopes:
//!
//! * [`CpuSampler`] draws the remainder from the whole mesh,
//! * [`GpuSampler`] reuses the distribution of the last processed chunk.
//!
//! The GPU default is an approximation: for meshes whose last chunk is not
//! representative, leftover points cluster on that chunk. Callers wanting the
//! same output distribution on both paths pass an explicit scope.

pub mod cpu;
pub mod gpu;

pub use cpu::CpuSampler;
pub use gpu::GpuSampler;

use crate::error::{Error, Result};
use crate::mesh::Mesh;
use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Which execution path produced a sample set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Cpu,
    Gpu,
}

/// How the face buffer is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Face chunks of `chunk_size`, each weighted on its own.
    #[default]
    Streaming,
    /// Whole mesh at once. On the CPU the points are split evenly across
    /// workers, each drawing from the whole-mesh distribution.
    InMemory,
}

/// Distribution used for the `num_samples % total_faces` leftover points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderScope {
    WholeMesh,
    LastChunk,
}

/// Parameters of one sampling call, already validated by the orchestrator.
#[derive(Debug, Clone)]
pub struct SampleRequest {
    pub num_samples: usize,
    pub chunk_size: usize,
    pub mode: SamplingMode,
    /// `None` keeps the sampler's own default scope.
    pub remainder: Option<RemainderScope>,
    pub seed: u64,
    pub show_progress: bool,
}

impl SampleRequest {
    pub fn new(num_samples: usize, chunk_size: usize, seed: u64) -> Self {
        Self {
            num_samples,
            chunk_size,
            mode: SamplingMode::Streaming,
            remainder: None,
            seed,
            show_progress: false,
        }
    }

    pub fn with_mode(mut self, mode: SamplingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_remainder(mut self, scope: RemainderScope) -> Self {
        self.remainder = Some(scope);
        self
    }
}

/// Points returned by one sampling call.
#[derive(Debug, Clone)]
pub struct SampleSet {
    /// Exactly `num_samples` points in the mesh's own coordinate space.
    pub points: Vec<Vec3>,
    /// Points produced by each chunk (streaming) or each worker (in-memory).
    pub batch_counts: Vec<usize>,
    /// Leftover points drawn after the batches.
    pub remainder: usize,
    pub backend: Backend,
}

impl SampleSet {
    pub fn empty(backend: Backend) -> Self {
        Self {
            points: Vec::new(),
            batch_counts: Vec::new(),
            remainder: 0,
            backend,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> Vec<Vec3> {
        self.points
    }
}

/// Exact-count split of `num_samples` over a mesh's face chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    pub total_faces: usize,
    pub num_samples: usize,
    pub chunk_size: usize,
    pub per_face: usize,
    pub remainder: usize,
}

impl SamplingPlan {
    pub fn new(mesh: &Mesh, num_samples: usize, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::invalid_configuration(
                "chunk size must be a positive integer",
            ));
        }
        mesh.ensure_sampleable()?;

        let total_faces = mesh.face_count();
        Ok(Self {
            total_faces,
            num_samples,
            chunk_size,
            per_face: num_samples / total_faces,
            remainder: num_samples % total_faces,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.total_faces.div_ceil(self.chunk_size)
    }

    pub fn samples_for_chunk(&self, chunk_len: usize) -> usize {
        self.per_face * chunk_len
    }

    /// Points assigned to each chunk, in stream order.
    pub fn chunk_sample_counts(&self) -> Vec<usize> {
        (0..self.chunk_count())
            .map(|index| {
                let start = index * self.chunk_size;
                let len = self.chunk_size.min(self.total_faces - start);
                self.samples_for_chunk(len)
            })
            .collect()
    }
}

/// A sampling backend. Implementations are unaware of each other; path
/// selection lives in [`crate::orchestrator::SamplingOrchestrator`].
pub trait SurfaceSampler {
    fn backend(&self) -> Backend;

    /// Remainder scope used when the request does not name one.
    fn default_remainder_scope(&self) -> RemainderScope;

    /// Returns exactly `request.num_samples` points or an error, never a partial set.
    fn sample(&self, mesh: &Mesh, request: &SampleRequest) -> Result<SampleSet>;

    fn remainder_scope(&self, request: &SampleRequest) -> RemainderScope {
        request
            .remainder
            .unwrap_or_else(|| self.default_remainder_scope())
    }
}

/// Uniform point inside a triangle from two uniform variates.
///
/// `u = 1 - sqrt(r1)`, `v = sqrt(r1) * (1 - r2)`, `w = sqrt(r1) * r2`.
/// The square root makes the result uniform over the triangle's area rather
/// than over barycentric space.
pub fn barycentric_point(triangle: [Vec3; 3], r1: f32, r2: f32) -> Vec3 {
    let s = r1.sqrt();
    let u = 1.0 - s;
    let v = s * (1.0 - r2);
    let w = s * r2;
    u * triangle[0] + v * triangle[1] + w * triangle[2]
}

/// Independent random stream for one unit of work. Results depend only on
/// the seed and the task ordinal, never on thread scheduling.
pub(crate) fn task_rng(seed: u64, task: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(task as u64);
    rng
}
