/// Parallel area-weighted sampling on a fixed-width rayon pool
use super::{
    Backend, RemainderScope, SampleRequest, SampleSet, SamplingMode, SamplingPlan, SurfaceSampler,
    barycentric_point, task_rng,
};
use crate::chunk_stream::Chunk;
use crate::error::{Error, Result};
use crate::mesh::{Face, Mesh};
use crate::progress;
use glam::Vec3;
use rand::Rng;
use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rayon::prelude::*;
use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

/// Faces of one buffer range weighted by their area.
pub(crate) struct FaceDistribution<'a> {
    mesh: &'a Mesh,
    faces: &'a [Face],
    index: WeightedIndex<f64>,
}

impl<'a> FaceDistribution<'a> {
    pub(crate) fn new(mesh: &'a Mesh, faces: &'a [Face]) -> std::result::Result<Self, WeightedError> {
        let index = WeightedIndex::new(faces.iter().map(|face| mesh.face_area(face)))?;
        Ok(Self { mesh, faces, index })
    }

    /// Draw faces with replacement, then a uniform point on each.
    pub(crate) fn sample_points<R: Rng>(&self, count: usize, rng: &mut R) -> Vec<Vec3> {
        (0..count)
            .map(|_| {
                let face = &self.faces[self.index.sample(rng)];
                let r1: f32 = rng.r#gen();
                let r2: f32 = rng.r#gen();
                barycentric_point(self.mesh.triangle(face), r1, r2)
            })
            .collect()
    }
}

/// CPU sampler. Each face chunk is one task on a pool of `worker_count` threads.
#[derive(Debug, Clone)]
pub struct CpuSampler {
    worker_count: usize,
}

impl CpuSampler {
    pub fn new(worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(Error::invalid_configuration(
                "worker count must be a positive integer",
            ));
        }
        Ok(Self { worker_count })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn build_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count)
            .thread_name(|index| format!("surface-sampler-{index}"))
            .build()
            .map_err(|err| Error::worker_failure(0, format!("could not start worker pool: {err}")))
    }

    fn sample_streaming(&self, mesh: &Mesh, request: &SampleRequest) -> Result<SampleSet> {
        let plan = SamplingPlan::new(mesh, request.num_samples, request.chunk_size)?;
        if plan.num_samples == 0 {
            return Ok(SampleSet::empty(Backend::Cpu));
        }

        let stream = mesh.face_chunks(plan.chunk_size)?;
        let chunks: Vec<Chunk<'_, Face>> = stream.iter().collect();
        let counts = plan.chunk_sample_counts();
        let remainder_faces = match self.remainder_scope(request) {
            RemainderScope::WholeMesh => mesh.faces.as_slice(),
            RemainderScope::LastChunk => stream.last().map_or(mesh.faces.as_slice(), |c| c.items),
        };
        // The remainder task takes the stream id after the last chunk.
        let remainder_task = chunks.len();

        log::debug!(
            "CPU plan: {} chunks of up to {} faces, {} per face, remainder {}",
            chunks.len(),
            plan.chunk_size,
            plan.per_face,
            plan.remainder
        );

        let pool = self.build_pool()?;
        let pb = progress::chunk_bar(chunks.len() as u64, "Sampling face chunks", request.show_progress);

        let (chunk_results, remainder_result) = pool.install(|| {
            rayon::join(
                || {
                    chunks
                        .par_iter()
                        .zip(counts.par_iter())
                        .map(|(chunk, &count)| {
                            let points = run_task(chunk.index, || {
                                sample_faces(mesh, chunk.items, count, request.seed, chunk.index)
                            });
                            pb.inc(1);
                            points
                        })
                        .collect::<Result<Vec<_>>>()
                },
                || {
                    run_task(remainder_task, || {
                        sample_faces(
                            mesh,
                            remainder_faces,
                            plan.remainder,
                            request.seed,
                            remainder_task,
                        )
                    })
                },
            )
        });

        pb.finish_with_message("Chunks sampled");
        let chunk_points = chunk_results?;
        let remainder_points = remainder_result?;

        let mut points = Vec::with_capacity(plan.num_samples);
        let mut batch_counts = Vec::with_capacity(chunk_points.len());
        for batch in chunk_points {
            batch_counts.push(batch.len());
            points.extend(batch);
        }
        points.extend(remainder_points);

        Ok(SampleSet {
            points,
            batch_counts,
            remainder: plan.remainder,
            backend: Backend::Cpu,
        })
    }

    /// Split the request evenly across workers, every task drawing from the
    /// whole-mesh distribution, plus one task for `num_samples % worker_count`.
    fn sample_in_memory(&self, mesh: &Mesh, request: &SampleRequest) -> Result<SampleSet> {
        mesh.ensure_sampleable()?;
        if request.num_samples == 0 {
            return Ok(SampleSet::empty(Backend::Cpu));
        }

        let distribution = FaceDistribution::new(mesh, &mesh.faces)
            .map_err(|err| Error::invalid_mesh(format!("no usable surface area: {err}")))?;

        let per_worker = request.num_samples / self.worker_count;
        let remaining = request.num_samples % self.worker_count;
        let mut task_counts = vec![per_worker; self.worker_count];
        if remaining > 0 {
            task_counts.push(remaining);
        }

        let pool = self.build_pool()?;
        let batches = pool.install(|| {
            task_counts
                .par_iter()
                .enumerate()
                .map(|(task, &count)| {
                    run_task(task, || {
                        let mut rng = task_rng(request.seed, task);
                        Ok::<_, WeightedError>(distribution.sample_points(count, &mut rng))
                    })
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let points = batches.into_iter().flatten().collect();
        Ok(SampleSet {
            points,
            batch_counts: vec![per_worker; self.worker_count],
            remainder: remaining,
            backend: Backend::Cpu,
        })
    }
}

impl SurfaceSampler for CpuSampler {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }

    fn default_remainder_scope(&self) -> RemainderScope {
        RemainderScope::WholeMesh
    }

    fn sample(&self, mesh: &Mesh, request: &SampleRequest) -> Result<SampleSet> {
        match request.mode {
            SamplingMode::Streaming => self.sample_streaming(mesh, request),
            SamplingMode::InMemory => self.sample_in_memory(mesh, request),
        }
    }
}

fn sample_faces(
    mesh: &Mesh,
    faces: &[Face],
    count: usize,
    seed: u64,
    task: usize,
) -> std::result::Result<Vec<Vec3>, WeightedError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let distribution = FaceDistribution::new(mesh, faces)?;
    Ok(distribution.sample_points(count, &mut task_rng(seed, task)))
}

/// Runs one unit of work, turning its error or panic into `WorkerFailure`.
fn run_task<E, F>(task: usize, work: F) -> Result<Vec<Vec3>>
where
    E: Display,
    F: FnOnce() -> std::result::Result<Vec<Vec3>, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(result) => result.map_err(|err| Error::worker_failure(task, err.to_string())),
        Err(payload) => Err(Error::worker_failure(task, panic_reason(payload.as_ref()))),
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::compute_bounds;
    use crate::mesh::test_meshes::{one_to_three, unit_cube};

    fn request(num_samples: usize, chunk_size: usize) -> SampleRequest {
        SampleRequest::new(num_samples, chunk_size, 0x5eed)
    }

    #[test]
    fn exact_counts_for_all_chunk_sizes() {
        let cube = unit_cube();
        let faces = cube.face_count();
        let sampler = CpuSampler::new(3).unwrap();

        for num_samples in [1, 7, 12, 1200, 1201] {
            for chunk_size in [1, faces, faces + 7] {
                let set = sampler.sample(&cube, &request(num_samples, chunk_size)).unwrap();
                assert_eq!(set.len(), num_samples);
                assert_eq!(set.batch_counts.iter().sum::<usize>() + set.remainder, num_samples);
            }
        }
    }

    #[test]
    fn points_stay_inside_bounds() {
        let cube = unit_cube();
        let bounds = compute_bounds(&cube, 8).unwrap();
        let set = CpuSampler::new(2).unwrap().sample(&cube, &request(5000, 5)).unwrap();
        assert!(set.points.iter().all(|&p| bounds.contains(p, 1e-5)));
    }

    #[test]
    fn zero_samples_returns_empty_set_without_work() {
        let set = CpuSampler::new(2).unwrap().sample(&unit_cube(), &request(0, 4)).unwrap();
        assert!(set.is_empty());
        assert!(set.batch_counts.is_empty());
        assert_eq!(set.remainder, 0);
    }

    #[test]
    fn mesh_without_faces_is_rejected() {
        let mut mesh = unit_cube();
        mesh.faces.clear();
        let sampler = CpuSampler::new(2).unwrap();
        for mode in [SamplingMode::Streaming, SamplingMode::InMemory] {
            let result = sampler.sample(&mesh, &request(10, 4).with_mode(mode));
            assert!(matches!(result, Err(Error::InvalidMesh(_))));
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(matches!(CpuSampler::new(0), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn same_seed_reproduces_points_for_any_pool_width() {
        let cube = unit_cube();
        let narrow = CpuSampler::new(1).unwrap().sample(&cube, &request(997, 5)).unwrap();
        let wide = CpuSampler::new(6).unwrap().sample(&cube, &request(997, 5)).unwrap();
        assert_eq!(narrow.points, wide.points);

        let reseeded = SampleRequest::new(997, 5, 1);
        let other = CpuSampler::new(6).unwrap().sample(&cube, &reseeded).unwrap();
        assert_ne!(narrow.points, other.points);
    }

    #[test]
    fn zero_area_chunk_fails_as_worker_failure() {
        let mut mesh = one_to_three();
        // Collapsed triangle in a chunk of its own.
        mesh.faces.push([0, 0, 0]);
        let result = CpuSampler::new(2).unwrap().sample(&mesh, &request(30, 1));
        assert!(matches!(result, Err(Error::WorkerFailure { task: 2, .. })));
    }

    #[test]
    fn zero_area_chunk_is_skipped_when_it_gets_no_points() {
        let mut mesh = one_to_three();
        mesh.faces.push([0, 0, 0]);
        // One point per mesh is below one per face: everything is remainder.
        let set = CpuSampler::new(2).unwrap().sample(&mesh, &request(2, 1)).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.remainder, 2);
    }

    #[test]
    fn last_chunk_remainder_stays_on_last_chunk() {
        let mesh = one_to_three();
        let sampler = CpuSampler::new(2).unwrap();
        for seed in 0..20 {
            let request = SampleRequest::new(1, 1, seed).with_remainder(RemainderScope::LastChunk);
            let set = sampler.sample(&mesh, &request).unwrap();
            assert_eq!(set.remainder, 1);
            assert!(set.points[0].x >= 10.0 - 1e-5);
        }
    }

    #[test]
    fn in_memory_mode_splits_across_workers() {
        let cube = unit_cube();
        let set = CpuSampler::new(4)
            .unwrap()
            .sample(&cube, &request(1003, 4).with_mode(SamplingMode::InMemory))
            .unwrap();
        assert_eq!(set.len(), 1003);
        assert_eq!(set.batch_counts, vec![250; 4]);
        assert_eq!(set.remainder, 3);
    }

    #[test]
    fn small_faces_keep_their_weight_beside_a_huge_one() {
        // One face of area 2^27 at z = 0, then 10 000 unit faces at z = 1.
        let side = (1u32 << 14) as f32;
        let vertices = vec![
            Vec3::ZERO,
            Vec3::new(side, 0.0, 0.0),
            Vec3::new(0.0, side, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(2.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        let mut faces = vec![[0, 1, 2]];
        faces.extend(std::iter::repeat_n([3, 4, 5], 10_000));
        let mesh = Mesh::new(vertices, faces);

        // Expected share of the unit faces is 10 000 / (2^27 + 10 000), about 75 points.
        let sampler = CpuSampler::new(4).unwrap();
        for request in [
            SampleRequest::new(1_000_000, mesh.face_count(), 7).with_mode(SamplingMode::InMemory),
            SampleRequest::new(1_000_000, mesh.face_count(), 7),
        ] {
            let set = sampler.sample(&mesh, &request).unwrap();
            let small = set.points.iter().filter(|p| p.z > 0.5).count();
            assert!((40..=115).contains(&small), "{small} points on the small faces");
        }
    }

    #[test]
    fn panicking_task_becomes_worker_failure() {
        let result = run_task(5, || -> std::result::Result<Vec<Vec3>, WeightedError> {
            panic!("boom")
        });
        match result {
            Err(Error::WorkerFailure { task, reason }) => {
                assert_eq!(task, 5);
                assert_eq!(reason, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
