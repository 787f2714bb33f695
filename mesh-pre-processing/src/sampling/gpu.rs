/// Area-weighted sampling with compute kernels, one face chunk at a time
use super::{
    Backend, RemainderScope, SampleRequest, SampleSet, SamplingMode, SamplingPlan, SurfaceSampler,
    task_rng,
};
use crate::device::{DeviceBuffer, DeviceSession, GpuContext};
use crate::error::{Error, Result};
use crate::mesh::{Face, Mesh};
use crate::progress;
use bytemuck::{Pod, Zeroable};
use constants::compute_shader::{MAX_WORKGROUPS_PER_DIMENSION, WORKGROUP_SIZE};
use glam::Vec3;
use rand::RngCore;
use std::sync::Arc;

/// Mirrors `Params` in `surface_sampling.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct KernelParams {
    count: u32,
    face_count: u32,
    offset: u32,
    seed: u32,
}

struct SamplingKernels {
    face_areas: wgpu::ComputePipeline,
    scan_step: wgpu::ComputePipeline,
    sample_points: wgpu::ComputePipeline,
}

/// Cumulative area table of one face range, resident on the device.
struct ChunkDistribution<'s> {
    faces: DeviceBuffer<'s>,
    cdf: DeviceBuffer<'s>,
    face_count: u32,
}

/// GPU sampler. Defaults to [`RemainderScope::LastChunk`] so the leftover
/// points reuse the last chunk's distribution already on the device.
pub struct GpuSampler {
    context: Arc<GpuContext>,
    kernels: SamplingKernels,
}

impl std::fmt::Debug for GpuSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuSampler")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl GpuSampler {
    /// Compile the sampling kernels on `context`'s device.
    pub fn new(context: Arc<GpuContext>) -> Result<Self> {
        let device = context.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Surface Sampling Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("surface_sampling.wgsl").into()),
        });
        let pipeline = |entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: None,
                module: &module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        let kernels = SamplingKernels {
            face_areas: pipeline("face_areas"),
            scan_step: pipeline("scan_step"),
            sample_points: pipeline("sample_points"),
        };

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::DeviceError(format!(
                "failed to build sampling kernels: {err}"
            )));
        }

        Ok(Self { context, kernels })
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.context
    }

    /// Face areas and their inclusive prefix sum for `faces`.
    fn prepare_distribution<'s>(
        &self,
        session: &'s DeviceSession<'_>,
        vertices: &DeviceBuffer<'_>,
        faces: &[Face],
    ) -> Result<ChunkDistribution<'s>> {
        let face_count = to_u32(faces.len(), "face chunk")?;
        let face_buffer = session.upload("Chunk Faces", faces, wgpu::BufferUsages::STORAGE)?;
        let scan_usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC;
        let mut front = session.allocate::<f32>("Face Areas", faces.len(), scan_usage)?;
        let mut back = session.allocate::<f32>("Area Scan", faces.len(), scan_usage)?;

        let mut encoder = session.command_encoder("Face Distribution Encoder");
        let area_params = self.params(session, face_count, face_count, 0, 0)?;
        self.dispatch(
            session,
            &mut encoder,
            &self.kernels.face_areas,
            &[
                (0, vertices),
                (1, &face_buffer),
                (2, &area_params),
                (3, &front),
            ],
            face_count,
        );

        // Uniforms must outlive the submission.
        let mut step_params = Vec::new();
        let mut stride = 1u32;
        while stride < face_count {
            let params = self.params(session, face_count, face_count, stride, 0)?;
            self.dispatch(
                session,
                &mut encoder,
                &self.kernels.scan_step,
                &[(2, &params), (4, &front), (5, &back)],
                face_count,
            );
            std::mem::swap(&mut front, &mut back);
            step_params.push(params);
            stride = stride.saturating_mul(2);
        }

        session.submit(encoder)?;
        Ok(ChunkDistribution {
            faces: face_buffer,
            cdf: front,
            face_count,
        })
    }

    /// Draw `count` points from `distribution`, split into dispatches whose
    /// output fits one storage binding.
    fn sample_distribution(
        &self,
        session: &DeviceSession<'_>,
        vertices: &DeviceBuffer<'_>,
        distribution: &ChunkDistribution<'_>,
        count: usize,
        seed: u32,
    ) -> Result<Vec<Vec3>> {
        to_u32(count, "sample batch")?;
        let max_batch = points_per_binding(self.context.max_storage_binding_bytes());
        let batches = sample_batches(count, max_batch);
        if batches.len() > 1 {
            log::debug!(
                "Splitting {count} points into {} dispatches of up to {max_batch}",
                batches.len()
            );
        }

        let mut points = Vec::with_capacity(count);
        for (offset, len) in batches {
            let batch = self.sample_batch(session, vertices, distribution, offset, len, seed)?;
            points.extend(batch);
        }
        Ok(points)
    }

    /// One dispatch writing samples `offset..offset + len` of the chunk.
    fn sample_batch(
        &self,
        session: &DeviceSession<'_>,
        vertices: &DeviceBuffer<'_>,
        distribution: &ChunkDistribution<'_>,
        offset: usize,
        len: usize,
        seed: u32,
    ) -> Result<Vec<Vec3>> {
        let invocations = to_u32(len, "sample batch")?;
        let floats = len * 3;
        let points = session.allocate::<f32>(
            "Sampled Points",
            floats,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        )?;
        let params = self.params(
            session,
            invocations,
            distribution.face_count,
            to_u32(offset, "sample offset")?,
            seed,
        )?;
        // Points followed by the chunk's total area.
        let staging = session.staging::<f32>("Points Readback", floats + 1)?;

        let mut encoder = session.command_encoder("Surface Sampling Encoder");
        self.dispatch(
            session,
            &mut encoder,
            &self.kernels.sample_points,
            &[
                (0, vertices),
                (1, &distribution.faces),
                (2, &params),
                (6, &distribution.cdf),
                (7, &points),
            ],
            invocations,
        );
        let points_bytes = (floats * std::mem::size_of::<f32>()) as u64;
        let total_offset = u64::from(distribution.face_count - 1) * 4;
        encoder.copy_buffer_to_buffer(points.buffer(), 0, staging.buffer(), 0, points_bytes);
        encoder.copy_buffer_to_buffer(
            distribution.cdf.buffer(),
            total_offset,
            staging.buffer(),
            points_bytes,
            4,
        );
        session.submit(encoder)?;

        let values = session.read::<f32>(&staging)?;
        let total_area = values[floats];
        if !(total_area.is_finite() && total_area > 0.0) {
            return Err(Error::DeviceError(format!(
                "face chunk has no usable surface area (total {total_area})"
            )));
        }

        Ok(values[..floats]
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
            .collect())
    }

    fn params<'s>(
        &self,
        session: &'s DeviceSession<'_>,
        count: u32,
        face_count: u32,
        offset: u32,
        seed: u32,
    ) -> Result<DeviceBuffer<'s>> {
        session.upload(
            "Kernel Params",
            &[KernelParams {
                count,
                face_count,
                offset,
                seed,
            }],
            wgpu::BufferUsages::UNIFORM,
        )
    }

    /// Record one compute pass covering `invocations` threads.
    fn dispatch(
        &self,
        session: &DeviceSession<'_>,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bindings: &[(u32, &DeviceBuffer<'_>)],
        invocations: u32,
    ) {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = bindings
            .iter()
            .map(|&(binding, buffer)| wgpu::BindGroupEntry {
                binding,
                resource: buffer.binding(),
            })
            .collect();
        let bind_group = session
            .context()
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Surface Sampling Bind Group"),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &entries,
            });

        let (x, y) = workgroup_grid(invocations);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Surface Sampling Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(x, y, 1);
    }
}

impl SurfaceSampler for GpuSampler {
    fn backend(&self) -> Backend {
        Backend::Gpu
    }

    fn default_remainder_scope(&self) -> RemainderScope {
        RemainderScope::LastChunk
    }

    fn sample(&self, mesh: &Mesh, request: &SampleRequest) -> Result<SampleSet> {
        // In-memory runs are one chunk spanning every face.
        let chunk_size = match request.mode {
            SamplingMode::Streaming => request.chunk_size,
            SamplingMode::InMemory => mesh.face_count().max(1),
        };
        let plan = SamplingPlan::new(mesh, request.num_samples, chunk_size)?;
        if plan.num_samples == 0 {
            return Ok(SampleSet::empty(Backend::Gpu));
        }

        let stream = mesh.face_chunks(plan.chunk_size)?;
        let scope = self.remainder_scope(request);
        let last_index = stream.len() - 1;
        let seed_for = |task: usize| task_rng(request.seed, task).next_u32();

        let session = self.context.session();
        let vertices = session.upload("Mesh Vertices", &mesh.vertices, wgpu::BufferUsages::STORAGE)?;
        let pb = progress::chunk_bar(stream.len() as u64, "Sampling face chunks", request.show_progress);

        let mut points = Vec::with_capacity(plan.num_samples);
        let mut batch_counts = Vec::with_capacity(stream.len());
        let mut last_distribution = None;

        for chunk in stream.iter() {
            let count = plan.samples_for_chunk(chunk.len());
            let keep_for_remainder = chunk.index == last_index
                && plan.remainder > 0
                && scope == RemainderScope::LastChunk;

            if count > 0 || keep_for_remainder {
                let distribution = self.prepare_distribution(&session, &vertices, chunk.items)?;
                if count > 0 {
                    let batch = self.sample_distribution(
                        &session,
                        &vertices,
                        &distribution,
                        count,
                        seed_for(chunk.index),
                    )?;
                    points.extend(batch);
                }
                if keep_for_remainder {
                    last_distribution = Some(distribution);
                }
            }

            batch_counts.push(count);
            pb.inc(1);
        }

        if plan.remainder > 0 {
            let distribution = match last_distribution.take() {
                Some(distribution) => distribution,
                None => self.prepare_distribution(&session, &vertices, &mesh.faces)?,
            };
            let extra = self.sample_distribution(
                &session,
                &vertices,
                &distribution,
                plan.remainder,
                seed_for(stream.len()),
            )?;
            points.extend(extra);
        }

        pb.finish_with_message("Chunks sampled");
        log::debug!(
            "GPU sampled {} points over {} chunks ({} bytes on device)",
            points.len(),
            stream.len(),
            session.allocated_bytes()
        );

        Ok(SampleSet {
            points,
            batch_counts,
            remainder: plan.remainder,
            backend: Backend::Gpu,
        })
    }
}

fn to_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| Error::AllocationFailure(format!("{what} of {len} elements is too large")))
}

/// Points whose xyz output fits in `binding_bytes`.
fn points_per_binding(binding_bytes: u64) -> usize {
    let point_bytes = 3 * std::mem::size_of::<f32>() as u64;
    usize::try_from(binding_bytes / point_bytes)
        .unwrap_or(usize::MAX)
        .max(1)
}

/// `(offset, len)` ranges covering `0..count`, none longer than `max_batch`.
fn sample_batches(count: usize, max_batch: usize) -> Vec<(usize, usize)> {
    let max_batch = max_batch.max(1);
    (0..count)
        .step_by(max_batch)
        .map(|offset| (offset, max_batch.min(count - offset)))
        .collect()
}

/// Workgroup counts for `invocations` threads, spilling into y past the
/// per-dimension limit.
fn workgroup_grid(invocations: u32) -> (u32, u32) {
    let groups = invocations.div_ceil(WORKGROUP_SIZE).max(1);
    let x = groups.min(MAX_WORKGROUPS_PER_DIMENSION);
    (x, groups.div_ceil(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::compute_bounds;
    use crate::mesh::test_meshes::{one_to_three, unit_cube};

    fn gpu_sampler() -> Option<GpuSampler> {
        let context = GpuContext::probe()?;
        match GpuSampler::new(context) {
            Ok(sampler) => Some(sampler),
            Err(err) => {
                println!("GPU sampler unavailable: {err}");
                None
            }
        }
    }

    #[test]
    fn workgroup_grid_spills_into_second_dimension() {
        assert_eq!(workgroup_grid(1), (1, 1));
        assert_eq!(workgroup_grid(256), (1, 1));
        assert_eq!(workgroup_grid(257), (2, 1));
        let wide = MAX_WORKGROUPS_PER_DIMENSION * WORKGROUP_SIZE + 1;
        assert_eq!(workgroup_grid(wide), (MAX_WORKGROUPS_PER_DIMENSION, 2));
    }

    #[test]
    fn large_chunks_are_split_to_fit_a_storage_binding() {
        // 128 MiB binding: 11 184 810 points of 12 bytes each.
        let max_batch = points_per_binding(128 << 20);
        assert_eq!(max_batch, 11_184_810);

        let batches = sample_batches(12_000_000, max_batch);
        assert_eq!(batches, vec![(0, 11_184_810), (11_184_810, 815_190)]);
        assert!(batches.iter().all(|&(_, len)| len * 12 <= 128 << 20));

        assert_eq!(sample_batches(7, 3), vec![(0, 3), (3, 3), (6, 1)]);
        assert_eq!(sample_batches(6, 3), vec![(0, 3), (3, 3)]);
        assert_eq!(sample_batches(5, 100), vec![(0, 5)]);
        assert!(sample_batches(0, 3).is_empty());
        assert_eq!(points_per_binding(4), 1);
    }

    #[test]
    fn kernel_params_match_uniform_layout() {
        assert_eq!(std::mem::size_of::<KernelParams>(), 16);
    }

    #[test]
    fn exact_counts_and_bounds() {
        let Some(sampler) = gpu_sampler() else {
            println!("No suitable GPU adapter found, skipping test.");
            return;
        };

        let cube = unit_cube();
        let bounds = compute_bounds(&cube, 8).unwrap();
        for num_samples in [1, 13, 1200] {
            for chunk_size in [1, 5, 12, 40] {
                let request = SampleRequest::new(num_samples, chunk_size, 11);
                let set = sampler.sample(&cube, &request).unwrap();
                assert_eq!(set.len(), num_samples);
                assert_eq!(set.backend, Backend::Gpu);
                assert!(set.points.iter().all(|&p| bounds.contains(p, 1e-4)));
            }
        }
    }

    #[test]
    fn default_remainder_uses_last_chunk() {
        let Some(sampler) = gpu_sampler() else {
            println!("No suitable GPU adapter found, skipping test.");
            return;
        };

        let set = sampler.sample(&one_to_three(), &SampleRequest::new(1, 1, 3)).unwrap();
        assert_eq!(set.remainder, 1);
        assert!(set.points[0].x >= 10.0 - 1e-4);
    }

    #[test]
    fn zero_area_chunk_is_a_device_error() {
        let Some(sampler) = gpu_sampler() else {
            println!("No suitable GPU adapter found, skipping test.");
            return;
        };

        let mut mesh = one_to_three();
        mesh.faces.push([0, 0, 0]);
        let result = sampler.sample(&mesh, &SampleRequest::new(30, 1, 3));
        assert!(matches!(result, Err(Error::DeviceError(_))));

        // The failed call released its session.
        let retry = sampler.sample(&one_to_three(), &SampleRequest::new(30, 1, 3));
        assert_eq!(retry.unwrap().len(), 30);
    }

    #[test]
    fn in_memory_mode_is_a_single_batch() {
        let Some(sampler) = gpu_sampler() else {
            println!("No suitable GPU adapter found, skipping test.");
            return;
        };

        let request = SampleRequest::new(1003, 2, 5).with_mode(SamplingMode::InMemory);
        let set = sampler.sample(&unit_cube(), &request).unwrap();
        assert_eq!(set.len(), 1003);
        assert_eq!(set.batch_counts, vec![996]);
        assert_eq!(set.remainder, 7);
    }
}
