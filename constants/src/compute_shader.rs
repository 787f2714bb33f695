/// Invocations per workgroup in the surface sampling kernels.
/// Must match `@workgroup_size` in `surface_sampling.wgsl`.
pub const WORKGROUP_SIZE: u32 = 256;

/// Upper bound on workgroups per dispatch dimension guaranteed by every wgpu backend
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65_535;
