/// Points sampled from the mesh surface when no count is given
pub const DEFAULT_NUM_SAMPLES: usize = 10_000;

/// Width of the CPU worker pool when no thread count is given
pub const DEFAULT_NUM_THREADS: usize = 4;

/// Faces or vertices per streamed chunk for large models
pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;
