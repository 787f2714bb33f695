pub mod compute_shader;
pub mod heightmap;
pub mod sampling;
