/// Longest horizontal edge of the generated heightmap (pixels)
pub const DEFAULT_MAX_RESOLUTION: u32 = 256;

/// Output bit depth for PNG heightmaps
pub const DEFAULT_BIT_DEPTH: u8 = 16;

/// Bit depths the PNG encoder accepts
pub const SUPPORTED_BIT_DEPTHS: &[u8] = &[8, 16];

/// Number of output tiles (must form a grid)
pub const DEFAULT_SPLIT: u32 = 1;

/// Heightmap written when no output path is given
pub const DEFAULT_OUTPUT_PATH: &str = "height_map.png";
