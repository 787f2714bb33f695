/// Height map rasterisation from sampled surface points, with tiled output
use crate::bounds::MeshBounds;
use crate::dds_writer::write_heightmap_dds;
use crate::error::{Error, Result};
use crate::resolution::{Resolution, UpAxis};
use glam::Vec3;
use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Greyscale depth for PNG output. DDS output is always R32F.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BitDepth {
    Eight,
    Sixteen,
}

impl TryFrom<u8> for BitDepth {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            8 => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            other => Err(Error::invalid_configuration(format!(
                "bit depth must be 8 or 16, got {other}"
            ))),
        }
    }
}

impl From<BitDepth> for u8 {
    fn from(depth: BitDepth) -> Self {
        match depth {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }
}

/// Normalised heights, row-major, row 0 on the north edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Heightmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

pub struct HeightmapGenerator {
    resolution: Resolution,
    up_axis: UpAxis,
}

impl HeightmapGenerator {
    pub fn new(resolution: Resolution, up_axis: UpAxis) -> Self {
        Self {
            resolution,
            up_axis,
        }
    }

    /// Bin points to pixels, keeping the highest normalised height per pixel.
    pub fn generate(&self, points: &[Vec3], bounds: &MeshBounds) -> Heightmap {
        let Resolution { width, height } = self.resolution;
        log::info!(
            "Creating {}x{} height map from {} points",
            width,
            height,
            points.len()
        );

        let mut data = vec![0.0f32; self.resolution.pixel_count()];
        for &point in points {
            let normalised = bounds.normalize(point);
            let (east, north) = self.up_axis.horizontal(normalised);
            let col = pixel(east, width);
            let row = height - 1 - pixel(north, height);
            let index = row as usize * width as usize + col as usize;
            data[index] = data[index].max(self.up_axis.height(normalised));
        }

        Heightmap {
            width,
            height,
            data,
        }
    }
}

// Out-of-range coordinates from f32 rounding land on the edge pixels.
fn pixel(normalised: f32, extent: u32) -> u32 {
    ((normalised.clamp(0.0, 1.0) * extent as f32) as u32).min(extent - 1)
}

/// Tile grid for `split` output files: rows is the largest divisor of
/// `split` not above its square root.
pub fn split_grid(split: u32) -> Result<(u32, u32)> {
    validate_split(split)?;
    let rows = (1..=split.isqrt())
        .rev()
        .find(|rows| split % rows == 0)
        .unwrap_or(1);
    Ok((rows, split / rows))
}

/// A split must be positive and form a grid: a perfect square or composite.
pub fn validate_split(split: u32) -> Result<()> {
    if split == 0 {
        return Err(Error::invalid_configuration(
            "split must be a positive integer",
        ));
    }
    let root = split.isqrt();
    let square = root * root == split;
    let composite = (2..=root).any(|divisor| split % divisor == 0);
    if !square && !composite {
        return Err(Error::invalid_configuration(format!(
            "split {split} cannot form a grid (e.g. 4, 9, 12)"
        )));
    }
    Ok(())
}

impl Heightmap {
    /// Copy of the pixel rectangle starting at (`x`, `y`).
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Heightmap {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for row in y..y + height {
            let start = row as usize * self.width as usize + x as usize;
            data.extend_from_slice(&self.data[start..start + width as usize]);
        }
        Heightmap {
            width,
            height,
            data,
        }
    }

    /// Write the map as `split` tiles. The encoding follows the extension:
    /// `.dds` gives R32F, anything else goes through `image` at `bit_depth`.
    /// Returns the written paths in row-major tile order.
    pub fn save(&self, path: &Path, bit_depth: BitDepth, split: u32) -> Result<Vec<PathBuf>> {
        let (rows, cols) = split_grid(split)?;
        if rows > self.height || cols > self.width {
            return Err(Error::invalid_configuration(format!(
                "cannot split a {}x{} height map into {rows}x{cols} tiles",
                self.width, self.height
            )));
        }

        if split == 1 {
            self.write(path, bit_depth)?;
            log::info!("Saved height map to {}", path.display());
            return Ok(vec![path.to_path_buf()]);
        }

        let mut written = Vec::with_capacity(split as usize);
        for row in 0..rows {
            for col in 0..cols {
                let x0 = col * self.width / cols;
                let x1 = (col + 1) * self.width / cols;
                let y0 = row * self.height / rows;
                let y1 = (row + 1) * self.height / rows;

                let tile_path = tile_path(path, row, col);
                self.crop(x0, y0, x1 - x0, y1 - y0)
                    .write(&tile_path, bit_depth)?;
                written.push(tile_path);
            }
        }

        log::info!(
            "Saved height map as {rows}x{cols} tiles next to {}",
            path.display()
        );
        Ok(written)
    }

    fn write(&self, path: &Path, bit_depth: BitDepth) -> Result<()> {
        let is_dds = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dds"));
        if is_dds {
            return write_heightmap_dds(path, self.width, self.height, &self.data);
        }

        match bit_depth {
            BitDepth::Eight => {
                let pixels = self.data.iter().map(|&h| quantise(h, u8::MAX.into()) as u8).collect();
                grey_image::<u8>(self.width, self.height, pixels)?.save(path)?;
            }
            BitDepth::Sixteen => {
                let pixels = self.data.iter().map(|&h| quantise(h, u16::MAX.into()) as u16).collect();
                grey_image::<u16>(self.width, self.height, pixels)?.save(path)?;
            }
        }
        Ok(())
    }
}

fn quantise(height: f32, max: f32) -> f32 {
    (height.clamp(0.0, 1.0) * max).round()
}

fn grey_image<T>(width: u32, height: u32, pixels: Vec<T>) -> Result<ImageBuffer<Luma<T>, Vec<T>>>
where
    T: image::Primitive,
    Luma<T>: image::Pixel<Subpixel = T>,
{
    ImageBuffer::from_raw(width, height, pixels)
        .ok_or_else(|| Error::invalid_configuration("pixel buffer does not match image size"))
}

/// `dir/stem_{row}_{col}.ext`
fn tile_path(path: &Path, row: u32, col: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "height_map".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{row}_{col}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{row}_{col}"),
    };
    path.with_file_name(name)
}
