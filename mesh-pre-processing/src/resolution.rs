/// Output image size from the mesh's horizontal footprint
use crate::bounds::MeshBounds;
use crate::error::{Error, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vertical axis of the mesh. The other two axes form the image plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpAxis {
    Y,
    #[default]
    Z,
}

impl UpAxis {
    /// (east, north) coordinates of a point
    pub fn horizontal(self, point: Vec3) -> (f32, f32) {
        match self {
            UpAxis::Y => (point.x, point.z),
            UpAxis::Z => (point.x, point.y),
        }
    }

    pub fn height(self, point: Vec3) -> f32 {
        match self {
            UpAxis::Y => point.y,
            UpAxis::Z => point.z,
        }
    }
}

impl FromStr for UpAxis {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "y" => Ok(UpAxis::Y),
            "z" => Ok(UpAxis::Z),
            other => Err(Error::invalid_configuration(format!(
                "unknown up axis '{other}', expected y or z"
            ))),
        }
    }
}

impl fmt::Display for UpAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpAxis::Y => write!(f, "y"),
            UpAxis::Z => write!(f, "z"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Longest horizontal extent gets `max_resolution` pixels, the other
    /// side keeps the aspect ratio.
    pub fn from_bounds(bounds: &MeshBounds, max_resolution: u32, up_axis: UpAxis) -> Result<Self> {
        if max_resolution == 0 {
            return Err(Error::invalid_configuration(
                "maximum resolution must be a positive integer",
            ));
        }

        let (east, north) = up_axis.horizontal(bounds.dimensions());
        let longest = east.max(north);
        if !(longest.is_finite() && longest > 0.0) {
            return Ok(Self {
                width: max_resolution,
                height: max_resolution,
            });
        }

        let scale = |extent: f32| {
            ((extent / longest * max_resolution as f32).round() as u32).clamp(1, max_resolution)
        };
        let resolution = Self {
            width: scale(east),
            height: scale(north),
        };
        log::info!(
            "Target resolution {}x{} for extent {:.3} x {:.3}",
            resolution.width,
            resolution.height,
            east,
            north
        );
        Ok(resolution)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
