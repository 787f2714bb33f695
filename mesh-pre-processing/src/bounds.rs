/// Mesh coordinate bounds tracking and normalisation
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::progress;
use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for MeshBounds {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshBounds {
    /// Create new bounds initialised to infinity values
    pub fn new() -> Self {
        Self {
            min: Vec3::INFINITY,
            max: Vec3::NEG_INFINITY,
        }
    }

    /// Update bounds with a new point
    pub fn update(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Fold another set of extrema into these bounds
    pub fn merge(&mut self, other: &MeshBounds) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// False until at least one point has been folded in
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Get world space dimensions
    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }

    /// Whether `point` lies inside the box, widened by `tolerance` on every side
    pub fn contains(&self, point: Vec3, tolerance: f32) -> bool {
        point.cmpge(self.min - Vec3::splat(tolerance)).all()
            && point.cmple(self.max + Vec3::splat(tolerance)).all()
    }

    /// Normalise X coordinate to 0-1 range
    pub fn normalize_x(&self, x: f32) -> f32 {
        normalize(x, self.min.x, self.max.x)
    }

    /// Normalise Y coordinate to 0-1 range
    pub fn normalize_y(&self, y: f32) -> f32 {
        normalize(y, self.min.y, self.max.y)
    }

    /// Normalise Z coordinate to 0-1 range
    pub fn normalize_z(&self, z: f32) -> f32 {
        normalize(z, self.min.z, self.max.z)
    }

    /// Normalise every axis of a point to 0-1 range
    pub fn normalize(&self, point: Vec3) -> Vec3 {
        Vec3::new(
            self.normalize_x(point.x),
            self.normalize_y(point.y),
            self.normalize_z(point.z),
        )
    }
}

// Flat axes collapse to 0 instead of dividing by zero.
fn normalize(value: f32, min: f32, max: f32) -> f32 {
    let extent = max - min;
    if extent > 0.0 {
        (value - min) / extent
    } else {
        0.0
    }
}

/// Streaming bounding box over the mesh vertices.
///
/// Each vertex chunk is reduced to its own extrema, which are then folded into
/// the running box. The min/max fold is associative and commutative, so the
/// result does not depend on `chunk_size`.
pub fn compute_bounds(mesh: &Mesh, chunk_size: usize) -> Result<MeshBounds> {
    compute_bounds_with_progress(mesh, chunk_size, false)
}

/// Same as [`compute_bounds`], reporting vertex chunks on a progress bar.
pub fn compute_bounds_with_progress(
    mesh: &Mesh,
    chunk_size: usize,
    show_progress: bool,
) -> Result<MeshBounds> {
    let chunks = mesh.vertex_chunks(chunk_size)?;
    if chunks.is_empty() {
        return Err(Error::invalid_mesh(
            "cannot compute bounds of a mesh without vertices",
        ));
    }

    let pb = progress::chunk_bar(chunks.len() as u64, "Calculating bounds", show_progress);

    let mut bounds = MeshBounds::new();
    for chunk in chunks.iter() {
        let mut local_bounds = MeshBounds::new();
        for &vertex in chunk.items {
            local_bounds.update(vertex);
        }
        bounds.merge(&local_bounds);
        pb.inc(1);
    }

    pb.finish_with_message("Bounds calculated");
    log::debug!(
        "Bounds over {} vertices in {} chunks: {:?} to {:?}",
        mesh.vertex_count(),
        chunks.len(),
        bounds.min,
        bounds.max
    );
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::test_meshes::{one_to_three, unit_cube};

    #[test]
    fn unit_cube_bounds() {
        let bounds = compute_bounds(&unit_cube(), 4).unwrap();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::ONE);
        assert_eq!(bounds.dimensions(), Vec3::ONE);
    }

    #[test]
    fn bounds_are_independent_of_chunk_size() {
        for mesh in [unit_cube(), one_to_three()] {
            let per_vertex = compute_bounds(&mesh, 1).unwrap();
            let single_pass = compute_bounds(&mesh, mesh.vertex_count()).unwrap();
            let oversized = compute_bounds(&mesh, mesh.vertex_count() + 7).unwrap();

            assert_eq!(per_vertex.min.to_array(), single_pass.min.to_array());
            assert_eq!(per_vertex.max.to_array(), single_pass.max.to_array());
            assert_eq!(oversized, single_pass);
        }
    }

    #[test]
    fn bounds_without_vertices_fail() {
        assert!(matches!(
            compute_bounds(&Mesh::default(), 8),
            Err(Error::InvalidMesh(_))
        ));
    }

    #[test]
    fn zero_chunk_size_fails() {
        assert!(matches!(
            compute_bounds(&unit_cube(), 0),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn fresh_bounds_are_invalid_until_updated() {
        let mut bounds = MeshBounds::new();
        assert!(!bounds.is_valid());
        bounds.update(Vec3::new(1.0, -2.0, 3.0));
        assert!(bounds.is_valid());
        assert_eq!(bounds.dimensions(), Vec3::ZERO);
        assert_eq!(bounds.normalize_x(1.0), 0.0);
    }
}
