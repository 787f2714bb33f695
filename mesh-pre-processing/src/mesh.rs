/// Flat triangle mesh buffers consumed by the sampling core
use crate::chunk_stream::ChunkStream;
use crate::error::{Error, Result};
use glam::Vec3;

/// Vertex indices of one triangle, 0-based into `Mesh::vertices`.
pub type Face = [u32; 3];

/// Triangulated surface as flat vertex and face buffers.
///
/// Face indices are trusted to be in bounds; nothing in the sampling
/// core re-validates them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<Face>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vec3>, faces: Vec<Face>) -> Self {
        Self { vertices, faces }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Corner positions of a face.
    pub fn triangle(&self, face: &Face) -> [Vec3; 3] {
        [
            self.vertices[face[0] as usize],
            self.vertices[face[1] as usize],
            self.vertices[face[2] as usize],
        ]
    }

    /// Half the magnitude of the cross product of two edge vectors, in f64
    /// so that small faces keep their weight next to very large ones.
    pub fn face_area(&self, face: &Face) -> f64 {
        let [v0, v1, v2] = self.triangle(face).map(|v| v.as_dvec3());
        0.5 * (v1 - v0).cross(v2 - v0).length()
    }

    pub fn vertex_chunks(&self, chunk_size: usize) -> Result<ChunkStream<'_, Vec3>> {
        ChunkStream::new(&self.vertices, chunk_size)
    }

    pub fn face_chunks(&self, chunk_size: usize) -> Result<ChunkStream<'_, Face>> {
        ChunkStream::new(&self.faces, chunk_size)
    }

    /// Fails unless the mesh has at least one vertex and one face.
    pub fn ensure_sampleable(&self) -> Result<()> {
        if self.vertices.is_empty() {
            return Err(Error::invalid_mesh("mesh has no vertices"));
        }
        if self.faces.is_empty() {
            return Err(Error::invalid_mesh("mesh has no faces"));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_meshes {
    use super::*;

    /// Axis-aligned unit cube: 8 corners at {0,1}^3, 12 faces of area 0.5.
    pub fn unit_cube() -> Mesh {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        Mesh::new(vertices, faces)
    }

    /// Two disjoint triangles with areas 0.5 (x < 5) and 1.5 (x >= 10).
    pub fn one_to_three() -> Mesh {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(13.0, 0.0, 0.0),
            Vec3::new(10.0, 1.0, 0.0),
        ];
        Mesh::new(vertices, vec![[0, 1, 2], [3, 4, 5]])
    }
}
