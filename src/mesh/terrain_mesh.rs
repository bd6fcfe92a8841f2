//! Renderable chunk mesh

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::math::Aabb;

/// Interleaved GPU vertex: position then normal
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Index buffer with the narrowest width that fits the vertex count
#[derive(Clone, Debug, PartialEq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    /// Narrow to 16-bit when every index fits.
    pub fn from_indices(indices: Vec<u32>, vertex_count: usize) -> Self {
        if vertex_count <= u16::MAX as usize {
            IndexBuffer::U16(indices.into_iter().map(|i| i as u16).collect())
        } else {
            IndexBuffer::U32(indices)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U16(v) => v.len(),
            IndexBuffer::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per index
    pub fn stride(&self) -> usize {
        match self {
            IndexBuffer::U16(_) => 2,
            IndexBuffer::U32(_) => 4,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexBuffer::U16(v) => bytemuck::cast_slice(v),
            IndexBuffer::U32(v) => bytemuck::cast_slice(v),
        }
    }

    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            IndexBuffer::U16(v) => v.get(i).map(|&x| x as u32),
            IndexBuffer::U32(v) => v.get(i).copied(),
        }
    }
}

/// Triangle mesh for one chunk at one LOD.
///
/// Positions are chunk-local; `origin` places the mesh in the world.
#[derive(Clone, Debug)]
pub struct TerrainMesh {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    indices: IndexBuffer,
    bounds: Aabb,
    origin: Vec3,
}

impl TerrainMesh {
    /// Build from marching cubes output.
    ///
    /// Vertices are never shared, so each triangle's face normal is used for
    /// all three of its vertices.
    pub fn from_triangles(positions: Vec<Vec3>, indices: Vec<u32>, origin: Vec3) -> Self {
        let mut normals = vec![Vec3::Y; positions.len()];
        for tri in indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (Some(pa), Some(pb), Some(pc)) = (positions.get(a), positions.get(b), positions.get(c)) else {
                continue;
            };
            let normal = (*pb - *pa).cross(*pc - *pa).normalize_or_zero();
            for i in [a, b, c] {
                normals[i] = normal;
            }
        }

        let mut bounds = Aabb::empty();
        for p in &positions {
            bounds.expand(*p);
        }
        let indices = IndexBuffer::from_indices(indices, positions.len());

        Self {
            positions,
            normals,
            indices,
            bounds,
            origin,
        }
    }

    /// Mesh with no geometry, recorded when a chunk has no surface
    pub fn empty(origin: Vec3) -> Self {
        Self::from_triangles(Vec::new(), Vec::new(), origin)
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn indices(&self) -> &IndexBuffer {
        &self.indices
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Chunk-local bounds of the geometry (empty for an empty mesh)
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn world_bounds(&self) -> Aabb {
        self.bounds.translated(self.origin)
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    /// Positions and normals packed into one vertex stream
    pub fn interleaved(&self) -> Vec<TerrainVertex> {
        self.positions
            .iter()
            .zip(&self.normals)
            .map(|(p, n)| TerrainVertex {
                position: p.to_array(),
                normal: n.to_array(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> TerrainMesh {
        let positions = vec![
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::new(1.0, 0.5, 1.0),
            Vec3::new(1.0, 0.5, 0.0),
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::new(0.0, 0.5, 1.0),
            Vec3::new(1.0, 0.5, 1.0),
        ];
        TerrainMesh::from_triangles(positions, (0..6).collect(), Vec3::new(32.0, 0.0, 0.0))
    }

    #[test]
    fn test_flat_normals() {
        let mesh = quad();
        for n in mesh.normals() {
            assert!((n.y.abs() - 1.0).abs() < 1e-6);
        }
        assert_eq!(mesh.normals()[0], Vec3::Y);
    }

    #[test]
    fn test_bounds_and_origin() {
        let mesh = quad();
        assert_eq!(mesh.bounds().min, Vec3::new(0.0, 0.5, 0.0));
        assert_eq!(mesh.bounds().max, Vec3::new(1.0, 0.5, 1.0));
        assert_eq!(mesh.world_bounds().min, Vec3::new(32.0, 0.5, 0.0));
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn test_index_width() {
        let small = IndexBuffer::from_indices(vec![0, 1, 2], 3);
        assert!(matches!(small, IndexBuffer::U16(_)));
        assert_eq!(small.stride(), 2);
        assert_eq!(small.as_bytes().len(), 6);

        let large = IndexBuffer::from_indices(vec![0, 1, 70_000], 70_001);
        assert!(matches!(large, IndexBuffer::U32(_)));
        assert_eq!(large.get(2), Some(70_000));
        assert_eq!(large.as_bytes().len(), 12);
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = TerrainMesh::empty(Vec3::ZERO);
        assert!(mesh.is_empty());
        assert!(mesh.bounds().is_empty());
        assert_eq!(mesh.triangle_count(), 0);
        assert!(mesh.position_bytes().is_empty());
    }

    #[test]
    fn test_position_bytes() {
        let mesh = quad();
        assert_eq!(mesh.position_bytes().len(), 6 * 12);
    }

    #[test]
    fn test_interleaved_vertices() {
        let mesh = quad();
        let vertices = mesh.interleaved();
        assert_eq!(vertices.len(), mesh.vertex_count());
        assert_eq!(vertices[0].position, mesh.positions()[0].to_array());
        assert_eq!(vertices[0].normal, mesh.normals()[0].to_array());

        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), mesh.vertex_count() * std::mem::size_of::<TerrainVertex>());
        assert_eq!(std::mem::size_of::<TerrainVertex>(), 24);
    }
}
