//! Renderer-facing triangle output.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Interleaved vertex for a terrain vertex buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// One visible mesh leaf in world space.
///
/// Vertices are ordered apex, v0, v1, which gives every triangle of the mesh
/// the same winding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibleTriangle {
    pub tile: u32,
    pub index: u32,
    pub positions: [Vec3; 3],
    pub normals: [Vec3; 3],
    pub uvs: [Vec2; 3],
}

impl VisibleTriangle {
    /// The three vertices in buffer layout.
    #[must_use]
    pub fn vertices(&self) -> [TerrainVertex; 3] {
        std::array::from_fn(|k| TerrainVertex {
            position: self.positions[k].to_array(),
            normal: self.normals[k].to_array(),
            uv: self.uvs[k].to_array(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<TerrainVertex>(), 32);
        let v = TerrainVertex {
            position: [1.0, 2.0, 3.0],
            normal: [0.0, 1.0, 0.0],
            uv: [0.5, 0.25],
        };
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 32);
        let floats: &[f32] = bytemuck::cast_slice(bytes);
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.0, 1.0, 0.0, 0.5, 0.25]);
    }
}
