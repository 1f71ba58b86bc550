//! Vertex and geometry types
//!
//! Geometry is immutable once decoded and shared between nodes via `Arc`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Type of primitive to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveType {
    /// Whether this primitive draws line segments
    pub fn is_line(self) -> bool {
        matches!(self, Self::Lines | Self::LineStrip)
    }

    /// Whether this primitive draws filled surfaces
    pub fn is_surface(self) -> bool {
        matches!(
            self,
            Self::Triangles | Self::TriangleStrip | Self::TriangleFan
        )
    }
}

/// A vertex with position, normal, UV, tangent, and color data
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// 3D position
    pub position: [f32; 3],
    /// Normal vector
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
    /// Tangent vector (xyz + w handedness)
    pub tangent: [f32; 4],
    /// Vertex color (RGBA)
    pub color: [f32; 4],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.0, 0.0],
            tangent: [1.0, 0.0, 0.0, 1.0],
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            ..Default::default()
        }
    }

    /// Create a vertex with only a position
    pub fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Set the tangent vector
    pub fn with_tangent(mut self, tangent: [f32; 4]) -> Self {
        self.tangent = tangent;
        self
    }

    /// Create a vertex with color
    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    /// Size of a vertex in bytes
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Vertex and index data of one drawable primitive
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub primitive_type: PrimitiveType,
    pub vertices: Vec<Vertex>,
    /// Index list; empty means the vertices are drawn in order
    pub indices: Vec<u32>,
}

impl Geometry {
    /// Create a new geometry
    pub fn new(primitive_type: PrimitiveType, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            primitive_type,
            vertices,
            indices,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of indices
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Whether the geometry has nothing to draw
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Get the vertex buffer as bytes
    pub fn vertex_buffer(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get the index buffer as bytes
    pub fn index_buffer(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Iterate over vertex positions transformed by `matrix`
    pub fn transformed_positions(&self, matrix: Mat4) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices
            .iter()
            .map(move |v| matrix.transform_point3(Vec3::from_array(v.position)))
    }

    /// Replace every normal with the face normal of its triangle
    ///
    /// Only meaningful for triangle lists. Vertices shared between faces
    /// receive the normalized sum of the adjacent face normals.
    pub fn compute_normals(&mut self) {
        if self.primitive_type != PrimitiveType::Triangles {
            return;
        }

        let mut normals = vec![Vec3::ZERO; self.vertices.len()];
        let triangles: Vec<[usize; 3]> = if self.indices.is_empty() {
            (0..self.vertices.len() / 3)
                .map(|i| [i * 3, i * 3 + 1, i * 3 + 2])
                .collect()
        } else {
            self.indices
                .chunks_exact(3)
                .map(|chunk| [chunk[0] as usize, chunk[1] as usize, chunk[2] as usize])
                .collect()
        };

        for [i0, i1, i2] in triangles {
            if i0 >= normals.len() || i1 >= normals.len() || i2 >= normals.len() {
                log::warn!("Skipping triangle with out-of-range index");
                continue;
            }

            let v0 = Vec3::from_array(self.vertices[i0].position);
            let v1 = Vec3::from_array(self.vertices[i1].position);
            let v2 = Vec3::from_array(self.vertices[i2].position);
            let normal = (v1 - v0).cross(v2 - v0);

            if normal.length_squared() > 1e-12 {
                let normal = normal.normalize();
                normals[i0] += normal;
                normals[i1] += normal;
                normals[i2] += normal;
            }
        }

        for (vertex, normal) in self.vertices.iter_mut().zip(normals) {
            vertex.normal = if normal.length_squared() > 1e-12 {
                normal.normalize().to_array()
            } else {
                [0.0, 0.0, 1.0]
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Geometry {
        Geometry::new(
            PrimitiveType::Triangles,
            vec![
                Vertex::at([0.0, 0.0, 0.0]),
                Vertex::at([1.0, 0.0, 0.0]),
                Vertex::at([0.0, 1.0, 0.0]),
            ],
            vec![],
        )
    }

    #[test]
    fn test_vertex_size() {
        assert_eq!(Vertex::size(), 64);
        assert_eq!(Vertex::size(), std::mem::size_of::<Vertex>());
    }

    #[test]
    fn test_vertex_buffer_bytes() {
        let geometry = triangle();
        assert_eq!(geometry.vertex_buffer().len(), 3 * Vertex::size());
        assert!(geometry.index_buffer().is_empty());
    }

    #[test]
    fn test_compute_flat_normals() {
        let mut geometry = triangle();
        geometry.vertices[0].normal = [1.0, 0.0, 0.0];
        geometry.compute_normals();
        for vertex in &geometry.vertices {
            assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_transformed_positions() {
        let geometry = triangle();
        let moved: Vec<Vec3> = geometry
            .transformed_positions(Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)))
            .collect();
        assert_eq!(moved[1], Vec3::new(1.0, 0.0, 5.0));
    }

    #[test]
    fn test_primitive_classes() {
        assert!(PrimitiveType::Lines.is_line());
        assert!(PrimitiveType::TriangleFan.is_surface());
        assert!(!PrimitiveType::Points.is_surface());
    }
}
