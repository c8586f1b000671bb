use glam::*;
use uuid::Uuid;

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::{AccelError, MaterialIndex, Result, Triangle, AABB};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub albedo: Vec3
}

impl Default for Vertex {
    fn default() -> Self {
        Vertex {
            position: Vec3::ZERO,
            normal: Vec3::ZERO,
            uv: Vec2::ZERO,
            albedo: Vec3::ONE
        }
    }
}

/// Vertex and index buffers plus the triangle cache derived from them. The
/// cache is immutable and shared with acceleration structures; editing the
/// buffers marks the mesh modified until `construct_triangles` runs again.
/// Identity is the uuid; a clone is a new mesh with a fresh uuid.
#[derive(Debug)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    material_indices: Vec<MaterialIndex>,
    smooth_shading: bool,

    triangles: Arc<[Triangle]>,
    modified: bool,
    id: Uuid
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self> {
        let material_indices = vec![0; indices.len() / 3];
        Self::with_materials(vertices, indices, material_indices)
    }

    pub fn with_materials(
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        material_indices: Vec<MaterialIndex>
    ) -> Result<Self> {
        if indices.len() % 3 != 0 {
            return Err(AccelError::InvalidIndexBuffer(indices.len()));
        }
        if let Some(index) = indices.iter().find(|i| **i as usize >= vertices.len()) {
            return Err(AccelError::IndexOutOfRange { index: *index, vertex_count: vertices.len() });
        }
        if material_indices.len() != indices.len() / 3 {
            return Err(AccelError::MaterialCountMismatch {
                expected: indices.len() / 3,
                actual: material_indices.len()
            });
        }

        let mut mesh = Mesh {
            vertices,
            indices,
            material_indices,
            smooth_shading: false,
            triangles: Arc::from(Vec::new()),
            modified: true,
            id: Uuid::new_v4()
        };
        mesh.construct_triangles();
        Ok(mesh)
    }

    pub fn get_id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn material_indices(&self) -> &[MaterialIndex] {
        &self.material_indices
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn smooth_shading(&self) -> bool {
        self.smooth_shading
    }

    pub fn set_smooth_shading(&mut self, smooth_shading: bool) {
        if self.smooth_shading != smooth_shading {
            self.smooth_shading = smooth_shading;
            self.modified = true;
        }
    }

    pub fn set_material(&mut self, triangle: usize, material: MaterialIndex) {
        self.material_indices[triangle] = material;
        self.modified = true;
    }

    /// True when the buffers changed after the triangle cache was last derived.
    #[inline]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    #[inline]
    pub fn triangles(&self) -> &Arc<[Triangle]> {
        &self.triangles
    }

    /// Re-derives the triangle cache. Acceleration structures holding the old
    /// cache keep it alive and unchanged.
    pub fn construct_triangles(&mut self) {
        let triangles: Vec<Triangle> = self.indices
            .chunks_exact(3)
            .zip(self.material_indices.iter())
            .map(|(face, material)| Triangle::new(
                &self.vertices[face[0] as usize],
                &self.vertices[face[1] as usize],
                &self.vertices[face[2] as usize],
                self.smooth_shading,
                *material
            ))
            .collect();

        let degenerate = triangles.iter().filter(|t| t.is_degenerate()).count();
        if degenerate > 0 {
            log::warn!("Mesh {} has {} degenerate triangles out of {}", self.id, degenerate, triangles.len());
        }

        self.triangles = Arc::from(triangles);
        self.modified = false;
    }

    /// Area weighted vertex normals.
    pub fn calculate_normals(&mut self) {
        for vertex in self.vertices.iter_mut() {
            vertex.normal = Vec3::ZERO;
        }

        for face in self.indices.chunks_exact(3) {
            let p0 = self.vertices[face[0] as usize].position;
            let p1 = self.vertices[face[1] as usize].position;
            let p2 = self.vertices[face[2] as usize].position;
            let weighted = (p1 - p0).cross(p2 - p0);
            for index in face {
                self.vertices[*index as usize].normal += weighted;
            }
        }

        for vertex in self.vertices.iter_mut() {
            vertex.normal = vertex.normal.normalize_or_zero();
        }
        self.modified = true;
    }

    /// Mean of all vertex positions.
    pub fn calculate_center(&self) -> Vec3 {
        if self.vertices.is_empty() {
            return Vec3::ZERO;
        }

        let sum: Vec3 = self.vertices.iter().map(|v| v.position).sum();
        sum / self.vertices.len() as f32
    }

    pub fn aabb(&self) -> AABB {
        let mut aabb = AABB::default();
        for vertex in &self.vertices {
            aabb.grow_vec3(&vertex.position);
        }
        aabb
    }

    /// Bakes `transform` into the vertex buffer.
    pub fn apply_transform(&mut self, transform: &Mat4) {
        let normal_matrix = Mat3::from_mat4(*transform).inverse().transpose();
        for vertex in self.vertices.iter_mut() {
            vertex.position = transform.transform_point3(vertex.position);
            vertex.normal = (normal_matrix * vertex.normal).normalize_or_zero();
        }
        self.modified = true;
    }
}

impl Clone for Mesh {
    fn clone(&self) -> Self {
        Mesh {
            vertices: self.vertices.clone(),
            indices: self.indices.clone(),
            material_indices: self.material_indices.clone(),
            smooth_shading: self.smooth_shading,
            triangles: self.triangles.clone(),
            modified: self.modified,
            id: Uuid::new_v4()
        }
    }
}

impl PartialEq for Mesh {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Mesh {}

impl Hash for Mesh {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
