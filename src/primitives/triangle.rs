use glam::*;

use super::{AABB, Hit, Ray};
use crate::{MaterialIndex, Vertex};

const DET_EPSILON: f32 = 0.00000001;

/*****************************************************************************
*                               PUB STRUCTS
******************************************************************************/

/// Intersectable triangle derived from a mesh's vertex and index buffers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub vert: [Vertex; 3],
    pub edges: [Vec3; 2],
    /// Unit geometric normal, zero for degenerate triangles.
    pub face_normal: Vec3,
    pub centroid: Vec3,
    pub smooth_shading: bool,
    pub material: MaterialIndex
}

/// Raw parametric solution of a ray/triangle test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleHit {
    pub t: f32,
    pub u: f32,
    pub v: f32
}

/*****************************************************************************
*                               IMPLEMENTATIONS
******************************************************************************/

impl Triangle {
    pub fn new(v0: &Vertex, v1: &Vertex, v2: &Vertex, smooth_shading: bool, material: MaterialIndex) -> Self {
        let edges = [v1.position - v0.position, v2.position - v0.position];
        let normal = edges[0].cross(edges[1]);
        let length = normal.length();
        let face_normal = if length > 0.0 && length.is_finite() {
            normal / length
        } else {
            Vec3::ZERO
        };

        Triangle {
            vert: [*v0, *v1, *v2],
            edges,
            face_normal,
            centroid: (v0.position + v1.position + v2.position) * (1.0 / 3.0),
            smooth_shading,
            material
        }
    }

    #[inline]
    pub fn p0(&self) -> &Vec3 {
        &self.vert[0].position
    }

    /// Zero-area triangles stay in the cache but never report a hit.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.face_normal == Vec3::ZERO
    }

    #[inline]
    pub fn aabb(&self) -> AABB {
        let mut aabb = AABB::default();
        self.expand_aabb(&mut aabb);
        aabb
    }

    #[inline]
    pub fn expand_aabb(&self, aabb: &mut AABB) {
        aabb.grow_vec3(&self.vert[0].position);
        aabb.grow_vec3(&self.vert[1].position);
        aabb.grow_vec3(&self.vert[2].position);
    }

    /// Möller-Trumbore test against the ray's current `[t_min, t_max)` window.
    #[allow(clippy::manual_range_contains)]
    pub fn intersect(&self, ray: &Ray) -> Option<TriangleHit> {
        if self.is_degenerate() {
            return None;
        }

        let edge1 = self.edges[0];
        let edge2 = self.edges[1];
        let pvec = ray.direction().cross(edge2);
        let det = edge1.dot(pvec);

        if ray.flags().contains(super::RayFlags::CullBackFaces) {
            if det < DET_EPSILON {
                return None;
            }
        } else if det > -DET_EPSILON && det < DET_EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let tvec = *ray.origin() - *self.p0();
        let u = tvec.dot(pvec) * inv_det;
        if !(u >= 0.0 && u <= 1.0) {
            return None;
        }

        let qvec = tvec.cross(edge1);
        let v = ray.direction().dot(qvec) * inv_det;
        if !(v >= 0.0 && u + v <= 1.0) {
            return None;
        }

        let t = edge2.dot(qvec) * inv_det;
        if t >= ray.t_min() && t < ray.t_max() {
            Some(TriangleHit { t, u, v })
        } else {
            None
        }
    }

    /// Expands a raw solution into a full hit record in this triangle's space.
    pub fn hit_record(&self, solution: &TriangleHit, triangle: u32) -> Hit {
        let w = Vec3::new(1.0 - solution.u - solution.v, solution.u, solution.v);
        let position = self.vert[0].position * w.x + self.vert[1].position * w.y + self.vert[2].position * w.z;
        let tex_coord = self.vert[0].uv * w.x + self.vert[1].uv * w.y + self.vert[2].uv * w.z;

        let shading_normal = if self.smooth_shading {
            (self.vert[0].normal * w.x + self.vert[1].normal * w.y + self.vert[2].normal * w.z)
                .try_normalize()
                .unwrap_or(self.face_normal)
        } else {
            self.face_normal
        };

        Hit {
            t: solution.t,
            uv: Vec2::new(solution.u, solution.v),
            triangle,
            material: self.material,
            position,
            face_normal: self.face_normal,
            shading_normal,
            tex_coord,
            ..Default::default()
        }
    }
}
