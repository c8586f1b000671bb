use glam::*;

use super::{Frustum, OBB, Ray, RayPacket, PacketWidth, SupportedPacketWidth};

/*****************************************************************************
*                               PUB STRUCTS
******************************************************************************/

/// Axis aligned bounding box. The default box is empty (`min = +inf`,
/// `max = -inf`) and acts as the identity for both `grow` operations.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AABB {
    pub min: Vec3,
    pub max: Vec3
}

/*****************************************************************************
*                               IMPLEMENTATIONS
******************************************************************************/

impl AABB {
    #[inline]
    pub fn new(min: &Vec3, max: &Vec3) -> Self {
        AABB {
            min: *min,
            max: *max
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    pub fn grow_aabb(&mut self, aabb: &AABB) {
        if aabb.is_empty() {
            return;
        }

        self.grow_vec3(&aabb.min);
        self.grow_vec3(&aabb.max);
    }

    #[inline]
    pub fn grow_vec3(&mut self, p: &Vec3) {
        self.min = p.min(self.min);
        self.max = p.max(self.max);
    }

    #[inline]
    pub fn union(&self, other: &AABB) -> AABB {
        let mut result = *self;
        result.grow_aabb(other);
        result
    }

    #[inline]
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.max + self.min) * 0.5
    }

    #[inline]
    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }

        let extent = self.extent();
        2.0 * (extent.x * extent.y + extent.y * extent.z + extent.z * extent.x)
    }

    #[inline]
    pub fn contains_point(&self, p: &Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    #[inline]
    pub fn contains_aabb(&self, other: &AABB) -> bool {
        other.is_empty() || (self.contains_point(&other.min) && self.contains_point(&other.max))
    }

    #[inline]
    pub fn corners(&self) -> [Vec3; 8] {
        [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),

            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z)
        ]
    }

    /// The six faces as corner quads: -Y, +Y, -Z, +X, +Z, -X.
    pub fn faces(&self) -> [[Vec3; 4]; 6] {
        let c = self.corners();
        [
            [c[0], c[1], c[2], c[3]],
            [c[4], c[7], c[6], c[5]],
            [c[0], c[4], c[5], c[1]],
            [c[1], c[5], c[6], c[2]],
            [c[2], c[6], c[7], c[3]],
            [c[3], c[7], c[4], c[0]]
        ]
    }

    /// Bounds of this box after `transform`, grown around all eight transformed corners.
    pub fn transformed(&self, transform: &Mat4) -> AABB {
        let mut bounds = AABB::default();
        if self.is_empty() {
            return bounds;
        }

        for corner in self.corners() {
            bounds.grow_vec3(&transform.transform_point3(corner));
        }
        bounds
    }

    #[inline]
    pub fn to_obb(&self, transform: &Mat4) -> OBB {
        OBB::from_aabb(self, transform)
    }

    /// Slab test over an explicit interval. Returns the entry distance clipped
    /// to `[tmin, tmax]`, or infinity when the interval is empty.
    #[inline]
    pub fn intersect_interval(&self, origin: &Vec3, inv_direction: &Vec3, tmin: f32, tmax: f32) -> f32 {
        let mut tnear = tmin;
        let mut tfar = tmax;

        for axis in 0..3 {
            // Parallel to the slab: only the origin decides.
            if inv_direction[axis].is_infinite() {
                if origin[axis] < self.min[axis] || origin[axis] > self.max[axis] {
                    return f32::INFINITY;
                }
                continue;
            }

            let t1 = (self.min[axis] - origin[axis]) * inv_direction[axis];
            let t2 = (self.max[axis] - origin[axis]) * inv_direction[axis];
            tnear = t1.min(t2).max(tnear);
            tfar = t1.max(t2).min(tfar);
        }

        if tnear <= tfar {
            tnear
        } else {
            f32::INFINITY
        }
    }

    /// Entry distance of `ray` within `[t_min, t_max]`, or infinity on a miss.
    #[inline]
    pub fn intersect(&self, ray: &Ray) -> f32 {
        self.intersect_interval(ray.origin(), ray.inv_direction(), ray.t_min(), ray.t_max())
    }

    /// Lane-wise slab test; inactive lanes report infinity.
    pub fn intersect_packet<const SIZE: usize>(&self, packet: &RayPacket<SIZE>, active: &[bool; SIZE]) -> [f32; SIZE]
    where PacketWidth<SIZE>: SupportedPacketWidth {
        let mut result = [f32::INFINITY; SIZE];
        for (i, t) in result.iter_mut().enumerate() {
            if active[i] {
                *t = self.intersect(packet.ray(i));
            }
        }
        result
    }

    /// False only when the box lies entirely behind one of the frustum planes.
    pub fn intersect_frustum(&self, frustum: &Frustum) -> bool {
        if self.is_empty() {
            return false;
        }

        frustum.planes().iter().all(|plane| {
            let normal = plane.normal();
            let positive = Vec3::new(
                if normal.x >= 0.0 { self.max.x } else { self.min.x },
                if normal.y >= 0.0 { self.max.y } else { self.min.y },
                if normal.z >= 0.0 { self.max.z } else { self.min.z }
            );
            plane.signed_distance(&positive) >= 0.0
        })
    }
}

impl Default for AABB {
    #[inline]
    fn default() -> Self {
        AABB {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY)
        }
    }
}
