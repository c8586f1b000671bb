use glam::*;
use bitmask_enum::bitmask;

use crate::{InstanceId, MeshId, MaterialIndex, INVALID_TRIANGLE};

/*****************************************************************************
*                               PUB STRUCTS
******************************************************************************/

/// `AnyHit` stops traversal at the first valid intersection. `CullBackFaces`
/// rejects triangles whose geometric normal faces along the ray.
#[bitmask(u8)]
pub enum RayFlags {
    AnyHit,
    CullBackFaces
}

/// Hit record written in place by every traversal level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub t: f32,
    /// Barycentric coordinates of the hit relative to vertices 1 and 2.
    pub uv: Vec2,
    pub triangle: u32,
    pub material: MaterialIndex,
    pub instance: InstanceId,
    pub mesh: MeshId,

    pub position: Vec3,
    pub face_normal: Vec3,
    pub shading_normal: Vec3,
    pub tex_coord: Vec2
}

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    origin: Vec3,
    direction: Vec3,
    inv_direction: Vec3,
    t_min: f32,
    flags: RayFlags,
    heat: u32,
    pub hit: Hit
}

/*****************************************************************************
*                               IMPLEMENTATIONS
******************************************************************************/

impl Hit {
    #[inline]
    pub fn is_hit(&self) -> bool {
        self.triangle != INVALID_TRIANGLE
    }

    /// Barycentric weights of vertices 0, 1 and 2.
    #[inline]
    pub fn barycentrics(&self) -> Vec3 {
        Vec3::new(1.0 - self.uv.x - self.uv.y, self.uv.x, self.uv.y)
    }

    fn miss(t_max: f32) -> Self {
        Hit {
            t: t_max,
            uv: Vec2::ZERO,
            triangle: INVALID_TRIANGLE,
            material: 0,
            instance: InstanceId::INVALID,
            mesh: MeshId::INVALID,
            position: Vec3::ZERO,
            face_normal: Vec3::ZERO,
            shading_normal: Vec3::ZERO,
            tex_coord: Vec2::ZERO
        }
    }
}

impl Default for Hit {
    #[inline]
    fn default() -> Self {
        Hit::miss(f32::INFINITY)
    }
}

impl Ray {
    #[inline]
    pub fn new(origin: &Vec3, direction: &Vec3) -> Self {
        Self::with_range(origin, direction, 0.0, f32::INFINITY)
    }

    #[inline]
    pub fn with_range(origin: &Vec3, direction: &Vec3, t_min: f32, t_max: f32) -> Self {
        let inv_direction = 1.0 / *direction;

        Ray {
            origin: *origin,
            direction: *direction,
            inv_direction,
            t_min,
            flags: RayFlags::none(),
            heat: 0,
            hit: Hit::miss(t_max)
        }
    }

    /// Secondary ray leaving a surface, with its origin pushed off the surface along `normal`.
    pub fn spawn(position: &Vec3, normal: &Vec3, direction: &Vec3) -> Self {
        let side = if normal.dot(*direction) < 0.0 { -*normal } else { *normal };
        Ray::new(&offset_ray_origin(position, &side), direction)
    }

    #[inline]
    pub fn with_flags(mut self, flags: RayFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn origin(&self) -> &Vec3 {
        &self.origin
    }

    #[inline]
    pub fn direction(&self) -> &Vec3 {
        &self.direction
    }

    #[inline]
    pub fn inv_direction(&self) -> &Vec3 {
        &self.inv_direction
    }

    #[inline]
    pub fn t_min(&self) -> f32 {
        self.t_min
    }

    /// Upper end of the valid interval; shrinks as closer hits are recorded.
    #[inline]
    pub fn t_max(&self) -> f32 {
        self.hit.t
    }

    #[inline]
    pub fn flags(&self) -> RayFlags {
        self.flags
    }

    #[inline]
    pub fn any_hit(&self) -> bool {
        self.flags.contains(RayFlags::AnyHit)
    }

    #[inline]
    pub fn is_hit(&self) -> bool {
        self.hit.is_hit()
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Number of acceleration structure nodes visited by queries on this ray.
    #[inline]
    pub fn heat(&self) -> u32 {
        self.heat
    }

    #[inline]
    pub(crate) fn add_heat(&mut self, heat: u32) {
        self.heat += heat;
    }

    /// Stores `hit` only if it is strictly closer than the current record.
    #[inline]
    pub(crate) fn record(&mut self, hit: Hit) -> bool {
        if hit.t < self.hit.t && hit.t >= self.t_min {
            self.hit = hit;
            true
        } else {
            false
        }
    }

    /// Same ray expressed in another space. The direction is not renormalized so
    /// parametric distances stay comparable across spaces.
    pub(crate) fn transformed(&self, transform: &Mat4) -> Ray {
        let mut ray = Ray::with_range(
            &transform.transform_point3(self.origin),
            &transform.transform_vector3(self.direction),
            self.t_min,
            self.hit.t
        );
        ray.flags = self.flags;
        ray
    }
}

impl Default for Ray {
    fn default() -> Self {
        Ray::new(&Vec3::ZERO, &Vec3::NEG_Z)
    }
}

/// Offsets a surface point along its geometric normal by a few ULPs so that a
/// ray spawned from it does not re-intersect the surface it left.
pub fn offset_ray_origin(position: &Vec3, normal: &Vec3) -> Vec3 {
    const ORIGIN: f32 = 1.0 / 32.0;
    const FLOAT_SCALE: f32 = 1.0 / 65536.0;
    const INT_SCALE: f32 = 256.0;

    let mut result = Vec3::ZERO;
    for axis in 0..3 {
        let p = position[axis];
        let n = normal[axis];
        let offset = (INT_SCALE * n) as i32;
        let shifted = f32::from_bits(
            (p.to_bits() as i32).wrapping_add(if p < 0.0 { -offset } else { offset }) as u32
        );

        result[axis] = if p.abs() < ORIGIN {
            p + FLOAT_SCALE * n
        } else {
            shifted
        };
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ray_has_empty_hit_record() {
        let ray = Ray::new(&Vec3::ZERO, &Vec3::X);
        assert!(!ray.is_hit());
        assert_eq!(ray.t_max(), f32::INFINITY);
        assert_eq!(ray.inv_direction().x, 1.0);
        assert_eq!(ray.inv_direction().y, f32::INFINITY);
    }

    #[test]
    fn record_only_accepts_strictly_closer_hits() {
        let mut ray = Ray::with_range(&Vec3::ZERO, &Vec3::X, 0.5, 10.0);
        let hit = |t| Hit { t, triangle: 0, ..Default::default() };

        assert!(ray.record(hit(4.0)));
        assert!(!ray.record(hit(4.0)));
        assert!(!ray.record(hit(6.0)));
        assert!(!ray.record(hit(0.25)));
        assert!(ray.record(hit(2.0)));
        assert_eq!(ray.t_max(), 2.0);
    }

    #[test]
    fn flags_are_carried_into_transformed_rays() {
        let ray = Ray::new(&Vec3::ONE, &Vec3::Z).with_flags(RayFlags::AnyHit);
        let moved = ray.transformed(&Mat4::from_scale(Vec3::splat(2.0)));
        assert!(moved.any_hit());
        assert_eq!(*moved.origin(), Vec3::splat(2.0));
        assert_eq!(*moved.direction(), Vec3::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn offset_moves_point_to_the_normal_side() {
        let normal = Vec3::Y;
        for p in [Vec3::new(3.0, 1000.0, -2.0), Vec3::new(0.0, 0.001, 0.0), Vec3::new(5.0, -250.0, 1.0)] {
            let offset = offset_ray_origin(&p, &normal);
            assert!(offset.y > p.y);
            assert_eq!(offset.x, p.x);
            assert!((offset - p).length() < 0.05);
        }
    }

    #[test]
    fn spawned_ray_leaves_on_the_direction_side() {
        let ray = Ray::spawn(&Vec3::new(0.0, 100.0, 0.0), &Vec3::Y, &Vec3::NEG_Y);
        assert!(ray.origin().y < 100.0);
    }
}
