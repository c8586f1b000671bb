use glam::*;

use super::{AABB, Frustum};

/*****************************************************************************
*                               PUB STRUCTS
******************************************************************************/

/// Oriented box used for visibility and shadow tests.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OBB {
    center: Vec3,
    half_size: Vec3,
    axes: [Vec3; 3]
}

/*****************************************************************************
*                               IMPLEMENTATIONS
******************************************************************************/

impl OBB {
    #[inline]
    pub fn new(center: &Vec3, half_size: &Vec3, axes: [Vec3; 3]) -> Self {
        OBB {
            center: *center,
            half_size: *half_size,
            axes
        }
    }

    #[inline]
    pub fn from_rotation(center: &Vec3, half_size: &Vec3, rotation: &Quat) -> Self {
        OBB::new(center, half_size, [*rotation * Vec3::X, *rotation * Vec3::Y, *rotation * Vec3::Z])
    }

    /// Box covering `aabb` under a rotation, translation and (possibly
    /// non-uniform) scale. Scale is folded into the half extents so the axes
    /// stay orthonormal.
    pub fn from_aabb(aabb: &AABB, transform: &Mat4) -> Self {
        let columns = [
            transform.x_axis.truncate(),
            transform.y_axis.truncate(),
            transform.z_axis.truncate()
        ];
        let local_half = aabb.extent() * 0.5;

        let mut axes = [Vec3::X, Vec3::Y, Vec3::Z];
        let mut half_size = Vec3::ZERO;
        for i in 0..3 {
            let length = columns[i].length();
            if length > 0.0 {
                axes[i] = columns[i] / length;
            }
            half_size[i] = local_half[i] * length;
        }

        OBB {
            center: transform.transform_point3(aabb.center()),
            half_size,
            axes
        }
    }

    #[inline]
    pub fn center(&self) -> &Vec3 {
        &self.center
    }

    #[inline]
    pub fn half_size(&self) -> &Vec3 {
        &self.half_size
    }

    #[inline]
    pub fn axes(&self) -> &[Vec3; 3] {
        &self.axes
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let x = self.axes[0] * self.half_size.x;
        let y = self.axes[1] * self.half_size.y;
        let z = self.axes[2] * self.half_size.z;
        let c = self.center;
        [
            c - x - y - z,
            c + x - y - z,
            c + x - y + z,
            c - x - y + z,

            c - x + y - z,
            c + x + y - z,
            c + x + y + z,
            c - x + y + z
        ]
    }

    /// Corner index pairs of the twelve box edges, matching `corners`.
    pub fn edge_indices(&self) -> [[usize; 2]; 12] {
        [
            [0, 1], [1, 2], [2, 3], [3, 0],
            [4, 5], [5, 6], [6, 7], [7, 4],
            [0, 4], [1, 5], [2, 6], [3, 7]
        ]
    }

    /// Half length of the box's projection onto `normal`.
    #[inline]
    pub fn projected_radius(&self, normal: &Vec3) -> f32 {
        self.half_size.x * normal.dot(self.axes[0]).abs() +
        self.half_size.y * normal.dot(self.axes[1]).abs() +
        self.half_size.z * normal.dot(self.axes[2]).abs()
    }

    /// False only when the box lies entirely behind one of the frustum planes.
    pub fn intersect_frustum(&self, frustum: &Frustum) -> bool {
        frustum.planes().iter().all(|plane| {
            plane.signed_distance(&self.center) + self.projected_radius(plane.normal()) >= 0.0
        })
    }
}
