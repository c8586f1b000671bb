use glam::*;

use super::OBB;

/*****************************************************************************
*                               PUB STRUCTS
******************************************************************************/

/// Half space `normal . p >= distance`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    normal: Vec3,
    distance: f32
}

/// Six inward facing planes. Volumes behind any one plane are outside.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6]
}

/*****************************************************************************
*                               IMPLEMENTATIONS
******************************************************************************/

impl Plane {
    /// Normalizes `normal`, rescaling `distance` to match.
    pub fn new(normal: &Vec3, distance: f32) -> Self {
        let length = normal.length();
        if length > 0.0 {
            Plane {
                normal: *normal / length,
                distance: distance / length
            }
        } else {
            Plane {
                normal: Vec3::ZERO,
                distance: f32::NEG_INFINITY
            }
        }
    }

    /// Plane through three points, facing the side from which they appear counter-clockwise.
    pub fn from_points(p1: &Vec3, p2: &Vec3, p3: &Vec3) -> Self {
        let normal = (*p2 - *p1).cross(*p3 - *p1).normalize_or_zero();
        Plane {
            normal,
            distance: normal.dot(*p1)
        }
    }

    /// Plane from clip-space row coefficients `a x + b y + c z + d >= 0`.
    fn from_coefficients(coefficients: Vec4) -> Self {
        Plane::new(&coefficients.truncate(), -coefficients.w)
    }

    #[inline]
    pub fn normal(&self) -> &Vec3 {
        &self.normal
    }

    #[inline]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    #[inline]
    pub fn signed_distance(&self, point: &Vec3) -> f32 {
        self.normal.dot(*point) - self.distance
    }

    #[inline]
    pub fn inside(&self, point: &Vec3) -> bool {
        self.signed_distance(point) >= 0.0
    }
}

impl Frustum {
    #[inline]
    pub fn new(planes: [Plane; 6]) -> Self {
        Frustum {
            planes
        }
    }

    #[inline]
    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    // Corner directions in order: top right, top left, bottom left, bottom right.
    pub fn from_corner_rays(origin: &Vec3, corners: &[Vec3; 4], near: f32, far: f32) -> Self {
        let forward = (corners[0] + corners[1] + corners[2] + corners[3]).normalize_or_zero();

        let mut planes = [Plane::new(&Vec3::ZERO, 0.0); 6];
        for i in 0..4 {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            let mut normal = a.cross(b - a).normalize_or_zero();
            if normal.dot(forward) < 0.0 {
                normal = -normal;
            }
            planes[i] = Plane {
                normal,
                distance: normal.dot(*origin)
            };
        }

        planes[4] = Plane {
            normal: forward,
            distance: forward.dot(*origin + forward * near)
        };
        planes[5] = Plane {
            normal: -forward,
            distance: (-forward).dot(*origin + forward * far)
        };

        Frustum {
            planes
        }
    }

    /// Extracts the planes of a view-projection matrix with a `[0, 1]` depth range.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        Frustum {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r2),
                Plane::from_coefficients(r3 - r2)
            ]
        }
    }

    /// Volume containing every point that can cast a shadow from a point light
    /// at `light_position` onto `obb`. When the light sits inside the box the
    /// result admits everything.
    pub fn shadow(obb: &OBB, light_position: &Vec3) -> Self {
        let open = Frustum::new([Plane::new(&Vec3::ZERO, 0.0); 6]);

        let forward = (*obb.center() - *light_position).normalize_or_zero();
        if forward == Vec3::ZERO {
            return open;
        }
        let reference = if forward.y.abs() < 0.99 { Vec3::Y } else { Vec3::X };
        let right = forward.cross(reference).normalize();
        let up = right.cross(forward);

        let mut x_range = (f32::INFINITY, f32::NEG_INFINITY);
        let mut y_range = (f32::INFINITY, f32::NEG_INFINITY);
        let mut depth_max = 0.0f32;
        for corner in obb.corners() {
            let v = corner - *light_position;
            let depth = v.dot(forward);
            if depth <= f32::EPSILON {
                return open;
            }

            let x = v.dot(right) / depth;
            let y = v.dot(up) / depth;
            x_range = (x_range.0.min(x), x_range.1.max(x));
            y_range = (y_range.0.min(y), y_range.1.max(y));
            depth_max = depth_max.max(depth);
        }

        let through_light = |normal: Vec3| {
            let normal = normal.normalize();
            Plane {
                normal,
                distance: normal.dot(*light_position)
            }
        };

        Frustum {
            planes: [
                through_light(forward * x_range.1 - right),
                through_light(right - forward * x_range.0),
                through_light(forward * y_range.1 - up),
                through_light(up - forward * y_range.0),
                through_light(forward),
                Plane {
                    normal: -forward,
                    distance: -(forward.dot(*light_position) + depth_max)
                }
            ]
        }
    }

    #[inline]
    pub fn contains_point(&self, point: &Vec3) -> bool {
        self.planes.iter().all(|plane| plane.inside(point))
    }
}
