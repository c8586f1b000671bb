use glam::*;

/// Instance placement as position, rotation and scale. The matrix is rebuilt
/// lazily after any setter runs.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,

    dirty: bool,
    local_to_world: Mat4
}

impl Default for Transform {
    fn default() -> Self {
        Transform::new()
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position && self.rotation == other.rotation && self.scale == other.scale
    }
}

impl Transform {
    pub fn new() -> Self {
        Transform {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            dirty: true,
            local_to_world: Mat4::IDENTITY
        }
    }

    pub fn from_position(position: &Vec3) -> Self {
        let mut transform = Transform::new();
        transform.set_position(position);
        transform
    }

    pub fn from_trs(position: &Vec3, rotation: &Quat, scale: &Vec3) -> Self {
        Transform {
            position: *position,
            rotation: *rotation,
            scale: *scale,
            ..Transform::new()
        }
    }

    #[inline]
    pub fn get_position(&self) -> &Vec3 {
        &self.position
    }

    #[inline]
    pub fn get_rotation(&self) -> &Quat {
        &self.rotation
    }

    #[inline]
    pub fn get_scale(&self) -> &Vec3 {
        &self.scale
    }

    pub fn set_position(&mut self, position: &Vec3) {
        self.position = *position;
        self.dirty = true;
    }

    pub fn set_rotation(&mut self, rotation: &Quat) {
        self.rotation = *rotation;
        self.dirty = true;
    }

    pub fn set_scale(&mut self, scale: &Vec3) {
        self.scale = *scale;
        self.dirty = true;
    }

    /// Scale, then rotation, then translation.
    pub fn compute_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn get_local_to_world(&mut self) -> &Mat4 {
        if self.dirty {
            self.dirty = false;
            self.local_to_world = self.compute_matrix();
        }
        &self.local_to_world
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_follows_setters() {
        let mut transform = Transform::new();
        assert_eq!(*transform.get_local_to_world(), Mat4::IDENTITY);

        transform.set_position(&Vec3::new(1.0, 2.0, 3.0));
        transform.set_scale(&Vec3::splat(2.0));
        let p = transform.get_local_to_world().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(3.0, 2.0, 3.0), 1e-6));

        transform.set_rotation(&Quat::from_rotation_y(std::f32::consts::PI));
        let p = transform.get_local_to_world().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(-1.0, 2.0, 3.0), 1e-5));
    }

    #[test]
    fn from_trs_matches_setters() {
        let rotation = Quat::from_rotation_z(0.4);
        let mut a = Transform::from_trs(&Vec3::X, &rotation, &Vec3::new(3.0, 1.0, 1.0));
        let mut b = Transform::from_position(&Vec3::X);
        b.set_rotation(&rotation);
        b.set_scale(&Vec3::new(3.0, 1.0, 1.0));

        assert_eq!(a, b);
        assert_eq!(*b.get_position(), Vec3::X);
        assert_eq!(*b.get_rotation(), rotation);
        assert_eq!(*b.get_scale(), Vec3::new(3.0, 1.0, 1.0));
        assert_eq!(*a.get_local_to_world(), *b.get_local_to_world());
        assert_eq!({ *a.get_local_to_world() }, a.compute_matrix());
    }
}
