use glam::{Mat3, Mat4, Vec3};

/// Narrowest field of view `zoom` and `set_fov` allow, in degrees.
pub const MIN_FOV: f32 = 30.0;
/// Widest field of view `zoom` and `set_fov` allow, in degrees.
pub const MAX_FOV: f32 = 120.0;

/// Perspective camera described by a position, a look direction and an up vector.
///
/// `up` is used as given: it is never re-orthogonalized against `direction`,
/// so the caller must keep the two from becoming parallel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: 90.0,
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    /// Square 90° camera used to render one cube face from `position`.
    pub fn looking_at_face(position: Vec3, direction: Vec3, up: Vec3) -> Self {
        Self {
            position,
            direction,
            up,
            ..Self::default()
        }
    }

    /// Rotate the look direction by `dx` radians about Y, then `dy` about X.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        let rotation = Mat3::from_rotation_y(dx) * Mat3::from_rotation_x(dy);
        self.direction = rotation * self.direction;
    }

    /// Widen (positive) or narrow (negative) the field of view.
    pub fn zoom(&mut self, delta: f32) {
        self.set_fov(self.fov + delta);
    }

    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov.clamp(MIN_FOV, MAX_FOV);
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, self.up)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera() {
        let cam = Camera::default();
        assert_eq!(cam.direction, Vec3::NEG_Z);
        let vp = cam.view_projection();
        assert!(!vp.col(0).x.is_nan());
    }

    #[test]
    fn zoom_is_clamped() {
        let mut cam = Camera::default();
        cam.zoom(500.0);
        assert_eq!(cam.fov, MAX_FOV);
        cam.zoom(-500.0);
        assert_eq!(cam.fov, MIN_FOV);
        cam.zoom(10.0);
        assert_eq!(cam.fov, 40.0);
    }

    #[test]
    fn rotate_about_y() {
        let mut cam = Camera::default();
        cam.rotate(std::f32::consts::FRAC_PI_2, 0.0);
        // -Z turned a quarter turn counter-clockwise about +Y points at -X.
        assert!(cam.direction.abs_diff_eq(Vec3::NEG_X, 1e-5));
    }

    #[test]
    fn vp_is_projection_times_view() {
        let cam = Camera {
            position: Vec3::new(1.0, 2.0, 3.0),
            aspect: 16.0 / 9.0,
            ..Camera::default()
        };
        let expected = cam.projection() * cam.view();
        assert!(cam.view_projection().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn view_maps_target_onto_forward_axis() {
        let cam = Camera {
            position: Vec3::new(0.0, 0.0, 5.0),
            ..Camera::default()
        };
        let p = cam.view().transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    }

    #[test]
    fn up_is_not_renormalized() {
        let up = Vec3::new(0.0, 2.0, 0.5);
        let cam = Camera::looking_at_face(Vec3::ZERO, Vec3::X, up);
        assert_eq!(cam.up, up);
        assert_eq!(cam.fov, 90.0);
        assert_eq!(cam.aspect, 1.0);
    }
}
