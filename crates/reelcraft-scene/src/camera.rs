//! Perspective camera.

use glam::{Mat4, Vec3};

/// Right-handed perspective camera looking at a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl PerspectiveCamera {
    pub fn new(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 10.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_degrees,
            aspect: sanitize_aspect(aspect),
            near,
            far,
        }
    }

    /// Place the camera on +Z so a `world_height` tall rectangle at the
    /// origin exactly fills the view vertically.
    pub fn framing(world_height: f32, fov_y_degrees: f32, aspect: f32) -> Self {
        let mut camera = Self::new(fov_y_degrees, aspect, 0.1, 1000.0);
        camera.position = Vec3::new(0.0, 0.0, framing_distance(world_height, fov_y_degrees));
        camera
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = sanitize_aspect(aspect);
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(50.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}

/// Distance at which `world_height` fills a `fov_y_degrees` view.
pub fn framing_distance(world_height: f32, fov_y_degrees: f32) -> f32 {
    let half = (fov_y_degrees.to_radians() * 0.5).tan();
    if half <= f32::EPSILON {
        return world_height;
    }
    world_height * 0.5 / half
}

fn sanitize_aspect(aspect: f32) -> f32 {
    if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_fills_view() {
        let camera = PerspectiveCamera::framing(10.0, 50.0, 0.5625);
        let vp = camera.view_projection();
        let top = vp.project_point3(Vec3::new(0.0, 5.0, 0.0));
        assert!((top.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_aspect_is_sanitized() {
        let mut camera = PerspectiveCamera::default();
        camera.set_aspect(0.0);
        assert_eq!(camera.aspect(), 1.0);
        camera.set_aspect(f32::NAN);
        assert_eq!(camera.aspect(), 1.0);
    }
}
