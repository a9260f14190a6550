//! Perspective camera for screen-space error projection
//!
//! Author: Moroya Sakamoto

use glam::{Mat4, Vec2, Vec3, Vec4Swizzles};
use serde::{Deserialize, Serialize};

/// Look-at perspective camera with a pixel viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Eye position
    pub eye: Vec3,
    /// Point looked at
    pub target: Vec3,
    /// Up hint
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Viewport size in pixels
    pub viewport: [u32; 2],
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: std::f32::consts::FRAC_PI_3,
            viewport: [1920, 1080],
            near: 0.01,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// Camera at `eye` looking at `target` with default lens and viewport
    pub fn look_at(eye: Vec3, target: Vec3) -> Self {
        Self {
            eye,
            target,
            ..Default::default()
        }
    }

    /// Same camera with another viewport
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = [width.max(1), height.max(1)];
        self
    }

    /// Same camera with another vertical field of view (radians)
    pub fn with_fov(mut self, fov_y: f32) -> Self {
        self.fov_y = fov_y;
        self
    }

    /// Width over height
    #[inline]
    pub fn aspect(&self) -> f32 {
        self.viewport[0].max(1) as f32 / self.viewport[1].max(1) as f32
    }

    /// Unit view direction (-Z when eye and target coincide)
    pub fn forward(&self) -> Vec3 {
        let dir = (self.target - self.eye).normalize_or_zero();
        if dir == Vec3::ZERO {
            Vec3::NEG_Z
        } else {
            dir
        }
    }

    /// World-to-view transform
    pub fn view_matrix(&self) -> Mat4 {
        let forward = self.forward();
        let mut up = self.up.normalize_or_zero();
        if up == Vec3::ZERO || forward.cross(up).length_squared() < 1e-8 {
            up = if forward.y.abs() < 0.9 { Vec3::Y } else { Vec3::Z };
        }
        Mat4::look_at_rh(self.eye, self.eye + forward, up)
    }

    /// View-to-clip transform
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect(), self.near, self.far)
    }

    /// Combined world-to-clip transform
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Pixels covered by one world unit at view depth `depth`
    #[inline]
    pub fn pixels_per_unit(&self, depth: f32) -> f32 {
        self.viewport[1] as f32 / (2.0 * (self.fov_y * 0.5).tan() * depth.max(self.near))
    }

    /// Pixel coordinates of `p`, `None` when it lies behind the near plane
    pub fn project(&self, p: Vec3) -> Option<Vec2> {
        let clip = self.view_projection() * p.extend(1.0);
        if clip.w <= self.near {
            return None;
        }
        let ndc = clip.xy() / clip.w;
        let size = Vec2::new(self.viewport[0] as f32, self.viewport[1] as f32);
        Some((ndc * Vec2::new(0.5, -0.5) + 0.5) * size)
    }

    /// Screen-space length of the segment `a-b` in pixels.
    ///
    /// When either end is behind the near plane, the world length is scaled
    /// at the nearer end's depth instead, clamped to the near plane.
    pub fn pixel_distance(&self, a: Vec3, b: Vec3) -> f32 {
        match (self.project(a), self.project(b)) {
            (Some(pa), Some(pb)) => pa.distance(pb),
            _ => {
                let forward = self.forward();
                let depth = (a - self.eye).dot(forward).min((b - self.eye).dot(forward));
                a.distance(b) * self.pixels_per_unit(depth)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_projects_to_center() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO).with_viewport(800, 600);
        let p = camera.project(Vec3::ZERO).unwrap();
        assert!((p - Vec2::new(400.0, 300.0)).length() < 1e-3);
    }

    #[test]
    fn test_behind_camera_is_none() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        assert!(camera.project(Vec3::new(0.0, 0.0, 20.0)).is_none());
    }

    #[test]
    fn test_pixel_distance_shrinks_with_depth() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        let near = camera.pixel_distance(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.1, 0.0, 5.0));
        let far = camera.pixel_distance(Vec3::new(0.0, 0.0, -40.0), Vec3::new(0.1, 0.0, -40.0));
        assert!(near > far * 5.0);
    }

    #[test]
    fn test_projected_length_matches_scale() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        let measured = camera.pixel_distance(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0));
        let expected = camera.pixels_per_unit(10.0);
        assert!((measured - expected).abs() / expected < 1e-3);
    }

    #[test]
    fn test_vertical_view_has_valid_matrix() {
        let camera = Camera::look_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO);
        assert!(camera.view_matrix().is_finite());
        assert!(camera.project(Vec3::ZERO).is_some());
    }
}
