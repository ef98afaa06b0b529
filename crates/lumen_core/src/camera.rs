//! Pinhole camera for primary ray generation.

use lumen_math::{Quat, Ray, Vec3};

/// Radians of rotation per pixel of mouse movement.
const ROTATE_SPEED: f64 = 0.005;

/// Degrees of field of view change per scroll step.
const ZOOM_STEP: f64 = 2.0;

const MIN_FOV: f64 = 10.0;
const MAX_FOV: f64 = 120.0;

/// Keeps the look direction from reaching the up axis, where yaw is undefined.
const MAX_PITCH: f64 = 89.0 * std::f64::consts::PI / 180.0;

/// Perspective camera.
///
/// Pixel `(x, y)` covers `[x, x + 1) x [y, y + 1)` in continuous pixel
/// coordinates, with row 0 at the top of the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    position: Vec3,
    direction: Vec3,
    up: Vec3,
    /// Vertical field of view in degrees
    fov: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::Y, 60.0)
    }
}

impl Camera {
    /// Create a camera at `position` looking along `direction`, with +Z up.
    pub fn new(position: Vec3, direction: Vec3, fov_deg: f64) -> Self {
        let mut camera = Self {
            position,
            direction: Vec3::Y,
            up: Vec3::Z,
            fov: 60.0,
        };
        camera.set_direction(direction);
        camera.set_fov(fov_deg);
        camera
    }

    /// Use a different world-up axis.
    pub fn with_up(mut self, up: Vec3) -> Self {
        if let Some(up) = up.try_normalize() {
            self.up = up;
        }
        self
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Unit look direction.
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Vertical field of view in degrees.
    pub fn fov(&self) -> f64 {
        self.fov
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Point the camera along `direction`. A zero vector is ignored.
    pub fn set_direction(&mut self, direction: Vec3) {
        match direction.try_normalize() {
            Some(dir) => self.direction = dir,
            None => log::warn!("ignoring zero camera direction"),
        }
    }

    /// Set the vertical field of view, clamped to the zoom range.
    pub fn set_fov(&mut self, fov_deg: f64) {
        if fov_deg.is_finite() {
            self.fov = fov_deg.clamp(MIN_FOV, MAX_FOV);
        }
    }

    /// Orthonormal camera basis: (forward, right, up).
    fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = self.direction;
        let right = forward
            .cross(self.up)
            .try_normalize()
            .unwrap_or_else(|| forward.any_orthonormal_vector());
        let up = right.cross(forward);
        (forward, right, up)
    }

    /// Generate the primary ray through continuous pixel coordinate `(px, py)`.
    pub fn ray(&self, px: f64, py: f64, width: u32, height: u32) -> Ray {
        let width = f64::from(width.max(1));
        let height = f64::from(height.max(1));
        let (forward, right, up) = self.basis();

        let aspect = width / height;
        let scale = (self.fov.to_radians() / 2.0).tan();
        let sx = (2.0 * px / width - 1.0) * aspect * scale;
        let sy = (1.0 - 2.0 * py / height) * scale;

        let direction = (forward + right * sx + up * sy).normalize();
        Ray::new(self.position, direction)
    }

    /// Rotate the view from a mouse delta in pixels.
    ///
    /// Horizontal movement yaws around the world-up axis, vertical movement
    /// pitches around the camera's right axis. Pitch stops short of looking
    /// straight up or down.
    pub fn euler_rotate(&mut self, dx: f64, dy: f64) {
        let yaw = Quat::from_axis_angle(self.up, -dx * ROTATE_SPEED);
        self.direction = (yaw * self.direction).normalize();

        let elevation = self.direction.dot(self.up).clamp(-1.0, 1.0).asin();
        let target = (elevation - dy * ROTATE_SPEED).clamp(-MAX_PITCH, MAX_PITCH);
        let (_, right, _) = self.basis();
        let pitch = Quat::from_axis_angle(right, target - elevation);
        self.direction = (pitch * self.direction).normalize();
    }

    /// Translate the camera in world space.
    pub fn move_position(&mut self, delta: Vec3) {
        self.position += delta;
    }

    /// Narrow (positive scroll) or widen (negative scroll) the field of view.
    pub fn zoom(&mut self, scroll: f64) {
        self.set_fov(self.fov - scroll * ZOOM_STEP);
    }
}
