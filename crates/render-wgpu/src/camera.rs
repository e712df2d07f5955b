use glam::{Mat4, Vec3};

use sensorview_common::ScreenSize;

const MIN_PITCH: f32 = -89.0 * std::f32::consts::PI / 180.0;
const MAX_PITCH: f32 = 89.0 * std::f32::consts::PI / 180.0;

/// Camera orbiting a target point, Y up.
///
/// Input mutates it, then the caller fires "camera changed" so subscribers
/// pick up the new matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        let mut camera = Self {
            target: Vec3::ZERO,
            distance: 30.0,
            yaw: 0.0,
            pitch: 0.0,
            fov: 60.0_f32.to_radians(),
            aspect: ScreenSize::default().aspect(),
            near: 0.1,
            far: 2000.0,
            min_distance: 1.0,
            max_distance: 1000.0,
        };
        camera.isometric_view();
        camera
    }
}

impl OrbitCamera {
    pub fn eye(&self) -> Vec3 {
        let offset = Vec3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        );
        self.target + offset * self.distance
    }

    /// Orbit by the given angles in radians. Pitch stays short of the poles.
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        self.yaw = (self.yaw + yaw).rem_euclid(std::f32::consts::TAU);
        self.pitch = (self.pitch + pitch).clamp(MIN_PITCH, MAX_PITCH);
    }

    /// Scale the distance to the target. Factors below one move closer.
    pub fn zoom(&mut self, factor: f32) {
        if factor.is_finite() && factor > 0.0 {
            self.distance = (self.distance * factor).clamp(self.min_distance, self.max_distance);
        }
    }

    /// Look straight down at the target.
    pub fn top_view(&mut self) {
        self.yaw = 0.0;
        self.pitch = MAX_PITCH;
    }

    /// Classic isometric angle: 45 degrees around, about 35 degrees up.
    pub fn isometric_view(&mut self) {
        self.yaw = 45.0_f32.to_radians();
        self.pitch = (1.0 / 2.0_f32.sqrt()).atan();
    }

    /// Follow the window's aspect ratio. Empty sizes are ignored.
    pub fn set_viewport(&mut self, size: ScreenSize) {
        if !size.is_empty() {
            self.aspect = size.aspect();
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// View-projection without translation, for drawing the sky at infinity.
    pub fn sky_view_projection(&self) -> Mat4 {
        let rotation = Mat4::from_mat3(glam::Mat3::from_mat4(self.view_matrix()));
        self.projection_matrix() * rotation
    }
}
