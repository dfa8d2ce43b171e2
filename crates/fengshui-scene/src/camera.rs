//! Orbit camera around the room model
//!
//! The camera orbits a fixed target with Y up. Zoom is limited to a
//! distance range and the polar angle keeps the view between straight
//! ahead and a bird's eye tilt, so the floor never comes into view from
//! below. There is no panning.

use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::prelude::*;
use bevy_egui::EguiContexts;
use std::f32::consts::{FRAC_PI_2, FRAC_PI_6};

/// Camera controller settings
#[derive(Debug, Clone, Resource)]
pub struct CameraSettings {
    pub distance: f32,
    pub target_distance: f32,
    /// Rotation around Y, zero looks down -Z
    pub azimuth: f32,
    pub target_azimuth: f32,
    /// Angle from +Y
    pub polar: f32,
    pub target_polar: f32,
    pub target: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar: f32,
    pub max_polar: f32,
    pub sensitivity: f32,
    pub zoom_speed: f32,
    pub damping: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            distance: 25.0,
            target_distance: 25.0,
            azimuth: 0.0,
            target_azimuth: 0.0,
            polar: FRAC_PI_2,
            target_polar: FRAC_PI_2,
            target: Vec3::ZERO,
            min_distance: 10.0,
            max_distance: 40.0,
            min_polar: FRAC_PI_6,
            max_polar: FRAC_PI_2,
            sensitivity: 0.005,
            zoom_speed: 0.1,
            damping: 0.05,
        }
    }
}

impl CameraSettings {
    /// Rotate by a pointer drag delta in logical pixels
    pub fn orbit(&mut self, delta: Vec2) {
        self.target_azimuth -= delta.x * self.sensitivity;
        self.target_polar = (self.target_polar - delta.y * self.sensitivity)
            .clamp(self.min_polar, self.max_polar);
    }

    /// Zoom by scroll lines, positive moves closer
    pub fn zoom(&mut self, scroll: f32) {
        let factor = 1.0 - scroll * self.zoom_speed;
        self.target_distance =
            (self.target_distance * factor).clamp(self.min_distance, self.max_distance);
    }

    /// Ease the current pose toward the targets
    pub fn step(&mut self, dt: f32) {
        let t = 1.0 - (-self.damping * 60.0 * dt).exp();
        self.distance += (self.target_distance - self.distance) * t;
        self.azimuth += (self.target_azimuth - self.azimuth) * t;
        self.polar += (self.target_polar - self.polar) * t;
    }

    pub fn eye(&self) -> Vec3 {
        let horizontal = self.distance * self.polar.sin();
        self.target
            + Vec3::new(
                horizontal * self.azimuth.sin(),
                self.distance * self.polar.cos(),
                horizontal * self.azimuth.cos(),
            )
    }

    pub fn transform(&self) -> Transform {
        Transform::from_translation(self.eye()).looking_at(self.target, Vec3::Y)
    }
}

/// Marker component for the main camera
#[derive(Component)]
pub struct MainCamera;

/// Plugin for camera controls
pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CameraSettings>()
            .add_systems(Update, update_camera);
    }
}

fn update_camera(
    mut camera_query: Query<&mut Transform, With<MainCamera>>,
    mut settings: ResMut<CameraSettings>,
    mut mouse_motion: MessageReader<MouseMotion>,
    mut mouse_wheel: MessageReader<MouseWheel>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    time: Res<Time>,
    mut contexts: EguiContexts,
) {
    let egui_wants_pointer = contexts
        .ctx_mut()
        .map(|ctx| ctx.wants_pointer_input())
        .unwrap_or(false);

    let motion: Vec2 = mouse_motion.read().map(|m| m.delta).sum();
    if mouse_button.pressed(MouseButton::Left) && !egui_wants_pointer {
        settings.orbit(motion);
    }

    // Scrolling over a panel scrolls the panel
    for scroll in mouse_wheel.read() {
        if !egui_wants_pointer {
            settings.zoom(scroll.y);
        }
    }

    settings.step(time.delta_secs());

    if let Ok(mut transform) = camera_query.single_mut() {
        *transform = settings.transform();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_pose_faces_model_from_front() {
        let eye = CameraSettings::default().eye();
        assert_relative_eq!(eye.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(eye.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(eye.z, 25.0, epsilon = 1e-4);
    }

    #[test]
    fn test_zoom_limits() {
        let mut settings = CameraSettings::default();
        for _ in 0..100 {
            settings.zoom(5.0);
        }
        assert_relative_eq!(settings.target_distance, 10.0);
        for _ in 0..100 {
            settings.zoom(-5.0);
        }
        assert_relative_eq!(settings.target_distance, 40.0);
    }

    #[test]
    fn test_polar_limits() {
        let mut settings = CameraSettings::default();
        // dragging up would look from below the floor
        settings.orbit(Vec2::new(0.0, -1000.0));
        assert_relative_eq!(settings.target_polar, FRAC_PI_2);
        settings.orbit(Vec2::new(0.0, 10_000.0));
        assert_relative_eq!(settings.target_polar, FRAC_PI_6);
    }

    #[test]
    fn test_step_converges_without_overshoot() {
        let mut settings = CameraSettings::default();
        settings.zoom(2.0);
        let goal = settings.target_distance;
        let mut last = settings.distance;
        for _ in 0..600 {
            settings.step(1.0 / 60.0);
            assert!(settings.distance <= last && settings.distance >= goal);
            last = settings.distance;
        }
        assert_relative_eq!(settings.distance, goal, epsilon = 1e-3);
    }
}
