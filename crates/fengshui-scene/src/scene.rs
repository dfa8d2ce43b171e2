//! Camera and lighting setup

use bevy::prelude::*;

use crate::camera::{CameraSettings, MainCamera};

/// Plugin that spawns the camera and lights
pub struct SceneSetupPlugin;

impl Plugin for SceneSetupPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ClearColor(Color::srgb(0.96, 0.95, 0.93)))
            .add_systems(Startup, setup_scene);
    }
}

fn setup_scene(mut commands: Commands, settings: Res<CameraSettings>) {
    commands.spawn((
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            fov: 50f32.to_radians(),
            near: 0.1,
            far: 1000.0,
            ..default()
        }),
        settings.transform(),
        AmbientLight {
            color: Color::srgb(1.0, 0.98, 0.95),
            brightness: 400.0,
            ..default()
        },
        MainCamera,
    ));

    // Key light
    commands.spawn((
        DirectionalLight {
            illuminance: 6000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(10.0, 10.0, 5.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // Fill from the opposite side
    commands.spawn((
        DirectionalLight {
            illuminance: 2000.0,
            shadows_enabled: false,
            ..default()
        },
        Transform::from_xyz(-5.0, 5.0, -5.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // Back light
    commands.spawn((
        PointLight {
            intensity: 400_000.0,
            range: 40.0,
            shadows_enabled: false,
            color: Color::srgb(1.0, 0.95, 0.9),
            ..default()
        },
        Transform::from_xyz(0.0, 5.0, -10.0),
    ));

    info!("Scene setup complete");
}
