//! Annotation markers on the room model
//!
//! Markers are projected once per (model, annotation list, camera) and
//! rebuilt wholesale whenever any of them is replaced. Orbiting the camera
//! does not move them; they stay on the surface they were cast onto.

use bevy::light::NotShadowCaster;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_egui::EguiContexts;
use bevy_picking::mesh_picking::ray_cast::{MeshRayCast, MeshRayCastSettings};
use fengshui_core::{
    AnnotationKind, CameraView, InteractionMode, MarkerCache, MarkerEvent, MarkerInteraction,
    ProjectedMarker, ProjectionKey,
};

use crate::camera::MainCamera;
use crate::models::RoomModel;
use crate::types::{AnalysisData, ViewerSettings};

const ACTIVE_SCALE: f32 = 1.5;
const HOVER_SCALE: f32 = 1.2;

/// A marker sphere, keyed by the index of its annotation
#[derive(Component, Debug, Clone, Copy)]
pub struct Marker {
    pub index: usize,
}

/// Projected markers and which one is open
#[derive(Resource, Default)]
pub struct MarkerState {
    pub cache: MarkerCache,
    pub interaction: MarkerInteraction,
    pub hovered: Option<usize>,
}

impl MarkerState {
    pub fn handle(&mut self, event: MarkerEvent, mode: InteractionMode) -> bool {
        let changed = self.interaction.handle(event, mode);
        if changed {
            debug!(?event, active = ?self.interaction.active(), "Marker interaction");
        }
        changed
    }

    pub fn active_marker(&self) -> Option<&ProjectedMarker> {
        self.interaction
            .active()
            .and_then(|i| self.cache.markers().get(i))
    }

    fn reset(&mut self) {
        self.cache.clear();
        self.interaction = MarkerInteraction::Idle;
        self.hovered = None;
    }
}

#[derive(Resource)]
struct MarkerAssets {
    mesh: Handle<Mesh>,
    good: Handle<StandardMaterial>,
    bad: Handle<StandardMaterial>,
    neutral: Handle<StandardMaterial>,
}

impl MarkerAssets {
    fn material(&self, kind: AnnotationKind) -> Handle<StandardMaterial> {
        match kind {
            AnnotationKind::Good => self.good.clone(),
            AnnotationKind::Bad => self.bad.clone(),
            AnnotationKind::Neutral => self.neutral.clone(),
        }
    }
}

/// Plugin for projecting and picking annotation markers
pub struct MarkersPlugin;

impl Plugin for MarkersPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MarkerState>()
            .add_systems(Startup, setup_marker_assets)
            .add_systems(
                Update,
                (refresh_markers, pick_markers, update_marker_visuals).chain(),
            );
    }
}

fn setup_marker_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    settings: Res<ViewerSettings>,
) {
    let mut accent = |kind: AnnotationKind| {
        let (r, g, b) = kind.accent_rgb();
        let color = Color::srgb_u8(r, g, b);
        materials.add(StandardMaterial {
            base_color: color,
            emissive: color.to_linear() * 0.6,
            perceptual_roughness: 0.4,
            ..default()
        })
    };

    commands.insert_resource(MarkerAssets {
        good: accent(AnnotationKind::Good),
        bad: accent(AnnotationKind::Bad),
        neutral: accent(AnnotationKind::Neutral),
        mesh: meshes.add(Sphere::new(settings.marker_radius)),
    });
}

fn refresh_markers(
    mut commands: Commands,
    mut state: ResMut<MarkerState>,
    analysis: Res<AnalysisData>,
    room: Res<RoomModel>,
    camera: Query<(Entity, &Camera, &GlobalTransform), With<MainCamera>>,
    spawned: Query<Entity, With<Marker>>,
    assets: Res<MarkerAssets>,
) {
    let inputs = room
        .loaded()
        .filter(|_| analysis.result().is_some())
        .zip(camera.single().ok());
    let Some((model, (camera_entity, camera, camera_transform))) = inputs else {
        if state.cache.key().is_some() {
            state.reset();
            for entity in &spawned {
                commands.entity(entity).despawn();
            }
            debug!("Markers cleared");
        }
        return;
    };
    // Projection is not known until the camera has a render target
    if camera.logical_viewport_size().is_none() {
        return;
    }

    let key = ProjectionKey {
        model: model.ticket.id(),
        annotations: analysis.revision(),
        camera: camera_entity.to_bits(),
    };
    let view = CameraView::new(
        Mat4::from(camera_transform.affine()),
        camera.clip_from_view(),
    );
    let annotations = analysis.annotations();
    let image = analysis.image().effective();
    if !state
        .cache
        .refresh(key, annotations, image, &view, &model.prepared)
    {
        return;
    }

    for entity in &spawned {
        commands.entity(entity).despawn();
    }

    let MarkerState {
        cache,
        interaction,
        hovered,
    } = &mut *state;
    let set = cache.markers();
    for marker in &set.markers {
        let kind = marker
            .annotation(annotations)
            .map(|a| a.kind)
            .unwrap_or(AnnotationKind::Neutral);
        commands.spawn((
            Mesh3d(assets.mesh.clone()),
            MeshMaterial3d(assets.material(kind)),
            Transform::from_translation(marker.position),
            NotShadowCaster,
            Marker {
                index: marker.index,
            },
        ));
    }

    if interaction.retain(|i| set.contains(i)) {
        debug!("Active marker no longer exists");
    }
    if hovered.is_some_and(|i| !set.contains(i)) {
        *hovered = None;
    }

    info!(
        markers = set.len(),
        dropped = set.dropped.len(),
        "Placed annotation markers"
    );
}

fn marker_under_cursor(
    window: &Window,
    camera: &Camera,
    camera_transform: &GlobalTransform,
    markers: &Query<&Marker>,
    ray_cast: &mut MeshRayCast,
) -> Option<usize> {
    let cursor = window.cursor_position()?;
    let ray = camera.viewport_to_world(camera_transform, cursor).ok()?;
    let filter = |entity: Entity| markers.contains(entity);
    let settings = MeshRayCastSettings::default().with_filter(&filter);
    let (entity, _) = ray_cast.cast_ray(ray, &settings).first()?;
    markers.get(*entity).ok().map(|m| m.index)
}

#[allow(clippy::too_many_arguments)]
fn pick_markers(
    windows: Query<&Window, With<PrimaryWindow>>,
    camera: Query<(&Camera, &GlobalTransform), With<MainCamera>>,
    markers: Query<&Marker>,
    mut ray_cast: MeshRayCast,
    mouse_button: Res<ButtonInput<MouseButton>>,
    settings: Res<ViewerSettings>,
    mut state: ResMut<MarkerState>,
    mut contexts: EguiContexts,
) {
    // Pointer over a panel or the open card belongs to the UI
    let egui_wants_pointer = contexts
        .ctx_mut()
        .map(|ctx| ctx.wants_pointer_input())
        .unwrap_or(false);
    if egui_wants_pointer {
        return;
    }
    let (Ok(window), Ok((camera, camera_transform))) = (windows.single(), camera.single()) else {
        return;
    };

    let hit = marker_under_cursor(window, camera, camera_transform, &markers, &mut ray_cast);
    let mode = settings.interaction_mode;

    if hit != state.hovered {
        if let Some(previous) = state.hovered {
            state.handle(MarkerEvent::HoverLeave(previous), mode);
        }
        if let Some(next) = hit {
            state.handle(MarkerEvent::HoverEnter(next), mode);
        }
        state.hovered = hit;
    }

    if mouse_button.just_pressed(MouseButton::Left) {
        let event = hit.map_or(MarkerEvent::ClickOutside, MarkerEvent::Click);
        state.handle(event, mode);
    }
}

fn update_marker_visuals(state: Res<MarkerState>, mut markers: Query<(&Marker, &mut Transform)>) {
    if !state.is_changed() {
        return;
    }
    for (marker, mut transform) in &mut markers {
        let scale = if state.interaction.is_active(marker.index) {
            ACTIVE_SCALE
        } else if state.hovered == Some(marker.index) {
            HOVER_SCALE
        } else {
            1.0
        };
        transform.scale = Vec3::splat(scale);
    }
}
