//! Fengshui Scene - 3D room view with annotation markers
//!
//! Bevy plugins for the room viewer: an orbit camera, lighting, loading and
//! preparing the generated room model, projecting analysis annotations onto
//! it as markers, and the egui panel and detail card.

pub mod camera;
pub mod markers;
pub mod models;
pub mod scene;
pub mod types;
pub mod ui;

use bevy::prelude::*;

/// Plugin that sets up the room scene and its UI
pub struct FengshuiScenePlugin;

impl Plugin for FengshuiScenePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<AnalysisData>()
            .init_resource::<ModelJobDisplay>()
            .init_resource::<ViewerSettings>()
            .add_plugins(camera::CameraPlugin)
            .add_plugins(scene::SceneSetupPlugin)
            .add_plugins(models::ModelsPlugin)
            .add_plugins(markers::MarkersPlugin)
            .add_plugins(ui::UiPlugin);
    }
}

// Re-export commonly used types
pub use camera::{CameraSettings, MainCamera};
pub use markers::{Marker, MarkerState};
pub use models::{RoomModel, MODEL_SCALE};
pub use types::*;
