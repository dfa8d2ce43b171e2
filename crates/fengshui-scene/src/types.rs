//! Shared resources for the room scene

use bevy::prelude::*;
use fengshui_core::{
    Annotation, AnalysisResult, CardLayout, ImageMetrics, InteractionMode, JobStatus,
};
use serde::{Deserialize, Serialize};

/// The analysis being shown and the photo it was computed on
///
/// Every replacement bumps the revision so markers are recomputed from the
/// new annotation list.
#[derive(Resource, Default)]
pub struct AnalysisData {
    result: Option<AnalysisResult>,
    image: ImageMetrics,
    revision: u64,
}

impl AnalysisData {
    pub fn set(&mut self, result: AnalysisResult, image: ImageMetrics) {
        self.result = Some(result);
        self.image = image;
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        self.result = None;
        self.revision += 1;
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.result
            .as_ref()
            .map(|r| r.tooltips.as_slice())
            .unwrap_or_default()
    }

    pub fn image(&self) -> &ImageMetrics {
        &self.image
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Model generation progress as last reported by the poller
#[derive(Resource, Debug, Clone, Default)]
pub struct ModelJobDisplay {
    pub job_id: Option<String>,
    pub status: Option<JobStatus>,
    /// Failure or download error
    pub message: Option<String>,
    pub download_url: Option<String>,
}

impl ModelJobDisplay {
    pub fn watching(job_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            ..default()
        }
    }
}

/// Viewer preferences
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub interaction_mode: InteractionMode,
    /// Marker sphere radius in world units
    pub marker_radius: f32,
    pub card: CardLayout,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            interaction_mode: InteractionMode::Hover,
            marker_radius: 0.3,
            card: CardLayout::default(),
        }
    }
}
