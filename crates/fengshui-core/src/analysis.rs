//! Analysis API response

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotation::Annotation;
use crate::job::JobStatus;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Score {0} is outside 0-10")]
    ScoreOutOfRange(f32),
}

/// Reference to the background 3D model job started by an analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelJobRef {
    pub model_id: String,
    #[serde(default)]
    pub status: JobStatus,
}

/// Full response of the analysis endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Harmony score, 0 to 10
    pub score: f32,
    pub overall_analysis: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Raw detector output, passed through untouched
    #[serde(default)]
    pub detected_objects: Vec<serde_json::Value>,
    /// Annotations consumed by the projector
    #[serde(default)]
    pub tooltips: Vec<Annotation>,
    #[serde(default)]
    pub model_3d: Option<ModelJobRef>,
}

impl AnalysisResult {
    /// Parse and validate a response body
    pub fn from_json_str(s: &str) -> Result<Self, AnalysisError> {
        let result: AnalysisResult = serde_json::from_str(s)?;
        if !(0.0..=10.0).contains(&result.score) {
            return Err(AnalysisError::ScoreOutOfRange(result.score));
        }
        let off_anchor = result
            .tooltips
            .iter()
            .filter(|t| !t.center_within_bbox())
            .count();
        if off_anchor > 0 {
            tracing::warn!(
                count = off_anchor,
                "Annotations with center outside bounding box"
            );
        }
        Ok(result)
    }

    /// Job id of the background 3D model, if one was started
    pub fn model_id(&self) -> Option<&str> {
        self.model_3d.as_ref().map(|m| m.model_id.as_str())
    }

    /// Whether the score earns the celebratory mascot
    pub fn is_celebration(&self) -> bool {
        self.score >= 7.0
    }
}

const FALLBACK_COMMENTARY: &str = "Every space can be improved - let's start fresh!";

/// Mascot commentary for a whole score; fractional scores get the fallback
pub fn score_commentary(score: f32) -> &'static str {
    if score.fract() != 0.0 {
        return FALLBACK_COMMENTARY;
    }
    match score as i32 {
        10 => "Absolutely perfect! Your space radiates pure harmony!",
        9 => "Amazing energy flow - you've mastered feng shui!",
        8 => "Wonderful balance! Your space feels truly harmonious.",
        7 => "Great work! Just a few tweaks for perfection.",
        6 => "You're on the right track! Let's enhance this energy.",
        5 => "There's potential here - let's unlock it together!",
        4 => "Don't worry, we can improve this with some changes!",
        3 => "Your space needs attention, but I'm here to help!",
        2 => "Let's work together to transform this energy!",
        _ => FALLBACK_COMMENTARY,
    }
}
