//! Fengshui Core - Analysis types, projection math, and viewer state machines
//!
//! This crate provides the foundational pieces shared by the CLI client and
//! the 3D viewer:
//! - Analysis response and annotation types as served by the analysis API
//! - Model generation job tracking with monotonic status transitions
//! - Image-space to NDC mapping and raycast projection onto prepared meshes
//! - 2D overlay scaling and detail card placement
//! - Marker activation state machine
//! - Pure mesh/material preparation and asset load state
//! - Access gating over injected auth and billing capabilities

pub mod analysis;
pub mod annotation;
pub mod card;
pub mod gating;
pub mod interaction;
pub mod job;
pub mod load;
pub mod mesh;
pub mod overlay;
pub mod projection;

pub use analysis::{score_commentary, AnalysisError, AnalysisResult, ModelJobRef};
pub use annotation::{Annotation, AnnotationKind, BoundingBox, Coordinates, PixelPoint};
pub use card::{place_card, place_card_in, CardLayout, CardPosition, CardSide, ScreenRect};
pub use gating::{
    AccessDecision, AccessGate, AuthProvider, BillingProvider, GateError, GateFlags, UserProfile,
};
pub use interaction::{InteractionMode, MarkerEvent, MarkerInteraction};
pub use job::{JobError, JobStatus, JobTransition, ModelJob, StatusResponse};
pub use load::{LoadPhase, LoadState, LoadTicket};
pub use mesh::{prepare_model, MaterialDesc, MaterialKind, MeshNode, PreparedModel, RawModel};
pub use overlay::{ImageMetrics, ImageSize, OverlayLayout, OverlayShape};
pub use projection::{CameraView, MarkerCache, MarkerSet, ProjectedMarker, ProjectionKey};
