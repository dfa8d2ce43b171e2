//! Fengshui Client - Analysis API access, model job polling, and exports
//!
//! Shared by the `fengshui` CLI and the 3D viewer:
//! - TOML configuration
//! - HTTP client for the analysis and model endpoints
//! - Cancellable status poller with a single-loop supervisor
//! - Persisted gating state with local auth and wallet providers
//! - SVG export of the 2D annotation overlay

pub mod api;
pub mod config;
pub mod overlay_svg;
pub mod poller;
pub mod providers;
pub mod state;

pub use api::{ApiClient, ApiError, StatusSource};
pub use config::{load_config, Config};
pub use poller::{
    poll_job, EventSink, PollEvent, PollOutcome, PollUpdate, PollerConfig, PollerSupervisor,
};
pub use state::{ClientState, StateError};

/// Bundled demo analysis response
pub const DEMO_RESPONSE: &str = include_str!("../assets/demo_response.json");
