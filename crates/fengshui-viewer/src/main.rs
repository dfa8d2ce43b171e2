//! Fengshui Viewer - 3D room viewer with annotation markers
//!
//! Shows an analysis next to the generated room model. The model comes
//! either from a local file or from the generation job named in the
//! analysis, which is polled in the background until it finishes.

mod bridge;

use anyhow::{Context, Result};
use bevy::asset::AssetMetaCheck;
use bevy::log::{Level, LogPlugin};
use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use bevy_picking::{prelude::MeshPickingPlugin, DefaultPickingPlugins};
use clap::Parser;
use fengshui_client::config::API_URL_ENV;
use fengshui_client::overlay_svg::image_natural_size;
use fengshui_client::{load_config, DEMO_RESPONSE};
use fengshui_core::{AnalysisResult, ImageMetrics, ImageSize, InteractionMode};
use fengshui_scene::{
    AnalysisData, FengshuiScenePlugin, ModelJobDisplay, RoomModel, ViewerSettings,
};
use std::path::PathBuf;

use bridge::{process_bridge_events, spawn_bridge, Bridge, BridgeCommand};

#[derive(Parser, Debug)]
#[command(name = "fengshui-viewer")]
#[command(about = "3D viewer for Feng Shui room analyses")]
#[command(version)]
struct Args {
    /// Analysis response JSON (defaults to the bundled demo)
    #[arg(long)]
    analysis: Option<PathBuf>,

    /// The analyzed room photo, used for its natural size
    #[arg(long)]
    image: Option<PathBuf>,

    /// Room model to show instead of waiting for the generation job (.glb)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Model job to watch (defaults to the job in the analysis)
    #[arg(long)]
    job: Option<String>,

    /// Open markers by clicking instead of hovering
    #[arg(long)]
    click: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "fengshui.toml")]
    config: PathBuf,

    /// Analysis API base URL (overrides config and FENGSHUI_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// What the viewer was started with, consumed on startup
#[derive(Resource)]
struct Launch {
    analysis: Option<AnalysisResult>,
    image: Option<PathBuf>,
    model: Option<PathBuf>,
    job: Option<String>,
    fallback: ImageSize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut config = load_config(&args.config)?;
    config.apply_api_overrides(std::env::var(API_URL_ENV).ok(), args.api_url);

    let content = match &args.analysis {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => DEMO_RESPONSE.to_string(),
    };
    let analysis = AnalysisResult::from_json_str(&content).context("Invalid analysis response")?;

    let model = match &args.model {
        Some(path) => Some(
            std::fs::canonicalize(path)
                .with_context(|| format!("Model not found: {}", path.display()))?,
        ),
        None => None,
    };

    let (bridge, pending) = spawn_bridge(&config)?;

    let settings = ViewerSettings {
        interaction_mode: if args.click {
            InteractionMode::Click
        } else {
            InteractionMode::Hover
        },
        ..default()
    };

    App::new()
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "Fengshui - Room Viewer".to_string(),
                        ..default()
                    }),
                    ..default()
                })
                .set(AssetPlugin {
                    file_path: "".to_string(),
                    // Generated models ship without .meta files
                    meta_check: AssetMetaCheck::Never,
                    ..default()
                })
                .set(LogPlugin {
                    level,
                    filter: "wgpu=error,naga=warn".to_string(),
                    ..default()
                }),
        )
        // Picking must be registered before egui so it can detect it
        .add_plugins(DefaultPickingPlugins)
        .add_plugins(MeshPickingPlugin)
        .add_plugins(EguiPlugin::default())
        .insert_resource(settings)
        .insert_resource(Launch {
            analysis: Some(analysis),
            image: args.image,
            model,
            job: args.job,
            fallback: config.fallback_image_size(),
        })
        .insert_resource(bridge)
        .insert_resource(pending)
        .add_plugins(FengshuiScenePlugin)
        .add_systems(Startup, start_viewer)
        .add_systems(Update, process_bridge_events)
        .run();

    Ok(())
}

fn start_viewer(
    mut launch: ResMut<Launch>,
    mut analysis: ResMut<AnalysisData>,
    mut room: ResMut<RoomModel>,
    mut job: ResMut<ModelJobDisplay>,
    bridge: Res<Bridge>,
) {
    info!("Fengshui viewer v{}", env!("CARGO_PKG_VERSION"));

    let mut metrics = ImageMetrics::with_fallback(launch.fallback);
    if let Some(image) = &launch.image {
        match image_natural_size(image) {
            Ok(size) => metrics.on_image_loaded(size),
            Err(e) => warn!(image = %image.display(), error = %e, "Using fallback image size"),
        }
    }

    let Some(result) = launch.analysis.take() else {
        return;
    };
    let job_id = launch
        .job
        .take()
        .or_else(|| result.model_id().map(str::to_string));
    info!(
        score = result.score,
        annotations = result.tooltips.len(),
        "Analysis loaded"
    );
    analysis.set(result, metrics);

    if let Some(model) = launch.model.take() {
        room.request(model.to_string_lossy());
    } else if let Some(job_id) = job_id {
        info!(job_id = %job_id, "Watching model generation");
        *job = ModelJobDisplay::watching(job_id.clone());
        bridge.send(BridgeCommand::Watch(job_id));
    } else {
        info!("No model or generation job; showing the analysis only");
    }
}
