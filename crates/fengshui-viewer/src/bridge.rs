//! Background status polling for the viewer
//!
//! The poller and model downloads run on a dedicated thread with its own
//! current-thread Tokio runtime. Results are queued in [`PendingEvents`]
//! and applied to the scene once per frame.

use bevy::prelude::*;
use fengshui_client::{ApiClient, Config, EventSink, PollEvent, PollUpdate, PollerSupervisor};
use fengshui_core::JobStatus;
use fengshui_scene::{ModelJobDisplay, RoomModel};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Requests from the app to the poller thread
#[derive(Debug)]
pub enum BridgeCommand {
    Watch(String),
}

/// Results from the poller thread
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Poll(PollEvent),
    ModelCached { job_id: String, path: PathBuf },
    DownloadFailed { job_id: String, message: String },
}

impl BridgeEvent {
    pub fn job_id(&self) -> &str {
        match self {
            BridgeEvent::Poll(e) => &e.job_id,
            BridgeEvent::ModelCached { job_id, .. } => job_id,
            BridgeEvent::DownloadFailed { job_id, .. } => job_id,
        }
    }
}

/// Events waiting to be applied
#[derive(Resource, Default, Clone)]
pub struct PendingEvents(pub Arc<Mutex<Vec<BridgeEvent>>>);

impl PendingEvents {
    fn push(&self, event: BridgeEvent) {
        if let Ok(mut queue) = self.0.lock() {
            queue.push(event);
        }
    }
}

/// Handle for sending commands to the poller thread
#[derive(Resource)]
pub struct Bridge {
    commands: mpsc::UnboundedSender<BridgeCommand>,
}

impl Bridge {
    pub fn send(&self, command: BridgeCommand) {
        if self.commands.send(command).is_err() {
            warn!("Poller thread is gone");
        }
    }
}

/// Start the poller thread
pub fn spawn_bridge(config: &Config) -> anyhow::Result<(Bridge, PendingEvents)> {
    let api = ApiClient::new(&config.api.base_url, config.request_timeout())?;
    let api = Arc::new(api);
    let poller_config = config.to_poller_config();
    let cache_dir = PathBuf::from(&config.models.cache_dir);
    let pending = PendingEvents::default();
    let (tx, rx) = mpsc::unbounded_channel();

    let queue = pending.clone();
    std::thread::Builder::new()
        .name("fengshui-poller".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start poller runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(run_bridge(api, poller_config, cache_dir, rx, queue));
        })?;

    Ok((Bridge { commands: tx }, pending))
}

async fn run_bridge(
    api: Arc<ApiClient>,
    config: fengshui_client::PollerConfig,
    cache_dir: PathBuf,
    mut commands: mpsc::UnboundedReceiver<BridgeCommand>,
    queue: PendingEvents,
) {
    let (poll_tx, mut poll_rx) = mpsc::unbounded_channel::<PollEvent>();
    let sink: EventSink = Arc::new(move |event| {
        let _ = poll_tx.send(event);
    });
    let mut supervisor = PollerSupervisor::new(api.clone(), api.base_url(), config, sink);
    info!(api = %api.base_url(), "Poller thread started");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(BridgeCommand::Watch(job_id)) => supervisor.watch(Some(&job_id)),
                // App closed
                None => break,
            },
            Some(event) = poll_rx.recv() => {
                if !supervisor.accept(&event) {
                    debug!(job_id = %event.job_id, "Dropping event from a replaced job");
                    continue;
                }
                if let PollUpdate::Completed { filename, .. } = &event.update {
                    let api = api.clone();
                    let queue = queue.clone();
                    let cache_dir = cache_dir.clone();
                    let job_id = event.job_id.clone();
                    let filename = filename.clone();
                    tokio::spawn(async move {
                        let event = match api.download_model(&filename, &cache_dir).await {
                            Ok(path) => BridgeEvent::ModelCached { job_id, path },
                            Err(e) => BridgeEvent::DownloadFailed {
                                job_id,
                                message: e.to_string(),
                            },
                        };
                        queue.push(event);
                    });
                }
                queue.push(BridgeEvent::Poll(event));
            }
        }
    }

    supervisor.stop();
    info!("Poller thread stopped");
}

/// Apply queued poller results to the scene
pub fn process_bridge_events(
    pending: Res<PendingEvents>,
    mut job: ResMut<ModelJobDisplay>,
    mut room: ResMut<RoomModel>,
) {
    let events = match pending.0.lock() {
        Ok(mut queue) => std::mem::take(&mut *queue),
        Err(_) => return,
    };

    for event in events {
        if job.job_id.as_deref() != Some(event.job_id()) {
            continue;
        }

        match event {
            BridgeEvent::Poll(PollEvent { update, .. }) => match update {
                PollUpdate::Status(status) => job.status = Some(status),
                PollUpdate::Completed { url, .. } => {
                    info!(url = %url, "Model generation complete");
                    job.status = Some(JobStatus::Completed);
                    job.download_url = Some(url);
                }
                PollUpdate::Failed { message } => {
                    warn!(error = %message, "Model generation failed");
                    job.status = Some(JobStatus::Failed);
                    job.message = Some(message);
                }
            },
            BridgeEvent::ModelCached { path, .. } => match std::fs::canonicalize(&path) {
                Ok(path) => room.request(path.to_string_lossy()),
                Err(e) => job.message = Some(format!("Model file unavailable: {}", e)),
            },
            BridgeEvent::DownloadFailed { message, .. } => {
                warn!(error = %message, "Model download failed");
                job.message = Some(format!("Download failed: {}", message));
            }
        }
    }
}
