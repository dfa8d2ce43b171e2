//! Model job status polling
//!
//! A poll loop checks a job's status immediately and then once per interval
//! until the job reaches a terminal state or its [`CancellationToken`] fires.
//! Transport errors never end the loop. The token is checked before every
//! request, raced against the request and the sleep, and checked again before
//! a response is applied, so a cancelled loop never publishes anything.
//!
//! [`PollerSupervisor`] keeps at most one loop alive: watching a new job id
//! cancels the previous loop first.

use fengshui_core::job::model_download_url;
use fengshui_core::{JobStatus, JobTransition, ModelJob};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::StatusSource;

/// Bounded exponential backoff after failed checks
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound on the delay
    pub max_delay: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay, clamped to `max_delay`
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    pub interval: Duration,
    /// `None` keeps the fixed interval after failures
    pub backoff: Option<BackoffConfig>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            backoff: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollUpdate {
    /// Job moved to a new non-terminal status
    Status(JobStatus),
    Completed { filename: String, url: String },
    Failed { message: String },
}

/// Update tagged with the job it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct PollEvent {
    pub job_id: String,
    pub update: PollUpdate,
}

impl PollEvent {
    /// Whether the event belongs to the currently watched job
    pub fn is_for(&self, watched: Option<&str>) -> bool {
        watched == Some(self.job_id.as_str())
    }
}

/// How a poll loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed { filename: String, url: String },
    Failed { message: String },
    Cancelled,
}

/// Poll one job until it is terminal or `cancel` fires
pub async fn poll_job<S, F>(
    source: &S,
    api_base: &str,
    job_id: &str,
    config: &PollerConfig,
    cancel: &CancellationToken,
    mut on_event: F,
) -> PollOutcome
where
    S: StatusSource + ?Sized,
    F: FnMut(PollEvent),
{
    let mut job = ModelJob::new(job_id);
    let mut delay = config.interval;
    let mut failures = 0u32;

    info!(
        job_id = %job_id,
        interval_ms = config.interval.as_millis() as u64,
        "Polling model status"
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = source.fetch_status(job_id) => result,
        };

        if cancel.is_cancelled() {
            break;
        }

        match result {
            Ok(response) => {
                failures = 0;
                delay = config.interval;

                let emit = |update: PollUpdate| PollEvent {
                    job_id: job_id.to_string(),
                    update,
                };

                match job.apply(&response) {
                    Ok(JobTransition::Completed { filename }) => {
                        let url = model_download_url(api_base, &filename);
                        info!(job_id = %job_id, url = %url, "Model ready");
                        on_event(emit(PollUpdate::Completed {
                            filename: filename.clone(),
                            url: url.clone(),
                        }));
                        return PollOutcome::Completed { filename, url };
                    }
                    Ok(JobTransition::Failed { message }) => {
                        warn!(job_id = %job_id, error = %message, "Model generation failed");
                        on_event(emit(PollUpdate::Failed {
                            message: message.clone(),
                        }));
                        return PollOutcome::Failed { message };
                    }
                    Ok(JobTransition::Advanced(status)) => {
                        info!(job_id = %job_id, status = status.label(), "Model status changed");
                        on_event(emit(PollUpdate::Status(status)));
                    }
                    Ok(JobTransition::AwaitingFilename) => {
                        debug!(job_id = %job_id, "Completed without filename, still waiting");
                    }
                    Ok(JobTransition::Regressed { reported }) => {
                        debug!(
                            job_id = %job_id,
                            current = job.status.label(),
                            reported = reported.label(),
                            "Ignoring backwards status"
                        );
                    }
                    Ok(JobTransition::Unchanged) => {}
                    Err(e) => {
                        warn!(job_id = %job_id, error = %e, "Status applied to finished job");
                        break;
                    }
                }
            }
            Err(e) => {
                failures += 1;
                warn!(job_id = %job_id, failures, error = %e, "Status check failed, retrying");
                if let Some(backoff) = &config.backoff {
                    delay = if failures == 1 {
                        backoff.initial_delay
                    } else {
                        next_delay(delay, backoff)
                    };
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!(job_id = %job_id, "Polling stopped");
    PollOutcome::Cancelled
}

/// Callback receiving poll events
pub type EventSink = Arc<dyn Fn(PollEvent) + Send + Sync>;

struct ActivePoll {
    job_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<PollOutcome>,
}

/// Owns the single active poll loop
///
/// Must be used from within a Tokio runtime.
pub struct PollerSupervisor {
    source: Arc<dyn StatusSource>,
    api_base: String,
    config: PollerConfig,
    sink: EventSink,
    active: Option<ActivePoll>,
}

impl PollerSupervisor {
    pub fn new(
        source: Arc<dyn StatusSource>,
        api_base: impl Into<String>,
        config: PollerConfig,
        sink: EventSink,
    ) -> Self {
        Self {
            source,
            api_base: api_base.into(),
            config,
            sink,
            active: None,
        }
    }

    /// Job currently being watched
    pub fn current_job(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.job_id.as_str())
    }

    /// Watch `job_id`, or nothing when `None`
    ///
    /// Re-watching the job that is already running is a no-op.
    pub fn watch(&mut self, job_id: Option<&str>) {
        if let (Some(id), Some(active)) = (job_id, &self.active) {
            if active.job_id == id && !active.handle.is_finished() {
                return;
            }
        }

        self.stop();

        let Some(id) = job_id else {
            return;
        };

        let cancel = CancellationToken::new();
        let source = self.source.clone();
        let api_base = self.api_base.clone();
        let config = self.config.clone();
        let sink = self.sink.clone();
        let job = id.to_string();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            poll_job(source.as_ref(), &api_base, &job, &config, &token, |event| {
                // late events from a loop that lost the race with stop()
                if !token.is_cancelled() {
                    sink(event);
                }
            })
            .await
        });

        self.active = Some(ActivePoll {
            job_id: id.to_string(),
            cancel,
            handle,
        });
    }

    /// Cancel the active loop, if any
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(job_id = %active.job_id, "Cancelling poll loop");
            active.cancel.cancel();
        }
    }

    /// Whether an event should be applied
    pub fn accept(&self, event: &PollEvent) -> bool {
        event.is_for(self.current_job())
    }

    /// Wait for the active loop to end
    pub async fn join(&mut self) -> Option<PollOutcome> {
        let active = self.active.as_mut()?;
        let outcome = match (&mut active.handle).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(job_id = %active.job_id, error = %e, "Poll task aborted");
                PollOutcome::Cancelled
            }
        };
        self.active = None;
        Some(outcome)
    }
}

impl Drop for PollerSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
