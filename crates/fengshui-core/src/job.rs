//! Background 3D model generation job tracking
//!
//! The server drives the job through `pending -> processing -> completed | failed`.
//! The client only observes; [`ModelJob::apply`] folds status responses into
//! local state and refuses to move backwards or out of a terminal state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message surfaced when a failed job carries no error text
pub const DEFAULT_FAILURE_MESSAGE: &str = "Model generation failed";

#[derive(Error, Debug, PartialEq)]
pub enum JobError {
    #[error("Job {id} already reached terminal status {status:?}")]
    AlreadyTerminal { id: String, status: JobStatus },
}

/// Job status as reported by the status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Position in the forward-only lifecycle
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Initializing 3D...",
            JobStatus::Processing => "Generating 3D model...",
            JobStatus::Completed => "3D model ready",
            JobStatus::Failed => "3D generation failed",
        }
    }
}

/// Body of `GET /models/status/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of folding one status response into a job
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    /// Same non-terminal status as before
    Unchanged,
    /// Moved forward to a non-terminal status
    Advanced(JobStatus),
    /// Server reported completion but no filename yet; keep observing
    AwaitingFilename,
    Completed { filename: String },
    Failed { message: String },
    /// Response would move the job backwards and was discarded
    Regressed { reported: JobStatus },
}

impl JobTransition {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobTransition::Completed { .. } | JobTransition::Failed { .. })
    }
}

/// Client-side view of a model generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelJob {
    pub id: String,
    pub status: JobStatus,
    pub result_filename: Option<String>,
    pub error_message: Option<String>,
}

impl ModelJob {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            result_filename: None,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold a status response into this job
    pub fn apply(&mut self, response: &StatusResponse) -> Result<JobTransition, JobError> {
        if self.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                id: self.id.clone(),
                status: self.status,
            });
        }

        if response.status.rank() < self.status.rank() {
            return Ok(JobTransition::Regressed {
                reported: response.status,
            });
        }

        match response.status {
            JobStatus::Completed => {
                match response.filename.as_deref().filter(|f| !f.is_empty()) {
                    Some(filename) => {
                        self.status = JobStatus::Completed;
                        self.result_filename = Some(filename.to_string());
                        Ok(JobTransition::Completed {
                            filename: filename.to_string(),
                        })
                    }
                    None => Ok(JobTransition::AwaitingFilename),
                }
            }
            JobStatus::Failed => {
                let message = response
                    .error
                    .as_deref()
                    .filter(|e| !e.is_empty())
                    .unwrap_or(DEFAULT_FAILURE_MESSAGE)
                    .to_string();
                self.status = JobStatus::Failed;
                self.error_message = Some(message.clone());
                Ok(JobTransition::Failed { message })
            }
            status if status == self.status => Ok(JobTransition::Unchanged),
            status => {
                self.status = status;
                Ok(JobTransition::Advanced(status))
            }
        }
    }

    /// Download URL of the finished model
    pub fn download_url(&self, api_base: &str) -> Option<String> {
        self.result_filename
            .as_deref()
            .map(|f| model_download_url(api_base, f))
    }
}

/// `{api_base}/models/status/{model_id}`
pub fn model_status_url(api_base: &str, model_id: &str) -> String {
    format!(
        "{}/models/status/{}",
        api_base.trim_end_matches('/'),
        model_id
    )
}

/// `{api_base}/models/{filename}`
pub fn model_download_url(api_base: &str, filename: &str) -> String {
    format!("{}/models/{}", api_base.trim_end_matches('/'), filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobStatus::*;

    fn apply(
        job: &mut ModelJob,
        status: JobStatus,
        filename: Option<&str>,
        error: Option<&str>,
    ) -> Result<JobTransition, JobError> {
        job.apply(&StatusResponse {
            status,
            filename: filename.map(String::from),
            error: error.map(String::from),
        })
    }

    #[test]
    fn test_forward_lifecycle() {
        let mut job = ModelJob::new("job-1");
        let t = apply(&mut job, Pending, None, None).unwrap();
        assert_eq!(t, JobTransition::Unchanged);
        let t = apply(&mut job, Processing, None, None).unwrap();
        assert_eq!(t, JobTransition::Advanced(Processing));

        let t = apply(&mut job, Completed, Some("room.glb"), None).unwrap();
        assert_eq!(
            t,
            JobTransition::Completed {
                filename: "room.glb".to_string()
            }
        );
        assert!(job.is_terminal());
        assert_eq!(
            job.download_url("http://localhost:8000/").as_deref(),
            Some("http://localhost:8000/models/room.glb")
        );
    }

    #[test]
    fn test_completed_without_filename_keeps_waiting() {
        let mut job = ModelJob::new("job-2");
        let t = apply(&mut job, Completed, Some(""), None).unwrap();
        assert_eq!(t, JobTransition::AwaitingFilename);
        assert!(!job.is_terminal());
        assert!(job.download_url("http://x").is_none());
    }

    #[test]
    fn test_failed_uses_server_message() {
        let mut job = ModelJob::new("job-3");
        let t = apply(&mut job, Failed, None, Some("X")).unwrap();
        assert_eq!(
            t,
            JobTransition::Failed {
                message: "X".to_string()
            }
        );
        assert_eq!(job.error_message.as_deref(), Some("X"));
    }

    #[test]
    fn test_failed_fallback_message() {
        let mut job = ModelJob::new("job-4");
        let t = apply(&mut job, Failed, None, None).unwrap();
        assert_eq!(
            t,
            JobTransition::Failed {
                message: DEFAULT_FAILURE_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn test_regression_is_ignored() {
        let mut job = ModelJob::new("job-5");
        apply(&mut job, Processing, None, None).unwrap();
        let t = apply(&mut job, Pending, None, None).unwrap();
        assert_eq!(t, JobTransition::Regressed { reported: Pending });
        assert_eq!(job.status, Processing);
    }

    #[test]
    fn test_terminal_is_final() {
        let mut job = ModelJob::new("job-6");
        apply(&mut job, Failed, None, Some("boom")).unwrap();
        let err = apply(&mut job, Completed, Some("late.glb"), None).unwrap_err();
        assert!(matches!(err, JobError::AlreadyTerminal { .. }));
        assert!(job.result_filename.is_none());
    }

    #[test]
    fn test_status_wire_format() {
        let r: StatusResponse =
            serde_json::from_str(r#"{"status":"completed","filename":"a.fbx"}"#).unwrap();
        assert_eq!(r.status, Completed);
        assert_eq!(r.filename.as_deref(), Some("a.fbx"));
        assert!(r.error.is_none());
    }
}
