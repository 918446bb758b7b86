//! Remote job lifecycle: upload, submit, poll, download.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::api::{reason, status, RemoteApi};
use crate::error::{RemoteError, Result};
use crate::progress::{JobProgress, ProgressDisplay};

/// Where a job stands, as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Uploaded { href: String },
    Queued,
    Running,
    Ready,
    Failed,
    /// Any other non-terminal status the server reports.
    Other(String),
}

impl JobState {
    /// State for a server status, compared case-insensitively.
    pub fn from_status(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "queued" => JobState::Queued,
            "running" => JobState::Running,
            "ready" => JobState::Ready,
            "failed" => JobState::Failed,
            other => JobState::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Ready | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => write!(f, "idle"),
            JobState::Uploaded { .. } => write!(f, "uploaded"),
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Ready => write!(f, "ready"),
            JobState::Failed => write!(f, "failed"),
            JobState::Other(s) => write!(f, "{}", s),
        }
    }
}

/// What a finished job left behind.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub id: Option<String>,
    pub output: PathBuf,
    pub bytes: u64,
    /// Every state the job went through, each recorded once per change.
    pub transitions: Vec<JobState>,
}

/// Drives one job through the remote server.
pub struct RemoteJobClient {
    api: RemoteApi,
    poll_interval: Duration,
    show_progress: bool,
}

impl RemoteJobClient {
    pub fn new(api: RemoteApi) -> Self {
        Self {
            api,
            poll_interval: Duration::from_secs(5),
            show_progress: true,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn api(&self) -> &RemoteApi {
        &self.api
    }

    /// Upload `input`, submit `job_config`, wait for the job and download
    /// its result to `output`.
    ///
    /// Polling happens at a fixed interval until the job is ready or has
    /// failed. Transient HTTP failures are retried by the transport.
    #[instrument(skip(self, job_config), fields(input = %input.display()))]
    pub async fn run(&self, input: &Path, output: &Path, job_config: &Value) -> Result<JobOutcome> {
        let mut transitions = vec![JobState::Idle];

        info!("Uploading input file to remote server");
        let (code, reply) = self.api.upload(input).await?;
        if !(200..300).contains(&code) {
            return Err(RemoteError::Rejected {
                action: "upload",
                status: format!("HTTP {}", code),
                reason: reason(&reply),
            });
        }
        if status(&reply) != "success" {
            return Err(rejected("upload", &reply));
        }
        let href = href(&reply, "upload")?;
        transitions.push(JobState::Uploaded { href: href.clone() });

        let reply = self.api.submit(&href, job_config).await?;
        info!("Inference request submitted");
        if status(&reply) != "queued" {
            return Err(rejected("submit", &reply));
        }
        let id = reply.get("id").map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        info!(id = id.as_deref().unwrap_or("?"), "Request is queued");

        let mut state = JobState::Queued;
        transitions.push(state.clone());
        let mut href = self::href(&reply, "submit")?;
        let mut display = ProgressDisplay::new(self.show_progress);

        loop {
            let reply = self.api.poll(&href).await?;
            if let Some(next) = reply.get("href").and_then(Value::as_str) {
                href = next.to_string();
            }
            let next = JobState::from_status(status(&reply));

            match next {
                JobState::Ready => {
                    display.finish();
                    info!("Request is ready");
                    transitions.push(JobState::Ready);
                    break;
                }
                JobState::Failed => {
                    display.finish();
                    let reason = reason(&reply);
                    error!(reason = reason.as_deref().unwrap_or(""), "Request failed");
                    transitions.push(JobState::Failed);
                    return Err(RemoteError::JobFailed { reason });
                }
                next if next != state => {
                    info!(status = %next, "Request status changed");
                    transitions.push(next.clone());
                    state = next;
                }
                _ => {}
            }

            if let Some(progress) = reply.get("progress").filter(|p| !p.is_null()) {
                match serde_json::from_value::<JobProgress>(progress.clone()) {
                    Ok(progress) => display.update(&progress),
                    Err(e) => debug!(error = %e, "Ignoring malformed progress block"),
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        let bytes = self.api.download(&href, output).await?;
        debug!(path = %output.display(), "Result written");

        Ok(JobOutcome {
            id,
            output: output.to_path_buf(),
            bytes,
            transitions,
        })
    }
}

fn rejected(action: &'static str, reply: &Value) -> RemoteError {
    RemoteError::Rejected {
        action,
        status: status(reply).to_string(),
        reason: reason(reply),
    }
}

fn href(reply: &Value, action: &'static str) -> Result<String> {
    reply
        .get("href")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::Rejected {
            action,
            status: format!("{} reply has no href", action),
            reason: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_case_insensitive() {
        assert_eq!(JobState::from_status("READY"), JobState::Ready);
        assert_eq!(JobState::from_status("Running"), JobState::Running);
        assert_eq!(
            JobState::from_status("Pending"),
            JobState::Other("pending".into())
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Ready.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Other("pending".into()).is_terminal());
    }
}
