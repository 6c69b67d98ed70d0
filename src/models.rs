//! Data models for jobs and their results.
//!
//! A [`Job`] is the client's only local state for a remote computation:
//! its identifier and the last status observed from the service.

use crate::error::{ClientError, ClientResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque job identifier returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a job id, rejecting empty or blank identifiers.
    pub fn new(id: impl Into<String>) -> ClientResult<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(ClientError::validation("jobid", "job id must not be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of analysis a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Static,
    Dynamic,
    Cate,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Static => write!(f, "static"),
            JobKind::Dynamic => write!(f, "dynamic"),
            JobKind::Cate => write!(f, "CATE"),
        }
    }
}

/// Status of a remote job.
///
/// The raw state string reported by the service is kept so callers can
/// show more than a generic "Error".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    /// Not finished yet (queued, running, ...).
    Pending { state: String },
    /// Finished successfully; the result can be fetched.
    Done,
    /// Finished with a failure.
    Failed {
        state: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Service states that mean the job is still in progress.
const IN_PROGRESS_STATES: &[&str] = &[
    "pending",
    "queued",
    "submitted",
    "started",
    "running",
    "processing",
];

impl JobStatus {
    /// Interpret a status string reported by the service.
    ///
    /// `Done` is success, known in-progress states are pending, and any
    /// other state is a terminal failure.
    pub fn from_remote(state: &str, message: Option<String>) -> Self {
        let trimmed = state.trim();
        let lower = trimmed.to_lowercase();

        if lower == "done" {
            JobStatus::Done
        } else if IN_PROGRESS_STATES.contains(&lower.as_str()) {
            JobStatus::Pending {
                state: trimmed.to_string(),
            }
        } else {
            JobStatus::Failed {
                state: if trimmed.is_empty() {
                    "Error".to_string()
                } else {
                    trimmed.to_string()
                },
                message: message.filter(|m| !m.trim().is_empty()),
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending { .. })
    }

    pub fn is_done(&self) -> bool {
        matches!(self, JobStatus::Done)
    }

    /// The state label as the service reported it.
    pub fn state(&self) -> &str {
        match self {
            JobStatus::Pending { state } => state,
            JobStatus::Done => "Done",
            JobStatus::Failed { state, .. } => state,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Failed {
                state,
                message: Some(message),
            } => write!(f, "{} ({})", state, message),
            other => f.write_str(other.state()),
        }
    }
}

/// Handle to a submitted job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    kind: Option<JobKind>,
    submitted_at: Option<DateTime<Utc>>,
    last_status: Option<JobStatus>,
}

impl Job {
    /// A job this client just submitted.
    pub fn submitted(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind: Some(kind),
            submitted_at: Some(Utc::now()),
            last_status: None,
        }
    }

    /// Attach to an existing job by id (kind and status unknown).
    pub fn attach(id: JobId) -> Self {
        Self {
            id,
            kind: None,
            submitted_at: None,
            last_status: None,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn kind(&self) -> Option<JobKind> {
        self.kind
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn last_status(&self) -> Option<&JobStatus> {
        self.last_status.as_ref()
    }

    /// Whether a terminal status has been observed.
    pub fn is_settled(&self) -> bool {
        self.last_status.as_ref().is_some_and(JobStatus::is_terminal)
    }

    /// Record an observed status. A terminal status is never overwritten.
    pub(crate) fn record(&mut self, status: JobStatus) {
        if !self.is_settled() {
            self.last_status = Some(status);
        }
    }

    /// Convert the recorded status into the caller-facing outcome:
    /// `Done` passes through, a failure becomes [`ClientError::Job`].
    pub(crate) fn settled_outcome(&self) -> Option<ClientResult<JobStatus>> {
        match self.last_status.as_ref()? {
            JobStatus::Done => Some(Ok(JobStatus::Done)),
            JobStatus::Failed { state, message } => Some(Err(ClientError::Job {
                job_id: self.id.to_string(),
                state: state.clone(),
                message: message.clone(),
            })),
            JobStatus::Pending { .. } => None,
        }
    }
}

/// Formatted result text of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub text: String,
    pub retrieved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_rejects_blank() {
        assert!(JobId::new("").is_err());
        assert!(JobId::new("   ").is_err());
        assert_eq!(JobId::new(" 1f3a ").unwrap().as_str(), "1f3a");
    }

    #[test]
    fn test_status_from_remote() {
        assert_eq!(JobStatus::from_remote("Done", None), JobStatus::Done);
        assert_eq!(JobStatus::from_remote("done", None), JobStatus::Done);
        assert_eq!(
            JobStatus::from_remote("Pending", None),
            JobStatus::Pending {
                state: "Pending".to_string()
            }
        );
        assert!(!JobStatus::from_remote("Running", None).is_terminal());

        let failed = JobStatus::from_remote("Error", Some("bad column".to_string()));
        assert!(failed.is_terminal());
        assert!(!failed.is_done());
        assert_eq!(failed.state(), "Error");
        assert_eq!(failed.to_string(), "Error (bad column)");
    }

    #[test]
    fn test_unknown_state_is_failure_with_raw_label() {
        let status = JobStatus::from_remote("Killed", Some("  ".to_string()));
        assert_eq!(
            status,
            JobStatus::Failed {
                state: "Killed".to_string(),
                message: None
            }
        );

        let blank = JobStatus::from_remote("", None);
        assert_eq!(blank.state(), "Error");
    }

    #[test]
    fn test_terminal_status_is_not_overwritten() {
        let mut job = Job::submitted(JobId::new("j1").unwrap(), JobKind::Static);
        assert!(!job.is_settled());

        job.record(JobStatus::from_remote("Pending", None));
        assert!(!job.is_settled());

        job.record(JobStatus::Done);
        assert!(job.is_settled());

        job.record(JobStatus::from_remote("Error", None));
        assert_eq!(job.last_status(), Some(&JobStatus::Done));
    }

    #[test]
    fn test_settled_outcome() {
        let mut job = Job::attach(JobId::new("j2").unwrap());
        assert!(job.settled_outcome().is_none());

        job.record(JobStatus::from_remote("Failed", Some("oom".to_string())));
        match job.settled_outcome() {
            Some(Err(ClientError::Job { state, message, .. })) => {
                assert_eq!(state, "Failed");
                assert_eq!(message.as_deref(), Some("oom"));
            }
            other => panic!("expected job error, got {:?}", other),
        }
    }

    #[test]
    fn test_status_serializes_with_tag() {
        let json = serde_json::to_string(&JobStatus::Done).unwrap();
        assert_eq!(json, r#"{"status":"done"}"#);
    }
}
