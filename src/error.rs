//! Error types for the job client.

use std::time::Duration;

/// Job client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Malformed or missing request field, detected locally or rejected by the service.
    #[error("invalid request: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Transport failure while submitting a job. Never retried.
    #[error("submission failed: {message}")]
    Submission { message: String },

    /// The service reported a terminal failure for the job.
    #[error("job {job_id} failed with status {state}{}", .message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    Job {
        job_id: String,
        state: String,
        message: Option<String>,
    },

    /// Result requested before the job reached `Done`.
    #[error("job {job_id} is not ready (status {state})")]
    NotReady { job_id: String, state: String },

    /// Polling exceeded the allotted duration. The remote job keeps running.
    #[error("timed out after {waited:?} waiting for job {job_id}")]
    Timeout { job_id: String, waited: Duration },

    /// The service does not know the job id.
    #[error("unknown job: {job_id}")]
    UnknownJob { job_id: String },

    /// Credentials missing, invalid or expired.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Network error (connect, timeout, reset).
    #[error("network error: {message}")]
    Network { message: String },

    /// Unexpected HTTP status from the service.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body could not be understood.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Local file could not be written.
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// Client configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ClientError {
    /// Shorthand for a validation failure on `field`.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // The job ran (or is running) but did not produce a usable result
            Self::Job { .. } => 2,
            Self::NotReady { .. } => 2,
            Self::Timeout { .. } => 2,

            _ => 1,
        }
    }

    /// Reclassify a transport-level failure as a submission failure.
    pub(crate) fn into_submission(self) -> Self {
        match self {
            Self::Network { message } => Self::Submission { message },
            Self::Http { status, message } => Self::Submission {
                message: format!("HTTP {}: {}", status, message),
            },
            other => other,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::Network {
            message: "reset".to_string()
        }
        .is_retryable());
        assert!(ClientError::Http {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(ClientError::Http {
            status: 429,
            message: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Http {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!ClientError::validation("burn_num", "must be positive").is_retryable());
        assert!(!ClientError::Submission {
            message: "refused".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_into_submission() {
        let err = ClientError::Network {
            message: "connection refused".to_string(),
        }
        .into_submission();
        assert!(matches!(err, ClientError::Submission { ref message } if message == "connection refused"));

        let err = ClientError::Http {
            status: 502,
            message: "bad gateway".to_string(),
        }
        .into_submission();
        assert!(matches!(err, ClientError::Submission { ref message } if message.contains("502")));

        let err = ClientError::validation("outcome", "empty").into_submission();
        assert!(matches!(err, ClientError::Validation { .. }));
    }

    #[test]
    fn test_job_error_display() {
        let err = ClientError::Job {
            job_id: "abc".to_string(),
            state: "Error".to_string(),
            message: Some("MCMC diverged".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "job abc failed with status Error: MCMC diverged"
        );

        let err = ClientError::Job {
            job_id: "abc".to_string(),
            state: "Error".to_string(),
            message: None,
        };
        assert_eq!(err.to_string(), "job abc failed with status Error");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            ClientError::Timeout {
                job_id: "x".to_string(),
                waited: Duration::from_secs(2)
            }
            .exit_code(),
            2
        );
        assert_eq!(ClientError::validation("x", "y").exit_code(), 1);
    }
}
