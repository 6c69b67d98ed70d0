//! Job reports for terminal and JSON output.

mod generator;

pub use generator::{generate_json_report, generate_text_report};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Job, JobId, JobKind, JobResult, JobStatus};

/// Report metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<JobKind>,
    /// Parent job of a CATE follow-up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<JobId>,
    pub service_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    pub reported_at: DateTime<Utc>,
    /// Seconds between submission and the report, when submitted by this process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

/// What is known about a job at the time it is reported.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub metadata: ReportMetadata,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl JobReport {
    /// Report on a job's status alone.
    pub fn from_status(job: &Job, status: JobStatus, service_url: &str) -> Self {
        let reported_at = Utc::now();
        let duration_seconds = job
            .submitted_at()
            .map(|t| (reported_at - t).num_milliseconds().max(0) as f64 / 1000.0);

        Self {
            metadata: ReportMetadata {
                job_id: job.id().clone(),
                kind: job.kind(),
                parent: None,
                service_url: service_url.to_string(),
                submitted_at: job.submitted_at(),
                reported_at,
                duration_seconds,
            },
            status,
            result: None,
        }
    }

    /// Report on a completed job with its result text.
    pub fn from_result(job: &Job, result: &JobResult, service_url: &str) -> Self {
        let mut report = Self::from_status(job, JobStatus::Done, service_url);
        report.metadata.reported_at = result.retrieved_at;
        report.result = Some(result.text.clone());
        report
    }

    /// Mark the report as a follow-up of `parent`.
    pub fn with_parent(mut self, parent: &JobId) -> Self {
        self.metadata.parent = Some(parent.clone());
        self
    }
}
