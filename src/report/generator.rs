//! Report rendering.
//!
//! The text form mirrors what a user of the service sees in an analysis
//! session: the job id, its status and the formatted result.

use super::{JobReport, ReportMetadata};
use crate::models::JobStatus;

/// Generate a plain-text report.
pub fn generate_text_report(report: &JobReport) -> String {
    let mut output = String::new();

    output.push_str(&generate_header(&report.metadata));
    output.push_str(&generate_status_line(&report.status));

    if let Some(ref text) = report.result {
        output.push('\n');
        output.push_str(text.trim_end());
        output.push('\n');
    }

    output
}

fn generate_header(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str(&format!("JobID: {}\n", metadata.job_id));
    if let Some(kind) = metadata.kind {
        section.push_str(&format!("Kind: {}\n", kind));
    }
    if let Some(ref parent) = metadata.parent {
        section.push_str(&format!("Parent: {}\n", parent));
    }
    if let Some(submitted_at) = metadata.submitted_at {
        section.push_str(&format!(
            "Submitted: {}\n",
            submitted_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    if let Some(duration) = metadata.duration_seconds {
        section.push_str(&format!("Elapsed: {:.1}s\n", duration));
    }

    section
}

fn generate_status_line(status: &JobStatus) -> String {
    match status {
        JobStatus::Failed {
            state,
            message: Some(message),
        } => format!("Status: {}\nError: {}\n", state, message),
        other => format!("Status: {}\n", other.state()),
    }
}

/// Generate a JSON report.
pub fn generate_json_report(report: &JobReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}
