//! Job client for the PCATS service.
//!
//! [`JobClient`] owns the submit → poll → retrieve lifecycle. It keeps no
//! state of its own beyond the HTTP connection pool; per-job state lives in
//! the [`Job`] handle the caller holds.

mod form;
mod http;

pub use http::USER_AGENT_VALUE;

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::models::{Job, JobId, JobKind, JobResult, JobStatus};
use crate::poll::{poll_until, PollPolicy};
use crate::request::{AnalysisRequest, CateRequest, DynamicRequest, StaticRequest};
use http::HttpBackend;

/// Default service endpoint.
pub const DEFAULT_BASE_URL: &str = "https://pcats.research.cchmc.org/api";

/// Connection settings for the service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Bearer token sent with every request, if set.
    pub token: Option<String>,
    /// Timeout for a single HTTP request (uploads included).
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ClientConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "job_id", alias = "jobId")]
    jobid: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default, alias = "error", alias = "detail")]
    message: Option<String>,
}

/// Client for submitting and tracking analysis jobs.
#[derive(Debug, Clone)]
pub struct JobClient {
    http: HttpBackend,
}

impl JobClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = HttpBackend::new(&config)?;
        debug!(url = %http.base_url(), "job client ready");
        Ok(Self { http })
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url().as_str()
    }

    /// Submit a single-stage analysis.
    pub async fn submit_static(&self, request: &StaticRequest) -> ClientResult<Job> {
        request.validate()?;
        let form = form::build_form(request.form_fields(), &request.attachments()).await?;
        self.submit_form(self.http.endpoint(&["staticgp"]), form, JobKind::Static)
            .await
    }

    /// Submit a two-stage analysis.
    pub async fn submit_dynamic(&self, request: &DynamicRequest) -> ClientResult<Job> {
        request.validate()?;
        let form = form::build_form(request.form_fields(), &request.attachments()).await?;
        self.submit_form(self.http.endpoint(&["dynamicgp"]), form, JobKind::Dynamic)
            .await
    }

    pub async fn submit(&self, request: &AnalysisRequest) -> ClientResult<Job> {
        match request {
            AnalysisRequest::Static(r) => self.submit_static(r).await,
            AnalysisRequest::Dynamic(r) => self.submit_dynamic(r).await,
        }
    }

    /// Submit a CATE follow-up on a completed static job.
    ///
    /// The parent's status is refreshed once if it is not yet known to be
    /// terminal; anything other than `Done` is a validation error.
    pub async fn submit_cate(&self, parent: &mut Job, contrast: &CateRequest) -> ClientResult<Job> {
        contrast.validate()?;

        if matches!(parent.kind(), Some(JobKind::Dynamic | JobKind::Cate)) {
            return Err(ClientError::validation(
                "jobid",
                format!(
                    "CATE follow-ups need a static job, {} is a {} job",
                    parent.id(),
                    parent.kind().map(|k| k.to_string()).unwrap_or_default()
                ),
            ));
        }

        let status = self.status(parent).await?;
        if !status.is_done() {
            return Err(ClientError::validation(
                "jobid",
                format!(
                    "job {} has status {}; CATE requires a Done job",
                    parent.id(),
                    status
                ),
            ));
        }

        let form = form::build_form(contrast.form_fields(), &[]).await?;
        let url = self
            .http
            .endpoint(&["job", parent.id().as_str(), "staticgp_cate"]);

        self.submit_form_for(url, form, JobKind::Cate, Some(parent.id()))
            .await
            .map_err(|e| match e {
                ClientError::NotReady { job_id, state } => ClientError::validation(
                    "jobid",
                    format!("service reports job {} not ready: {}", job_id, state),
                ),
                other => other,
            })
    }

    /// Query the job's status once and record it on the handle.
    ///
    /// A job already known to be terminal is answered locally.
    pub async fn status(&self, job: &mut Job) -> ClientResult<JobStatus> {
        if let Some(status) = job.last_status().filter(|s| s.is_terminal()) {
            return Ok(status.clone());
        }

        let status = self.fetch_status(job.id()).await?;
        job.record(status.clone());
        Ok(status)
    }

    /// Wait until the job reaches a terminal status.
    ///
    /// `Ok` is always [`JobStatus::Done`]; a failed job surfaces as
    /// [`ClientError::Job`] with the service's raw state. Calling this again
    /// on a settled job returns immediately without polling.
    pub async fn wait_for_result(
        &self,
        job: &mut Job,
        policy: &PollPolicy,
    ) -> ClientResult<JobStatus> {
        if let Some(outcome) = job.settled_outcome() {
            debug!(job = %job.id(), "job already settled, not polling");
            return outcome;
        }

        info!(
            job = %job.id(),
            timeout_secs = policy.timeout.as_secs(),
            "waiting for job"
        );

        let id = job.id().clone();
        let status = poll_until(&id, policy, || self.fetch_status(&id)).await?;
        job.record(status);

        job.settled_outcome().unwrap_or_else(|| {
            Err(ClientError::InvalidResponse {
                message: format!("job {} settled without a terminal status", id),
            })
        })
    }

    /// Retrieve the formatted result of a `Done` job.
    pub async fn fetch_result(&self, job: &mut Job) -> ClientResult<JobResult> {
        let status = self.status(job).await?;
        if !status.is_done() {
            return Err(ClientError::NotReady {
                job_id: job.id().to_string(),
                state: status.to_string(),
            });
        }

        let url = self.http.endpoint(&["job", job.id().as_str(), "print"]);
        let response = self.http.get(url, job.id().as_str()).await?;
        let text = response.text().await?;

        debug!(job = %job.id(), bytes = text.len(), "fetched result");

        Ok(JobResult {
            job_id: job.id().clone(),
            text,
            retrieved_at: Utc::now(),
        })
    }

    async fn submit_form(
        &self,
        url: reqwest::Url,
        form: reqwest::multipart::Form,
        kind: JobKind,
    ) -> ClientResult<Job> {
        self.submit_form_for(url, form, kind, None).await
    }

    async fn submit_form_for(
        &self,
        url: reqwest::Url,
        form: reqwest::multipart::Form,
        kind: JobKind,
        parent: Option<&JobId>,
    ) -> ClientResult<Job> {
        info!(kind = %kind, parent = ?parent.map(JobId::as_str), "submitting job");

        let response = self
            .http
            .post_form(url, form, parent.map(JobId::as_str))
            .await
            .map_err(ClientError::into_submission)?;

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Submission {
                message: format!("failed to read submission response: {}", e),
            })?;
        let parsed: SubmitResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse {
                message: format!("failed to parse submission response: {}", e),
            })?;
        let id = JobId::new(parsed.jobid).map_err(|_| ClientError::InvalidResponse {
            message: "service returned an empty job id".to_string(),
        })?;

        info!(job = %id, kind = %kind, "job submitted");
        Ok(Job::submitted(id, kind))
    }

    async fn fetch_status(&self, id: &JobId) -> ClientResult<JobStatus> {
        let url = self.http.endpoint(&["job", id.as_str(), "status"]);
        let response = self.http.get(url, id.as_str()).await?;
        let body = response.text().await?;
        parse_status(&body)
    }
}

/// Parse a status body: JSON `{"status": ..}` or a bare state word.
fn parse_status(body: &str) -> ClientResult<JobStatus> {
    if let Ok(parsed) = serde_json::from_str::<StatusResponse>(body) {
        return Ok(JobStatus::from_remote(&parsed.status, parsed.message));
    }

    let word = body.trim().trim_matches('"');
    let is_bare_word = !word.is_empty()
        && word.len() <= 32
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if is_bare_word {
        return Ok(JobStatus::from_remote(word, None));
    }

    Err(ClientError::InvalidResponse {
        message: format!("unrecognised status response: {}", truncate(body, 120)),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
