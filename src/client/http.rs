//! HTTP layer: endpoint URLs, authentication and status mapping.
//!
//! This is the only place that interprets HTTP status codes; the job
//! client above it works with [`ClientError`] kinds.

use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{Response, Url};
use tracing::debug;

use super::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// User agent for service requests.
pub const USER_AGENT_VALUE: &str = concat!("pcats-client/", env!("CARGO_PKG_VERSION"));

/// HTTP backend (holds the reqwest client, base URL and credentials).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub(crate) fn new(config: &ClientConfig) -> ClientResult<Self> {
        let base_url = Url::parse(config.base_url.trim()).map_err(|e| ClientError::Config {
            message: format!("invalid service URL '{}': {}", config.base_url, e),
        })?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::Config {
                message: format!("service URL must be http(s): {}", config.base_url),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30).min(config.request_timeout))
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| ClientError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
        })
    }

    pub(crate) fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `{base}/{segments...}`, percent-encoding each segment.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// POST a multipart form. `job_id` names the job the endpoint is keyed by, if any.
    pub(crate) async fn post_form(
        &self,
        url: Url,
        form: Form,
        job_id: Option<&str>,
    ) -> ClientResult<Response> {
        debug!(url = %url, "POST");
        let request = self.authorize(self.client.post(url)).multipart(form);
        let response = request.send().await?;
        check_status(response, job_id).await
    }

    /// GET an endpoint keyed by `job_id`.
    pub(crate) async fn get(&self, url: Url, job_id: &str) -> ClientResult<Response> {
        debug!(url = %url, "GET");
        let response = self.authorize(self.client.get(url)).send().await?;
        check_status(response, Some(job_id)).await
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Map non-success statuses onto client errors.
async fn check_status(response: Response, job_id: Option<&str>) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        body.trim().to_string()
    };

    debug!(status = status.as_u16(), message = %message, "request failed");

    Err(match (status.as_u16(), job_id) {
        (400 | 422, _) => {
            ClientError::validation("request", format!("rejected by service: {}", message))
        }
        (401 | 403, _) => ClientError::Unauthorized { message },
        (404, Some(id)) => ClientError::UnknownJob {
            job_id: id.to_string(),
        },
        (409 | 425, Some(id)) => ClientError::NotReady {
            job_id: id.to_string(),
            state: message,
        },
        _ => ClientError::Http {
            status: status.as_u16(),
            message,
        },
    })
}
