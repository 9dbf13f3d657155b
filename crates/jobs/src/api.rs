//! REST client for the backend `/jobs` endpoints.
//!
//! Starts background jobs and fetches their step log using [`reqwest`].
//! The status query sits behind [`JobStatusSource`] so the poll loop
//! can be driven by something other than HTTP in tests.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use gsadmin_channel::probe::http_base;
use gsadmin_core::{JobId, JobKind, JobStatus, Timestamp};

/// Errors from the `/jobs` API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Jobs API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response with `success: false`, or one missing the
    /// expected payload.
    #[error("Jobs API rejected the request: {0}")]
    Rejected(String),
}

/// One entry of a job's append-only step log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

/// Job as returned by `GET /jobs/{jobId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    /// Completed steps, oldest first.
    #[serde(default)]
    pub progress: Vec<ProgressEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartJobResponse {
    success: bool,
    #[serde(default)]
    job_id: Option<JobId>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    success: bool,
    #[serde(default)]
    job: Option<JobRecord>,
    #[serde(default)]
    message: Option<String>,
}

/// Anything that can answer "what is the state of this job right now".
#[async_trait]
pub trait JobStatusSource: Send + Sync + 'static {
    async fn job_status(&self, job_id: &JobId) -> Result<JobRecord, ApiError>;
}

/// HTTP client for the backend jobs API.
pub struct JobsApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl JobsApi {
    /// * `base_url` - Backend URL, e.g. `http://fleet.local:3001`.
    ///   `ws://`/`wss://` URLs are accepted and mapped to HTTP.
    /// * `token` - Bearer token sent with every request. May be empty.
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: &str, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: http_base(base_url),
            token: token.into(),
        }
    }

    /// Start a background job.
    ///
    /// Sends `POST /jobs` with `{ kind, params }` and returns the
    /// server-assigned job id.
    pub async fn start_job(
        &self,
        kind: JobKind,
        params: &serde_json::Value,
    ) -> Result<JobId, ApiError> {
        let body = serde_json::json!({
            "kind": kind,
            "params": params,
        });

        let response = self
            .authorized(self.client.post(format!("{}/jobs", self.base_url)))
            .json(&body)
            .send()
            .await?;

        let parsed: StartJobResponse = Self::parse_response(response).await?;
        match parsed {
            StartJobResponse {
                success: true,
                job_id: Some(job_id),
                ..
            } => {
                tracing::info!(job_id = %job_id, kind = %kind, "Job started");
                Ok(job_id)
            }
            StartJobResponse { message, .. } => Err(ApiError::Rejected(
                message.unwrap_or_else(|| "no job id returned".to_string()),
            )),
        }
    }

    /// Fetch the current state of a job.
    ///
    /// Sends `GET /jobs/{jobId}`.
    pub async fn get_job(&self, job_id: &JobId) -> Result<JobRecord, ApiError> {
        let response = self
            .authorized(
                self.client
                    .get(format!("{}/jobs/{}", self.base_url, job_id)),
            )
            .send()
            .await?;

        let parsed: JobStatusResponse = Self::parse_response(response).await?;
        match parsed {
            JobStatusResponse {
                success: true,
                job: Some(job),
                ..
            } => Ok(job),
            JobStatusResponse { message, .. } => Err(ApiError::Rejected(
                message.unwrap_or_else(|| format!("job {job_id} not found")),
            )),
        }
    }

    // ---- private helpers ----

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.header(AUTHORIZATION, format!("Bearer {}", self.token))
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl JobStatusSource for JobsApi {
    async fn job_status(&self, job_id: &JobId) -> Result<JobRecord, ApiError> {
        self.get_job(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_record_parses_step_log() {
        let json = r#"{
            "id": "J1",
            "status": "running",
            "progress": [
                {"message": "Allocating nodes", "timestamp": "2026-03-01T10:00:00Z"},
                {"message": "Installing runtime"}
            ]
        }"#;
        let record: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id.as_str(), "J1");
        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(record.progress.len(), 2);
        assert!(record.progress[0].timestamp.is_some());
        assert!(record.progress[1].timestamp.is_none());
        assert!(record.error.is_none());
    }

    #[test]
    fn status_response_without_job_parses() {
        let json = r#"{"success": false, "message": "not found"}"#;
        let parsed: JobStatusResponse = serde_json::from_str(json).unwrap();
        assert!(!parsed.success);
        assert!(parsed.job.is_none());
        assert_eq!(parsed.message.as_deref(), Some("not found"));
    }

    #[test]
    fn base_url_is_normalised() {
        let api = JobsApi::new("ws://fleet.local:3001/", "");
        assert_eq!(api.base_url, "http://fleet.local:3001");
    }
}
