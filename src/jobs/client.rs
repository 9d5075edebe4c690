use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::domain::identity::RepoToken;
use crate::domain::stats::RepositoryStat;

#[derive(Debug, Error)]
pub enum WorkerClientError {
    #[error("worker request failed: {0}")]
    Request(String),
    #[error("worker answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("worker returned a malformed token {0:?}")]
    BadToken(String),
}

/// Master-side view of a worker.
pub trait WorkerClient: Send + Sync {
    /// Ask the worker to analyse `url`, returning its dedup token.
    fn query(&self, url: &str) -> Result<RepoToken, WorkerClientError>;

    /// Ready results among `tokens`. Nothing ready is an empty map.
    fn check(
        &self,
        tokens: &[RepoToken],
    ) -> Result<HashMap<RepoToken, RepositoryStat>, WorkerClientError>;
}

/// Default cap on a `/check` reply body.
pub const DEFAULT_RESPONSE_LIMIT: u64 = 512 * 1024 * 1024;

/// Talks to the worker HTTP surface.
pub struct HttpWorkerClient {
    base: String,
    agent: ureq::Agent,
    response_limit: u64,
}

impl HttpWorkerClient {
    pub fn new(base: impl Into<String>) -> Self {
        let agent = ureq::config::Config::builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(30)))
            .build()
            .new_agent();
        HttpWorkerClient {
            base: base.into().trim_end_matches('/').to_string(),
            agent,
            response_limit: DEFAULT_RESPONSE_LIMIT,
        }
    }

    /// Largest `/check` body accepted, in bytes.
    pub fn with_response_limit(mut self, bytes: u64) -> Self {
        self.response_limit = bytes;
        self
    }

    fn post(&self, path: &str, body: &str) -> Result<ureq::http::Response<ureq::Body>, WorkerClientError> {
        self.agent
            .post(&format!("{}{path}", self.base))
            .header("Content-Type", "text/plain")
            .send(body)
            .map_err(|e| WorkerClientError::Request(e.to_string()))
    }
}

fn failure(response: ureq::http::Response<ureq::Body>) -> WorkerClientError {
    let status = response.status().as_u16();
    let body = response.into_body().read_to_string().unwrap_or_default();
    WorkerClientError::Status { status, body }
}

impl WorkerClient for HttpWorkerClient {
    fn query(&self, url: &str) -> Result<RepoToken, WorkerClientError> {
        let response = self.post("/query", url)?;
        if response.status().as_u16() != 200 {
            return Err(failure(response));
        }
        let text = response
            .into_body()
            .read_to_string()
            .map_err(|e| WorkerClientError::Request(e.to_string()))?;
        RepoToken::parse(&text).ok_or(WorkerClientError::BadToken(text))
    }

    fn check(
        &self,
        tokens: &[RepoToken],
    ) -> Result<HashMap<RepoToken, RepositoryStat>, WorkerClientError> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }
        let body = tokens
            .iter()
            .map(RepoToken::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let response = self.post("/check", &body)?;
        match response.status().as_u16() {
            204 => Ok(HashMap::new()),
            200 => response
                .into_body()
                .with_config()
                .limit(self.response_limit)
                .read_json()
                .map_err(|e| WorkerClientError::Request(e.to_string())),
            _ => Err(failure(response)),
        }
    }
}
