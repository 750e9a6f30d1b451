//! Thin Microsoft Graph / SharePoint REST client. Callers pass the bearer
//! token per request; token lifetime is managed by the context store.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode, header};
use serde::de::DeserializeOwned;
use tracing::warn;

const MAX_RETRY_DELAY_SECS: u64 = 30;
const BASE_RETRY_DELAY_MS: u64 = 250;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Graph API error {status}: {body}")]
    Http {
        status: StatusCode,
        body: String,
        retry_after: Option<u64>,
    },
    #[error("Graph request timed out")]
    Timeout,
    #[error("Graph transport error: {0}")]
    Transport(reqwest::Error),
    #[error("failed to decode Graph response: {0}")]
    Decode(String),
}

impl GraphError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GraphError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(StatusCode::CONFLICT)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// Network-level failures; the request may not have reached Graph.
    pub fn is_transient(&self) -> bool {
        match self {
            GraphError::Timeout => true,
            GraphError::Transport(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    /// Throttling, server errors and transient transport failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            GraphError::Http { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            other => other.is_transient(),
        }
    }

    fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.is_retryable() {
            return None;
        }
        if let GraphError::Http {
            retry_after: Some(secs),
            ..
        } = self
        {
            return Some(Duration::from_secs((*secs).min(MAX_RETRY_DELAY_SECS)));
        }
        Some(Duration::from_millis(
            BASE_RETRY_DELAY_MS.saturating_mul(2_u64.saturating_pow(attempt.min(5))),
        ))
    }
}

fn transport_error(err: reqwest::Error) -> GraphError {
    if err.is_timeout() {
        GraphError::Timeout
    } else {
        GraphError::Transport(err)
    }
}

#[derive(Clone, Debug)]
pub struct GraphClient {
    http: Client,
    base_url: String,
}

impl GraphClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs (paging links, SharePoint REST) pass through untouched.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    pub fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, GraphError> {
        let response = builder.send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(Self::http_error(response).await);
        }
        let body = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&body).map_err(|err| GraphError::Decode(err.to_string()))
    }

    pub async fn send_no_content(&self, builder: RequestBuilder) -> Result<(), GraphError> {
        let response = builder.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::http_error(response).await)
        }
    }

    async fn http_error(response: reqwest::Response) -> GraphError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        GraphError::Http {
            status,
            body,
            retry_after,
        }
    }

    /// Re-run a read until it succeeds, fails permanently or `max_attempts`
    /// is reached. Only for idempotent GETs.
    pub async fn retry_with_backoff<T, F, Fut>(
        &self,
        operation: &str,
        max_attempts: u32,
        mut call: F,
    ) -> Result<T, GraphError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GraphError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt < max_attempts
                        && let Some(delay) = err.retry_delay(attempt)
                    {
                        warn!(
                            target = "graph",
                            operation,
                            attempt,
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "Graph read failed; retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}
