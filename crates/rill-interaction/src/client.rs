//! HTTP client for the completion backend.
//!
//! Wraps `reqwest` behind the `CompletionBackend` trait so use cases can
//! be exercised against a mock backend in tests.

use crate::config::BackendConfig;
use crate::dto::{
    ErrorResponse, ProjectHistoryRequest, ProjectHistoryResponse, SendMessageRequest,
    SessionHistoryResponse, SessionSummary,
};
use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use rill_core::error::{RillError, Result};
use std::pin::Pin;
use std::time::Duration;

/// Chunked response body: one item per network read.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Narrow interface to the completion backend.
///
/// Interrupt, clear and delete are best-effort: a failure only affects
/// whether an optimistic local change is rolled back.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Sends one user message; the response body is the event stream.
    async fn send_message(&self, request: SendMessageRequest) -> Result<ByteStream>;

    /// Fetches the full transcript of one session.
    async fn fetch_session_history(&self, session_id: &str) -> Result<SessionHistoryResponse>;

    /// Lists sessions related to the primary one (same project).
    async fn related_sessions(
        &self,
        project_path: &str,
        primary_session_id: &str,
    ) -> Result<Vec<SessionSummary>>;

    /// Asks the backend to stop the in-flight turn for a session.
    async fn interrupt(&self, session_id: &str) -> Result<()>;

    /// Clears a session's transcript on the backend.
    async fn clear_session(&self, session_id: &str) -> Result<()>;

    /// Deletes a session on the backend.
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

/// `CompletionBackend` implementation that talks to the HTTP API.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    config: BackendConfig,
}

impl BackendClient {
    /// Creates a client from connection settings.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error when the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|err| RillError::config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        Err(map_http_error(status, body))
    }
}

#[async_trait]
impl CompletionBackend for BackendClient {
    async fn send_message(&self, request: SendMessageRequest) -> Result<ByteStream> {
        let response = self
            .client
            .post(self.config.endpoint("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;
        let response = Self::check_status(response).await?;

        let stream = response
            .bytes_stream()
            .map(|read| read.map(|bytes| bytes.to_vec()).map_err(request_error));
        Ok(Box::pin(stream))
    }

    async fn fetch_session_history(&self, session_id: &str) -> Result<SessionHistoryResponse> {
        let url = self
            .config
            .endpoint(&format!("/api/sessions/{session_id}/history"));
        let response = self.client.get(url).send().await.map_err(request_error)?;
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|err| RillError::protocol(format!("malformed history response: {err}")))
    }

    async fn related_sessions(
        &self,
        project_path: &str,
        primary_session_id: &str,
    ) -> Result<Vec<SessionSummary>> {
        let request = ProjectHistoryRequest {
            project_path: project_path.to_string(),
            primary_session_id: primary_session_id.to_string(),
        };
        let response = self
            .client
            .post(self.config.endpoint("/api/projects/history"))
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;
        let response = Self::check_status(response).await?;

        let parsed: ProjectHistoryResponse = response
            .json()
            .await
            .map_err(|err| RillError::protocol(format!("malformed project history: {err}")))?;
        Ok(parsed.sessions)
    }

    async fn interrupt(&self, session_id: &str) -> Result<()> {
        let url = self
            .config
            .endpoint(&format!("/api/sessions/{session_id}/interrupt"));
        let response = self.client.post(url).send().await.map_err(request_error)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> Result<()> {
        let url = self
            .config
            .endpoint(&format!("/api/sessions/{session_id}/clear"));
        let response = self.client.post(url).send().await.map_err(request_error)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let url = self.config.endpoint(&format!("/api/sessions/{session_id}"));
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(request_error)?;
        Self::check_status(response).await?;
        Ok(())
    }
}

/// Maps a reqwest failure to a transport error with a retryable flag.
fn request_error(err: reqwest::Error) -> RillError {
    RillError::transport(
        format!("backend request failed: {err}"),
        err.is_connect() || err.is_timeout(),
    )
}

/// Maps a non-success HTTP status to a transport error.
///
/// Rate limiting and server-side failures are retryable; everything else
/// is definitive.
fn map_http_error(status: StatusCode, body: String) -> RillError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error)
        .unwrap_or(body);

    let retryable = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    );

    RillError::transport(format!("backend returned {status}: {message}"), retryable)
}
