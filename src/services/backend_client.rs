//! HTTP client for the llama-server backend.
//!
//! Every call builds a fresh, non-pooling `reqwest::Client`, sends exactly one
//! request and drops the connection. A slow or wedged backend therefore cannot
//! poison state shared with other requests.

use crate::api::models::{ChatMessage, ChatRequest, CompletionRequest, GenerationParams};
use crate::core::ClientError;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Port used when the backend URL does not name one.
pub const DEFAULT_BACKEND_PORT: u16 = 8080;

/// Timeout for business calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Timeout for the liveness probe.
pub const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Stop sequences sent with every completion request.
pub const STOP_SEQUENCES: [&str; 2] = ["User:", "\n\n"];

/// Client for a running llama-server instance.
#[derive(Debug, Clone)]
pub struct BackendClient {
    host: String,
    port: u16,
    timeout: Duration,
    health_timeout: Duration,
}

impl BackendClient {
    /// Create a client with the default 300s timeout.
    ///
    /// # Examples
    ///
    /// ```
    /// use llama_app_server::services::BackendClient;
    ///
    /// let client = BackendClient::new("http://localhost:8080").unwrap();
    /// assert_eq!(client.server_url(), "http://localhost:8080");
    /// ```
    pub fn new(url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT_SECS)
    }

    /// Create a client whose business calls time out after `timeout_secs`.
    pub fn with_timeout(url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        let (host, port) = parse_url(url)?;
        Ok(Self {
            host,
            port,
            timeout: Duration::from_secs(timeout_secs),
            health_timeout: Duration::from_secs(HEALTH_TIMEOUT_SECS),
        })
    }

    /// Override the liveness probe timeout.
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Base URL of the backend, e.g. `http://localhost:8080`.
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Generate a completion for `prompt`.
    ///
    /// Sends `{prompt, n_predict, temperature, stop}` to `POST /completion`.
    #[tracing::instrument(
        skip(self, prompt),
        fields(max_tokens = params.max_tokens, temperature = params.temperature)
    )]
    pub async fn complete(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<Value, ClientError> {
        let request = CompletionRequest {
            prompt,
            n_predict: params.max_tokens,
            temperature: params.temperature,
            stop: &STOP_SEQUENCES,
        };
        self.post_json("/completion", &request).await
    }

    /// Multi-turn chat via `POST /v1/chat/completions`.
    #[tracing::instrument(
        skip(self, messages),
        fields(
            messages = messages.len(),
            max_tokens = params.max_tokens,
            temperature = params.temperature
        )
    )]
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<Value, ClientError> {
        let request = ChatRequest {
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };
        self.post_json("/v1/chat/completions", &request).await
    }

    /// Probe `GET /health`. Never fails: any error is reported as `false`.
    pub async fn is_alive(&self) -> bool {
        let url = format!("{}/health", self.server_url());
        let client = match build_http_client(self.health_timeout) {
            Ok(client) => client,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to build health check client");
                return false;
            }
        };

        match client.get(&url).send().await {
            Ok(response) => {
                let alive = response.status() == StatusCode::OK;
                if !alive {
                    tracing::debug!(status = %response.status(), "Backend health check failed");
                }
                alive
            }
            Err(e) => {
                tracing::debug!(
                    url = %url,
                    error = %e,
                    is_timeout = e.is_timeout(),
                    is_connect = e.is_connect(),
                    "Backend health check failed"
                );
                false
            }
        }
    }

    /// Fetch model metadata from `GET /v1/models`.
    #[tracing::instrument(skip(self))]
    pub async fn list_models(&self) -> Result<Value, ClientError> {
        let url = format!("{}/v1/models", self.server_url());
        let client = build_http_client(self.timeout)?;
        let response = client.get(&url).send().await.map_err(|e| transport(&url, e))?;
        read_json(&url, response).await
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Value, ClientError> {
        let url = format!("{}{}", self.server_url(), path);
        let client = build_http_client(self.timeout)?;

        tracing::debug!(url = %url, "Sending backend request");
        let response = client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;

        read_json(&url, response).await
    }
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .pool_max_idle_per_host(0)
        .build()
        .map_err(ClientError::Transport)
}

fn transport(url: &str, e: reqwest::Error) -> ClientError {
    tracing::error!(
        url = %url,
        error = %e,
        is_timeout = e.is_timeout(),
        is_connect = e.is_connect(),
        "HTTP request to backend failed"
    );
    ClientError::Transport(e)
}

async fn read_json(url: &str, response: reqwest::Response) -> Result<Value, ClientError> {
    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(url = %url, status = %status, "Backend returned error status");
        return Err(ClientError::Backend {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await.map_err(|e| transport(url, e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::warn!(url = %url, error = %e, "Backend returned malformed JSON");
        ClientError::Decode(e)
    })
}

/// Split `http://host:port` into host and port.
fn parse_url(url: &str) -> Result<(String, u16), ClientError> {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    let authority = without_scheme.split('/').next().unwrap_or_default();

    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| ClientError::InvalidUrl(url.to_string()))?;
            (host, port)
        }
        None => (authority, DEFAULT_BACKEND_PORT),
    };

    if host.is_empty() {
        return Err(ClientError::InvalidUrl(url.to_string()));
    }

    Ok((host.to_string(), port))
}
