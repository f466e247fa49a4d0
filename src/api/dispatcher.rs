//! The request dispatcher: a generic HTTP server in front of business logic.
//!
//! ```text
//! client --[dispatcher_port]--> RequestDispatcher --[backend_port]--> llama-server
//!                                      |
//!                                      +--> RequestHandler (business logic)
//! ```
//!
//! Lifecycle is `Created -> Listening -> Stopped`. [`RequestDispatcher::start`]
//! serves until [`RequestDispatcher::stop`] is called from another task.

use crate::api::handlers::{api, health, AppState, RequestHandler};
use crate::core::config::{BackendConfig, ServerSettings};
use crate::core::{DispatchError, ShutdownHandle};
use crate::services::BackendClient;
use axum::{
    routing::{get, post},
    Router,
};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Lifecycle state of a [`RequestDispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Created,
    Listening,
    Stopped,
}

impl DispatcherState {
    fn as_u8(self) -> u8 {
        match self {
            DispatcherState::Created => 0,
            DispatcherState::Listening => 1,
            DispatcherState::Stopped => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => DispatcherState::Created,
            1 => DispatcherState::Listening,
            _ => DispatcherState::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DispatcherState::Created => "created",
            DispatcherState::Listening => "listening",
            DispatcherState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic HTTP server exposing `GET /health` and `POST /api`.
///
/// The handler is fixed at construction; the dispatcher never inspects the
/// payloads it forwards.
///
/// # Examples
///
/// ```no_run
/// use llama_app_server::api::RequestDispatcher;
/// use llama_app_server::core::BackendConfig;
/// use llama_app_server::services::BackendClient;
/// use serde_json::Value;
/// use std::sync::Arc;
///
/// # async fn run() -> anyhow::Result<()> {
/// let config = BackendConfig::from_file("config.txt")?;
/// config.validate()?;
///
/// let dispatcher = RequestDispatcher::new(
///     config,
///     |request: Value, _backend: Arc<BackendClient>| async move { anyhow::Ok(request) },
/// )?;
/// dispatcher.start().await?;
/// # Ok(())
/// # }
/// ```
pub struct RequestDispatcher {
    config: BackendConfig,
    settings: ServerSettings,
    backend: Arc<BackendClient>,
    handler: Arc<dyn RequestHandler>,
    state: AtomicU8,
    shutdown: ShutdownHandle,
}

impl RequestDispatcher {
    /// Create a dispatcher with default [`ServerSettings`].
    pub fn new<H: RequestHandler>(config: BackendConfig, handler: H) -> Result<Self, DispatchError> {
        Self::with_settings(config, ServerSettings::default(), handler)
    }

    /// Create a dispatcher with explicit bind host and backend timeout.
    pub fn with_settings<H: RequestHandler>(
        config: BackendConfig,
        settings: ServerSettings,
        handler: H,
    ) -> Result<Self, DispatchError> {
        let backend =
            BackendClient::with_timeout(&config.backend_url(), settings.request_timeout_secs)?;

        Ok(Self {
            config,
            settings,
            backend: Arc::new(backend),
            handler: Arc::new(handler),
            state: AtomicU8::new(DispatcherState::Created.as_u8()),
            shutdown: ShutdownHandle::new(),
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Client for the llama-server backend, shared with the handler.
    pub fn backend(&self) -> Arc<BackendClient> {
        self.backend.clone()
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Build the router serving both endpoints.
    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            handler: self.handler.clone(),
            backend: self.backend.clone(),
        });

        Router::new()
            .route("/health", get(health))
            .route("/api", post(api))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured port and serve until [`RequestDispatcher::stop`].
    ///
    /// Fails with [`DispatchError::Bind`] if the port cannot be bound and with
    /// [`DispatchError::InvalidState`] if the dispatcher already started or was
    /// stopped.
    pub async fn start(&self) -> Result<(), DispatchError> {
        if let Err(current) = self.state.compare_exchange(
            DispatcherState::Created.as_u8(),
            DispatcherState::Listening.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(DispatchError::InvalidState(
                DispatcherState::from_u8(current).as_str(),
            ));
        }

        let result = self.serve().await;
        self.state
            .store(DispatcherState::Stopped.as_u8(), Ordering::SeqCst);
        result
    }

    async fn serve(&self) -> Result<(), DispatchError> {
        let configured = self.config.dispatcher_port();
        let port = u16::try_from(configured).map_err(|_| DispatchError::Bind {
            port: configured,
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "port is outside 0-65535",
            ),
        })?;

        let addr = format!("{}:{}", self.settings.host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| DispatchError::Bind {
                port: configured,
                source,
            })?;

        tracing::info!("Server listening on {}", addr);
        tracing::info!("Endpoints:");
        tracing::info!("  GET  /health - Health check");
        tracing::info!("  POST /api    - Main API endpoint");
        tracing::info!(backend = %self.backend.server_url(), "Forwarding to llama-server");

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await
            .map_err(|source| DispatchError::Serve {
                port: configured,
                source,
            })?;

        tracing::info!("Server on port {} shut down", port);
        Ok(())
    }

    /// Stop accepting connections and let in-flight requests finish.
    ///
    /// Idempotent. Stopping a dispatcher that never started moves it straight
    /// to [`DispatcherState::Stopped`].
    pub fn stop(&self) {
        let _ = self.state.compare_exchange(
            DispatcherState::Created.as_u8(),
            DispatcherState::Stopped.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.shutdown.trigger();
        tracing::debug!("Shutdown requested");
    }
}

impl fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .field("backend", &self.backend)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
