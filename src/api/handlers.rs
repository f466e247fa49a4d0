//! HTTP request handlers for the dispatcher.
//!
//! `/health` answers on its own. `/api` decodes the body and hands it to the
//! injected [`RequestHandler`], translating the outcome into a response.

use crate::api::models::HealthResponse;
use crate::core::logging::{generate_request_id, get_request_id, REQUEST_ID};
use crate::core::{ApiError, Result};
use crate::services::BackendClient;
use axum::{
    extract::{rejection::BytesRejection, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Future returned by a [`RequestHandler`].
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Business logic invoked for every `POST /api` request.
///
/// The dispatcher knows nothing about the actions a handler understands; it
/// only decodes the body, calls [`RequestHandler::handle`] and turns the result
/// into a response. Any `Fn(Value, Arc<BackendClient>) -> impl Future` closure
/// returning `anyhow::Result<Value>` is a handler.
///
/// Handlers run concurrently. State kept inside a handler must be synchronized
/// by the handler itself.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: Value, backend: Arc<BackendClient>) -> HandlerFuture;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(Value, Arc<BackendClient>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn handle(&self, request: Value, backend: Arc<BackendClient>) -> HandlerFuture {
        Box::pin(self(request, backend))
    }
}

/// Shared dispatcher state.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<dyn RequestHandler>,
    pub backend: Arc<BackendClient>,
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Business endpoint.
///
/// Invalid JSON is rejected with 400 before the handler runs, and a body axum
/// refuses to buffer (over the default 2 MB limit, for instance) keeps the
/// rejection's status. Both use the JSON error payload. Handler errors (and
/// panics) become 500. Every response carries an `x-request-id` header.
pub async fn api(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let request_id = generate_request_id();

    let span = tracing::info_span!("api_request", request_id = %request_id);
    let mut response = REQUEST_ID
        .scope(request_id.clone(), dispatch(state, body))
        .instrument(span)
        .await
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn dispatch(
    state: Arc<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<Value>> {
    let body = body.map_err(|rejection| {
        tracing::warn!(
            status = %rejection.status(),
            error = %rejection,
            "Rejected unreadable request body"
        );
        ApiError::BodyRejected(rejection)
    })?;
    let request: Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, body_len = body.len(), "Rejected undecodable request body");
        ApiError::InvalidBody(e)
    })?;

    let start = Instant::now();
    let future = state.handler.handle(request, state.backend.clone());

    // Run the handler in its own task so a panic is contained to this request.
    let outcome = match tokio::spawn(REQUEST_ID.scope(get_request_id(), future)).await {
        Ok(outcome) => outcome,
        Err(join_error) => Err(anyhow::anyhow!("Request handler panicked: {join_error}")),
    };

    match outcome {
        Ok(response) => {
            tracing::debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request handled"
            );
            Ok(Json(response))
        }
        Err(e) => {
            tracing::error!(
                error = %format!("{e:#}"),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request handler failed"
            );
            Err(ApiError::Handler(e))
        }
    }
}
