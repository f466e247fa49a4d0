//! Reference business logic shipped with the server binary.
//!
//! Requests name an `action`:
//!
//! | action     | fields                                   | result                          |
//! |------------|------------------------------------------|---------------------------------|
//! | `echo`     | anything                                 | the request itself              |
//! | `complete` | `prompt`, `max_tokens?`, `temperature?`  | `{action, result}`              |
//! | `chat`     | `messages` or `message`, sampling fields | `{action, result}`              |
//! | `models`   |                                          | `{action, models}`              |
//! | `status`   |                                          | `{action, backend_alive, backend_url}` |
//!
//! Anything else is an error, which the dispatcher reports as HTTP 500.

use crate::api::handlers::{HandlerFuture, RequestHandler};
use crate::api::models::{chat_text, completion_text, ChatMessage, GenerationParams};
use crate::services::BackendClient;
use anyhow::{anyhow, bail, Context};
use serde_json::{json, Value};
use std::sync::Arc;

/// Action-based handler that forwards to llama-server.
#[derive(Debug, Clone, Default)]
pub struct AssistantHandler {
    system_prompt: Option<String>,
}

impl AssistantHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a system message to single-message chat requests.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

impl RequestHandler for AssistantHandler {
    fn handle(&self, request: Value, backend: Arc<BackendClient>) -> HandlerFuture {
        let system_prompt = self.system_prompt.clone();
        Box::pin(async move { process_request(request, &backend, system_prompt.as_deref()).await })
    }
}

async fn process_request(
    request: Value,
    backend: &BackendClient,
    system_prompt: Option<&str>,
) -> anyhow::Result<Value> {
    let action = request
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Missing 'action' field"))?
        .to_owned();

    tracing::debug!(action = %action, "Processing request");

    match action.as_str() {
        "echo" => Ok(request),
        "complete" => {
            let prompt = string_field(&request, "prompt")?;
            let response = backend
                .complete(prompt, sampling(&request)?)
                .await
                .context("Completion request failed")?;
            let text = completion_text(&response)
                .ok_or_else(|| anyhow!("Backend response has no 'content'"))?;
            Ok(json!({"action": "complete", "result": text}))
        }
        "chat" => {
            let messages = chat_messages(&request, system_prompt)?;
            let response = backend
                .chat(&messages, sampling(&request)?)
                .await
                .context("Chat request failed")?;
            let text = chat_text(&response)
                .ok_or_else(|| anyhow!("Backend response has no message content"))?;
            Ok(json!({"action": "chat", "result": text}))
        }
        "models" => {
            let models = backend
                .list_models()
                .await
                .context("Model listing failed")?;
            Ok(json!({"action": "models", "models": models}))
        }
        "status" => Ok(json!({
            "action": "status",
            "backend_alive": backend.is_alive().await,
            "backend_url": backend.server_url(),
        })),
        other => bail!("Unknown action: {other}"),
    }
}

fn string_field<'a>(request: &'a Value, name: &str) -> anyhow::Result<&'a str> {
    request
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Missing '{name}' field"))
}

fn sampling(request: &Value) -> anyhow::Result<GenerationParams> {
    let mut params = GenerationParams::default();
    if let Some(value) = request.get("max_tokens") {
        params.max_tokens = value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| anyhow!("'max_tokens' must be a positive integer"))?;
    }
    if let Some(value) = request.get("temperature") {
        params.temperature = value
            .as_f64()
            .ok_or_else(|| anyhow!("'temperature' must be a number"))? as f32;
    }
    Ok(params)
}

fn chat_messages(
    request: &Value,
    system_prompt: Option<&str>,
) -> anyhow::Result<Vec<ChatMessage>> {
    if let Some(messages) = request.get("messages") {
        return serde_json::from_value(messages.clone())
            .context("'messages' must be an array of {role, content} objects");
    }

    let message = string_field(request, "message")
        .map_err(|_| anyhow!("Missing 'messages' or 'message' field"))?;
    let mut messages = Vec::with_capacity(2);
    if let Some(prompt) = system_prompt {
        messages.push(ChatMessage::system(prompt));
    }
    messages.push(ChatMessage::user(message));
    Ok(messages)
}
