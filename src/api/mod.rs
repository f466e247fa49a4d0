//! API layer for the application server.
//!
//! This module contains the dispatcher, its HTTP handlers, and the
//! request/response models shared with the backend client.

pub mod dispatcher;
pub mod handlers;
pub mod models;

// Re-export commonly used types
pub use dispatcher::{DispatcherState, RequestDispatcher};
pub use handlers::{AppState, HandlerFuture, RequestHandler};
pub use models::{ChatMessage, GenerationParams, HealthResponse};
