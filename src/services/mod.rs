//! Services used by the dispatcher and by business logic.
//!
//! - [`backend_client`]: HTTP wrapper around llama-server
//! - [`assistant`]: the reference action-based request handler

pub mod assistant;
pub mod backend_client;

// Re-export commonly used types
pub use assistant::AssistantHandler;
pub use backend_client::BackendClient;
