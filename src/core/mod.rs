//! Core functionality for the application server.
//!
//! This module contains fundamental components used throughout the application:
//! - Configuration parsing and validation
//! - Error handling
//! - Logging and request context
//! - Graceful shutdown signalling

pub mod config;
pub mod error;
pub mod logging;
pub mod shutdown;

// Re-export commonly used types
pub use config::{expand_path, BackendConfig, ServerSettings};
pub use error::{ApiError, ClientError, ConfigError, DispatchError, Result};
pub use logging::{generate_request_id, get_request_id, init_logging, REQUEST_ID};
pub use shutdown::ShutdownHandle;
