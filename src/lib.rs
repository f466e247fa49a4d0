//! Llama App Server - a generic application server in front of llama-server
//!
//! Three parties take part in every request:
//!
//! ```text
//! GUI/CLI client --[dispatcher_port]--> RequestDispatcher --[backend_port]--> llama-server
//!                                              |
//!                                              +--> RequestHandler (your business logic)
//! ```
//!
//! - **Validated configuration**: a strict four-line file naming the llama.cpp
//!   bin directory, the model, and both ports
//! - **Backend client**: completion, chat, health and model listing calls with
//!   timeouts and a typed error taxonomy
//! - **Generic dispatcher**: `GET /health` plus a single `POST /api` endpoint
//!   that forwards decoded JSON to an injected handler
//!
//! # Architecture
//!
//! - [`core`]: Core functionality (config, errors, logging, shutdown)
//! - [`api`]: The dispatcher, its HTTP handlers and wire models
//! - [`services`]: The backend client and the reference business logic
//!
//! # Configuration
//!
//! The config file (first CLI argument, `APP_CONFIG`, or `config.txt`) holds:
//!
//! ```text
//! /path/to/llama.cpp/build/bin
//! /path/to/model.gguf
//! 8080
//! 8081
//! ```
//!
//! Optional environment variables:
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `REQUEST_TIMEOUT_SECS`: Backend request timeout in seconds (default: 300)
//! - `RUST_LOG`, `NO_COLOR`: Logging filter and color control

pub mod api;
pub mod core;
pub mod services;

// Re-export commonly used types for convenience
pub use api::{RequestDispatcher, RequestHandler};
pub use core::{BackendConfig, ClientError, ConfigError, DispatchError};
pub use services::{AssistantHandler, BackendClient};
