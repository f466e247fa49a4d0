//! Logging setup and request context.
//!
//! [`init_logging`] installs the global `tracing` subscriber. The dispatcher
//! scopes every business request in [`REQUEST_ID`] so logs emitted by the
//! handler and the backend client can be correlated.

use chrono::Local;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

tokio::task_local! {
    /// Task-local storage for the current request ID.
    pub static REQUEST_ID: String;
}

/// Filters always appended so hyper/reqwest trace output stays quiet even when
/// `RUST_LOG` is set to a bare level.
const NOISE_FILTERS: &str = "hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn";

const DEFAULT_FILTER: &str = "info,llama_app_server=debug";

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Custom time formatter that uses local timezone (respects TZ environment variable)
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Build the filter string from an optional `RUST_LOG` value.
fn filter_directives(base: Option<String>) -> String {
    let base = base
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());
    format!("{},{}", base, NOISE_FILTERS)
}

/// Install the global subscriber.
///
/// Honors `RUST_LOG` and disables ANSI colors when `NO_COLOR` is set. Calling
/// it twice is harmless; the second call is ignored.
pub fn init_logging() {
    let no_color = std::env::var("NO_COLOR").is_ok();
    let filter =
        tracing_subscriber::EnvFilter::new(filter_directives(std::env::var("RUST_LOG").ok()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTime)
                .with_ansi(!no_color),
        )
        .try_init();
}
