//! Structured logging and tracing configuration.

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Tracing configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON output format
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Initialize tracing. `RUST_LOG` takes precedence over `level`.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default()
            .with(env_filter)
            .with(json_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true);

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    };

    if installed.is_ok() {
        tracing::debug!(level, json, "Tracing initialized");
    }
}

/// Read tracing configuration from the environment.
///
/// - `CODEINDEX_LOG_LEVEL` (default: "info")
/// - `CODEINDEX_LOG_JSON` (default: false)
#[must_use]
pub fn config_from_env() -> TracingConfig {
    config_from_vars(
        std::env::var("CODEINDEX_LOG_LEVEL").ok(),
        std::env::var("CODEINDEX_LOG_JSON").ok(),
    )
}

fn config_from_vars(level: Option<String>, json: Option<String>) -> TracingConfig {
    TracingConfig {
        level: level.unwrap_or_else(|| "info".to_string()),
        json: json.is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes")),
    }
}

/// Span helpers shared by the pipelines.
pub mod spans {
    use tracing::{info_span, Span};

    /// Span covering one full reindex.
    #[must_use]
    pub fn reindex_span(run_id: &str, path: &str) -> Span {
        info_span!("reindex", run_id = %run_id, path = %path)
    }

    /// Span covering one incremental update.
    #[must_use]
    pub fn update_span(change: &str, path: &str) -> Span {
        info_span!("file_update", change = %change, path = %path)
    }
}
