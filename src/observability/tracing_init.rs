//! Tracing initialization with configurable logging formats.
//!
//! The subscriber is assembled once from [`LoggingConfig`] and returned as a
//! [`Dispatch`] handle. `main` installs it as the process default; tests and
//! embedders can scope it with [`tracing::dispatcher::with_default`] instead.

use tracing::Dispatch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

use crate::config::{LogFormat, LoggingConfig};

/// Build a subscriber for the given logging configuration.
///
/// This sets up:
/// - Console logging with configurable format (pretty, compact, JSON)
/// - Environment-based log filtering
/// - Level colors when `ansi` is enabled
pub fn build_dispatch(logging: &LoggingConfig) -> Dispatch {
    let filter = build_env_filter(logging);

    match (&logging.format, logging.timestamps) {
        (LogFormat::Pretty, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_ansi(logging.ansi)
                .with_target(false);
            Dispatch::new(tracing_subscriber::registry().with(filter).with(fmt_layer))
        }
        (LogFormat::Pretty, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_ansi(logging.ansi)
                .with_target(false)
                .without_time();
            Dispatch::new(tracing_subscriber::registry().with(filter).with(fmt_layer))
        }
        (LogFormat::Compact, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(logging.ansi)
                .with_target(false);
            Dispatch::new(tracing_subscriber::registry().with(filter).with(fmt_layer))
        }
        (LogFormat::Compact, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(logging.ansi)
                .with_target(false)
                .without_time();
            Dispatch::new(tracing_subscriber::registry().with(filter).with(fmt_layer))
        }
        (LogFormat::Json, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false);
            Dispatch::new(tracing_subscriber::registry().with(filter).with(fmt_layer))
        }
        (LogFormat::Json, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .without_time();
            Dispatch::new(tracing_subscriber::registry().with(filter).with(fmt_layer))
        }
    }
}

/// Install the configured subscriber as the process-wide default.
///
/// Call once at startup; a second call fails.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), TracingError> {
    tracing::dispatcher::set_global_default(build_dispatch(logging))
        .map_err(|e| TracingError::Init(e.to_string()))
}

/// Build the environment filter from logging config.
fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    let base_level = config.level.as_str();

    // Check for RUST_LOG environment variable first
    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else if let Some(filter) = &config.filter {
        let combined = format!("{},{}", base_level, filter);
        EnvFilter::try_new(combined).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else {
        // Default filter that quiets the HTTP stack
        EnvFilter::new(format!(
            "{},hyper=warn,hyper_util=warn,h2=warn,rustls=warn,reqwest=warn",
            base_level
        ))
    }
}

/// Tracing initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}
