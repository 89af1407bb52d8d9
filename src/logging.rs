//! # Structured Logging
//!
//! Console logging setup for the coordinator and its recovery tooling.
//! The embedding application may already own a global subscriber; init here
//! is idempotent and steps aside quietly when one is installed.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console logging with environment-specific defaults.
///
/// `RUST_LOG` overrides the per-environment default filter. Set
/// `CHARTBATCH_LOG_FORMAT=json` for machine-readable output.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());
        let json_output = std::env::var("CHARTBATCH_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let already_set = if json_output {
            let layer = fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(env_filter(&environment));
            tracing_subscriber::registry().with(layer).try_init().is_err()
        } else {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(env_filter(&environment));
            tracing_subscriber::registry().with(layer).try_init().is_err()
        };

        if already_set {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                ansi_colors = use_ansi,
                json_output = json_output,
                "Structured logging initialized"
            );
        }
    });
}

fn env_filter(environment: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(get_log_level(environment)))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("CHARTBATCH_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get default filter directives based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "chartbatch_core=debug".to_string(),
        "development" => "chartbatch_core=debug".to_string(),
        "production" => "chartbatch_core=info".to_string(),
        _ => "chartbatch_core=debug".to_string(),
    }
}
