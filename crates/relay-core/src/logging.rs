//! `tracing` subscriber setup.

use crate::config::LoggingConfig;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

const RELAY_TARGETS: [&str; 2] = ["relay_core", "tests"];

fn targets_at(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(RELAY_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

/// Builds the filter: `RUST_LOG` wins when set, with `debug`/`trace` shorthands
/// widening only the relay crates; otherwise `config.level` applies to them.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(env_filter) if env_filter == "debug" || env_filter == "trace" => {
            EnvFilter::new(targets_at(&env_filter))
        }
        Ok(_) => EnvFilter::try_from_env("RUST_LOG")
            .unwrap_or_else(|_| EnvFilter::new(targets_at(&config.level))),
        Err(_) => EnvFilter::new(targets_at(&config.level)),
    }
}

/// Installs the global subscriber in `pretty` or `json` format.
///
/// # Errors
///
/// Returns [`TryInitError`] if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(build_filter(config));

    if config.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).try_init()
    }
}
