//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level so operators can raise verbosity
//! for one module without touching the config file.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter used by [`init_tracing`].
pub fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "mint_gate={level},mint_gate_cli={level},tower_http={level}",
            level = log_level
        ))
    })
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(log_level: &str) {
    let result = tracing_subscriber::registry()
        .with(build_filter(log_level))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
