//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! constraints. All problems are reported at once, not just the first.

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

fn push(errors: &mut Vec<ValidationError>, field: &'static str, message: impl Into<String>) {
    errors.push(ValidationError {
        field,
        message: message.into(),
    });
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        push(
            &mut errors,
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        );
    }
    if config.listener.request_timeout_secs == 0 {
        push(&mut errors, "listener.request_timeout_secs", "must be > 0");
    }

    let chain = &config.blockchain;
    if url::Url::parse(&chain.rpc_url).is_err() {
        push(
            &mut errors,
            "blockchain.rpc_url",
            format!("'{}' is not a valid URL", chain.rpc_url),
        );
    }
    for failover in &chain.failover_urls {
        if url::Url::parse(failover).is_err() {
            push(
                &mut errors,
                "blockchain.failover_urls",
                format!("'{}' is not a valid URL", failover),
            );
        }
    }
    if chain.chain_id == 0 {
        push(&mut errors, "blockchain.chain_id", "must be > 0");
    }
    if chain.rpc_timeout_secs == 0 {
        push(&mut errors, "blockchain.rpc_timeout_secs", "must be > 0");
    }
    if chain.receipt_timeout_secs == 0 {
        push(&mut errors, "blockchain.receipt_timeout_secs", "must be > 0");
    }
    if chain.poll_interval_ms == 0 || chain.poll_interval_ms > chain.max_poll_interval_ms {
        push(
            &mut errors,
            "blockchain.poll_interval_ms",
            "must be > 0 and not exceed max_poll_interval_ms",
        );
    }

    if config.retries.max_attempts == 0 {
        push(&mut errors, "retries.max_attempts", "must be >= 1");
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        push(
            &mut errors,
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        );
    }

    for (field, path) in [
        ("storage.whitelist_path", &config.storage.whitelist_path),
        ("storage.tree_path", &config.storage.tree_path),
        ("storage.marketplace_path", &config.storage.marketplace_path),
    ] {
        if path.trim().is_empty() {
            push(&mut errors, field, "must not be empty");
        }
    }
    if config.storage.whitelist_path == config.storage.tree_path {
        push(
            &mut errors,
            "storage.tree_path",
            "must differ from storage.whitelist_path",
        );
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        push(
            &mut errors,
            "observability.metrics_address",
            "must be a socket address when metrics are enabled",
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
