//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the mint-gate service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener configuration.
    pub listener: ListenerConfig,

    /// Locations of persisted state and contract artifacts.
    pub storage: StorageConfig,

    /// Blockchain integration settings.
    pub blockchain: BlockchainConfig,

    /// Rebuild-and-resubmit policy for failed transactions.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8909").
    pub bind_address: String,

    /// Per-request timeout in seconds. Must exceed the receipt timeout for
    /// deploy/invoke requests to return their receipt.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8909".to_string(),
            request_timeout_secs: 300,
            max_body_size: 256 * 1024,
        }
    }
}

/// Persisted file locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `{ "addresses": [...] }` file.
    pub whitelist_path: String,

    /// Serialized Merkle tree (standard-v1 dump).
    pub tree_path: String,

    /// Flat deployment/marketplace record.
    pub marketplace_path: String,

    /// Contract ABI as a JSON array.
    pub contract_abi_path: String,

    /// Contract creation bytecode as a hex string. Deployment is unavailable without it.
    pub contract_bytecode_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            whitelist_path: "whitelistAddresses.json".to_string(),
            tree_path: "tree.json".to_string(),
            marketplace_path: "marketplaceData.json".to_string(),
            contract_abi_path: "contracts/Marketplace.abi.json".to_string(),
            contract_bytecode_path: None,
        }
    }
}

/// Blockchain integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL used when a request does not name one.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs for the default endpoint.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Maximum gas price in gwei (protection against spikes). 0 disables the check.
    pub max_gas_price_gwei: u64,

    /// How long to poll for a receipt before reporting the transaction as pending.
    pub receipt_timeout_secs: u64,

    /// First receipt poll delay.
    pub poll_interval_ms: u64,

    /// Receipt poll delay ceiling.
    pub max_poll_interval_ms: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 31337,
            rpc_timeout_secs: 10,
            max_gas_price_gwei: 500,
            receipt_timeout_secs: 120,
            poll_interval_ms: 500,
            max_poll_interval_ms: 5_000,
        }
    }
}

/// Retry configuration for transactions that failed before reaching the chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one. 1 disables retries.
    pub max_attempts: u32,

    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,

    /// Maximum delay between attempts.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// API key for admin routes (Bearer token). Empty disables admin routes.
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
        }
    }
}
