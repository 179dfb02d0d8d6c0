//! Blockchain RPC client with timeout and error handling.
//!
//! # Responsibilities
//! - Connect to JSON-RPC endpoints (primary + failovers)
//! - Query chain state (nonce, gas price, estimates, receipts, block number)
//! - Broadcast signed transactions and run read-only calls
//! - Handle timeouts and network errors without swallowing them

use alloy::network::TransactionBuilder as _;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::types::{
    BlockchainConfig, BlockchainError, BlockchainResult, ChainId, RawReceipt,
};
use crate::observability::metrics;

/// JSON-RPC gateway used by the builder and the pipeline.
///
/// Implementations return typed failures and never retry on their own
/// beyond endpoint failover.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> BlockchainResult<u64>;

    async fn block_number(&self) -> BlockchainResult<u64>;

    /// Pending-inclusive transaction count of `address`.
    async fn nonce(&self, address: Address) -> BlockchainResult<u64>;

    /// Legacy gas price in wei.
    async fn gas_price(&self) -> BlockchainResult<u128>;

    async fn estimate_gas(
        &self,
        from: Address,
        to: Option<Address>,
        data: &Bytes,
        value: U256,
    ) -> BlockchainResult<u64>;

    /// Submit raw signed bytes and return the transaction hash.
    async fn broadcast(&self, raw: &Bytes) -> BlockchainResult<TxHash>;

    /// `Ok(None)` while the transaction is not yet mined.
    async fn receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<RawReceipt>>;

    /// Read-only `eth_call`.
    async fn call(&self, to: Address, data: &Bytes) -> BlockchainResult<Bytes>;
}

/// Produces a [`ChainClient`] for a request-supplied RPC URL.
pub trait ChainConnector: Send + Sync {
    fn connect(&self, rpc_url: &str) -> BlockchainResult<Arc<dyn ChainClient>>;
}

/// Fail with [`BlockchainError::ChainMismatch`] unless the endpoint serves `expected`.
pub async fn verify_chain_id(client: &dyn ChainClient, expected: ChainId) -> BlockchainResult<()> {
    let actual = client.chain_id().await?;
    if actual != expected.0 {
        return Err(BlockchainError::ChainMismatch {
            expected: expected.0,
            actual,
        });
    }
    Ok(())
}

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// alloy-backed client with failover support.
#[derive(Clone)]
pub struct RpcChainClient {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    /// Primary endpoint, for diagnostics only.
    rpc_url: String,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl RpcChainClient {
    /// Create a client for `rpc_url` with optional failovers.
    ///
    /// No network traffic happens here; unreachable endpoints surface on first use.
    pub fn connect(
        rpc_url: &str,
        failover_urls: &[String],
        timeout_duration: Duration,
    ) -> BlockchainResult<Self> {
        let mut providers = Vec::new();

        let primary_url: url::Url = rpc_url.parse().map_err(|e| {
            BlockchainError::InvalidInput(format!("Invalid RPC URL '{}': {}", rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        for url_str in failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => {
                    providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider)
                }
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        Ok(Self {
            providers,
            rpc_url: rpc_url.to_string(),
            timeout_duration,
        })
    }

    /// Create the default client from configuration.
    pub fn from_config(config: &BlockchainConfig) -> BlockchainResult<Self> {
        Self::connect(
            &config.rpc_url,
            &config.failover_urls,
            Duration::from_secs(config.rpc_timeout_secs),
        )
    }

    /// Check if the endpoint answers at all.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.block_number().await.is_ok();
        metrics::record_rpc_health(healthy);
        healthy
    }

    /// Run `call` against each provider in order until one answers.
    async fn with_failover<T, F, Fut>(&self, op: &'static str, call: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut last_error = String::from("no providers configured");
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, op = op, error = %e, "RPC error, trying next provider");
                    last_error = e.to_string();
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, op = op, "RPC timeout, trying next provider");
                    last_error = format!("timeout after {}s", self.timeout_duration.as_secs());
                }
            }
        }
        if self.providers.len() == 1 && last_error.starts_with("timeout") {
            return Err(BlockchainError::Timeout(self.timeout_duration.as_secs()));
        }
        Err(BlockchainError::Rpc(format!(
            "All providers failed to {}: {}",
            op, last_error
        )))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> BlockchainResult<u64> {
        self.with_failover("get chain id", |p| async move { p.get_chain_id().await })
            .await
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        self.with_failover("get block number", |p| async move {
            p.get_block_number().await
        })
        .await
    }

    async fn nonce(&self, address: Address) -> BlockchainResult<u64> {
        self.with_failover("get transaction count", |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        self.with_failover("get gas price", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Option<Address>,
        data: &Bytes,
        value: U256,
    ) -> BlockchainResult<u64> {
        let mut request = TransactionRequest::default()
            .with_from(from)
            .with_input(data.clone())
            .with_value(value);
        match to {
            Some(to) => request.set_to(to),
            None => request.set_create(),
        }

        self.with_failover("estimate gas", |p| {
            let request = request.clone();
            async move { p.estimate_gas(request).await }
        })
        .await
    }

    async fn broadcast(&self, raw: &Bytes) -> BlockchainResult<TxHash> {
        self.with_failover("send raw transaction", |p| {
            let raw = raw.clone();
            async move {
                p.send_raw_transaction(&raw)
                    .await
                    .map(|pending| *pending.tx_hash())
            }
        })
        .await
        .map_err(|e| match e {
            BlockchainError::Rpc(msg) => BlockchainError::Broadcast(msg),
            other => other,
        })
    }

    async fn receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<RawReceipt>> {
        self.with_failover("get receipt", |p| async move {
            p.get_transaction_receipt(tx_hash).await
        })
        .await
        .map(|receipt| receipt.map(RawReceipt::from))
    }

    async fn call(&self, to: Address, data: &Bytes) -> BlockchainResult<Bytes> {
        let request = TransactionRequest::default()
            .with_to(to)
            .with_input(data.clone());

        self.with_failover("call", |p| {
            let request = request.clone();
            async move { p.call(request).await }
        })
        .await
    }
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("rpc_url", &self.rpc_url)
            .field("providers", &self.providers.len())
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}

/// Connector that caches one [`RpcChainClient`] per URL.
///
/// The configured default endpoint keeps its failovers; ad-hoc URLs from
/// requests get a single provider.
pub struct RpcConnector {
    default: BlockchainConfig,
    clients: DashMap<String, Arc<RpcChainClient>>,
}

impl RpcConnector {
    pub fn new(default: BlockchainConfig) -> Self {
        Self {
            default,
            clients: DashMap::new(),
        }
    }
}

impl ChainConnector for RpcConnector {
    fn connect(&self, rpc_url: &str) -> BlockchainResult<Arc<dyn ChainClient>> {
        let rpc_url = if rpc_url.is_empty() {
            self.default.rpc_url.as_str()
        } else {
            rpc_url
        };

        if let Some(client) = self.clients.get(rpc_url) {
            return Ok(client.value().clone() as Arc<dyn ChainClient>);
        }

        let failovers: &[String] = if rpc_url == self.default.rpc_url {
            &self.default.failover_urls
        } else {
            &[]
        };
        let client = Arc::new(RpcChainClient::connect(
            rpc_url,
            failovers,
            Duration::from_secs(self.default.rpc_timeout_secs),
        )?);
        self.clients.insert(rpc_url.to_string(), client.clone());

        tracing::info!(rpc_url = %rpc_url, "RPC client created");
        Ok(client as Arc<dyn ChainClient>)
    }
}
