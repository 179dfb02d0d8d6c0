//! Ordered startup: stores first, then the whitelist, then contract services.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::blockchain::{ChainConnector, RpcConnector, TransactionPipeline};
use crate::config::AppConfig;
use crate::contract::{ContractArtifact, ContractError, ContractService};
use crate::http::AppState;
use crate::merkle::{MerkleWhitelistManager, MerkleWhitelistStore, WhitelistError};
use crate::storage::MarketplaceStore;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("whitelist: {0}")]
    Whitelist(#[from] WhitelistError),

    #[error("contract artifact: {0}")]
    Contract(#[from] ContractError),
}

/// Build the shared state with RPC connections from configuration.
pub fn build_state(config: &AppConfig, rebuild_tree: bool) -> Result<AppState, StartupError> {
    let connector = Arc::new(RpcConnector::new(config.blockchain.clone()));
    build_state_with(config, connector, rebuild_tree)
}

/// Build the shared state around any [`ChainConnector`].
pub fn build_state_with(
    config: &AppConfig,
    connector: Arc<dyn ChainConnector>,
    rebuild_tree: bool,
) -> Result<AppState, StartupError> {
    let storage = &config.storage;

    let marketplace = Arc::new(MarketplaceStore::new(&storage.marketplace_path));
    let whitelist = Arc::new(MerkleWhitelistManager::open(
        MerkleWhitelistStore::from_config(storage),
        rebuild_tree,
    )?);

    let artifact = Arc::new(ContractArtifact::load(
        Path::new(&storage.contract_abi_path),
        storage.contract_bytecode_path.as_deref().map(Path::new),
    )?);
    if artifact.bytecode().is_none() {
        tracing::warn!("No contract bytecode configured, deployContract is unavailable");
    }

    let pipeline = Arc::new(TransactionPipeline::from_config(
        &config.blockchain,
        config.retries.clone(),
    ));
    let contracts = Arc::new(ContractService::new(
        artifact,
        connector.clone(),
        pipeline,
        marketplace.clone(),
        whitelist.clone(),
        config.blockchain.chain_id,
    ));

    Ok(AppState {
        whitelist,
        contracts,
        marketplace,
        connector,
        admin_api_key: Arc::from(config.admin.api_key.as_str()),
    })
}
