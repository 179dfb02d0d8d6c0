//! Contract operations exposed to the route layer.
//!
//! Resolution order for optional request fields is request, then the
//! deployment record, then configuration.

use alloy::primitives::{Address, TxHash, B256, U256};
use serde_json::Value;
use std::sync::Arc;

use crate::blockchain::{
    verify_chain_id, BlockchainError, ChainClient, ChainConnector, ChainId, KeyedSigner,
    TransactionPipeline, TransactionReceipt, TxOperation,
};
use crate::contract::artifact::ContractArtifact;
use crate::contract::deployment::{DeployCode, DeployParams, DeploymentGuard};
use crate::contract::types::{
    args_as_strings, non_blank, DeployRequest, DeployResponse, InvokeRequest, QueryRequest,
    ReceiptRequest,
};
use crate::contract::ContractError;
use crate::merkle::MerkleWhitelistManager;
use crate::storage::{DeploymentState, MarketplaceRecord, MarketplaceStore, MarketplaceUpdate};

const UPDATE_ROOT: &str = "updateRoot";

pub struct ContractService {
    artifact: Arc<ContractArtifact>,
    connector: Arc<dyn ChainConnector>,
    pipeline: Arc<TransactionPipeline>,
    guard: DeploymentGuard,
    marketplace: Arc<MarketplaceStore>,
    whitelist: Arc<MerkleWhitelistManager>,
    default_chain_id: u64,
}

impl ContractService {
    pub fn new(
        artifact: Arc<ContractArtifact>,
        connector: Arc<dyn ChainConnector>,
        pipeline: Arc<TransactionPipeline>,
        marketplace: Arc<MarketplaceStore>,
        whitelist: Arc<MerkleWhitelistManager>,
        default_chain_id: u64,
    ) -> Self {
        let guard = DeploymentGuard::new(marketplace.clone(), pipeline.clone());
        Self {
            artifact,
            connector,
            pipeline,
            guard,
            marketplace,
            whitelist,
            default_chain_id,
        }
    }

    pub fn contract_abi(&self) -> &Value {
        self.artifact.abi_json()
    }

    /// Record as served over the API, key redacted.
    pub async fn marketplace_data(&self) -> Result<MarketplaceRecord, ContractError> {
        Ok(self.marketplace.load().await?.redacted())
    }

    pub async fn set_marketplace_data(
        &self,
        update: &MarketplaceUpdate,
    ) -> Result<MarketplaceRecord, ContractError> {
        let record = self.marketplace.update(|record| record.apply(update)).await?;
        tracing::info!(
            rpc_url = %record.rpc_url,
            chain_id = ?record.chain_id,
            "Marketplace data updated"
        );
        Ok(record.redacted())
    }

    /// Deploy the marketplace contract at most once.
    ///
    /// Bytecode, root and constructor arguments are only resolved when the
    /// record shows no deployment; a repeat call needs none of them.
    pub async fn deploy_contract(
        &self,
        request: &DeployRequest,
    ) -> Result<DeployResponse, ContractError> {
        let record = self.marketplace.load().await?;
        let rpc_url = resolve_rpc_url(request.rpc_url.as_ref(), &record);
        let chain_id = request
            .chain_id
            .or(record.chain_id)
            .unwrap_or(self.default_chain_id);

        let params = DeployParams {
            rpc_url,
            chain_id,
            collectible_name: pick(&request.erc721_collectible_name, &record.erc721_collectible_name),
            collectible_symbol: pick(
                &request.erc721_collectible_symbol,
                &record.erc721_collectible_symbol,
            ),
            ipfs_gateway_url: pick(&request.ipfs_gateway_url, &record.ipfs_gateway_url),
        };

        let signer = resolve_signer(
            request.sender_address.as_ref(),
            request.sender_private_key.as_ref(),
            chain_id,
        )?;
        let client = self.connect(&params.rpc_url, chain_id).await?;

        let outcome = self
            .guard
            .deploy_once(client.as_ref(), &signer, &params, || {
                self.deploy_code(request, &params)
            })
            .await?;

        Ok(DeployResponse {
            receipt: outcome.receipt,
            marketplace_data: outcome.record,
            already_deployed: outcome.already_deployed,
        })
    }

    /// Creation payload: bytecode plus constructor arguments, defaulting to
    /// `[root, name, symbol, ipfs gateway]`.
    async fn deploy_code(
        &self,
        request: &DeployRequest,
        params: &DeployParams,
    ) -> Result<DeployCode, ContractError> {
        let bytecode = self
            .artifact
            .bytecode()
            .cloned()
            .ok_or_else(|| ContractError::Abi("no contract bytecode configured".into()))?;

        let requested_root = request.merkle_tree_root_hash.as_ref();
        let (args, merkle_root) = match &request.constructor_args {
            Some(args) => (args_as_strings(args), self.resolve_root(requested_root).await.ok()),
            None => {
                let root = self.resolve_root(requested_root).await?;
                let args = vec![
                    root.to_string(),
                    params.collectible_name.clone(),
                    params.collectible_symbol.clone(),
                    params.ipfs_gateway_url.clone(),
                ];
                (args, Some(root))
            }
        };

        Ok(DeployCode {
            bytecode,
            constructor_args: self.artifact.encode_constructor(&args)?,
            merkle_root,
        })
    }

    /// Send a state-changing call to the contract and wait for its receipt.
    pub async fn invoke_contract(
        &self,
        request: &InvokeRequest,
    ) -> Result<TransactionReceipt, ContractError> {
        let record = self.marketplace.load().await?;
        let contract = resolve_contract(request.contract_address.as_ref(), &record)?;
        let rpc_url = resolve_rpc_url(request.rpc_url.as_ref(), &record);
        let chain_id = request
            .chain_id
            .or(record.chain_id)
            .unwrap_or(self.default_chain_id);

        let mut args = args_as_strings(&request.parameter_values);
        let updates_root = request.function_name == UPDATE_ROOT;
        if updates_root && args.is_empty() {
            let root = self.resolve_root(request.merkle_tree_root_hash.as_ref()).await?;
            args.push(root.to_string());
        }
        let call_data = self.artifact.encode_call(&request.function_name, &args)?;

        let signer = resolve_signer(
            request.sender_address.as_ref(),
            request.sender_private_key.as_ref(),
            chain_id,
        )?;
        let client = self.connect(&rpc_url, chain_id).await?;

        let operation = TxOperation::invoke(contract, call_data);
        let receipt = self
            .pipeline
            .run(client.as_ref(), &signer, &operation, U256::ZERO)
            .await?;

        tracing::info!(
            contract = %contract,
            function = %request.function_name,
            tx_hash = %receipt.transaction_hash,
            "Contract invoked"
        );

        if updates_root {
            if let Some(root) = args.first().and_then(|a| a.parse::<B256>().ok()) {
                self.marketplace
                    .update(|record| record.merkle_root = Some(root.to_string()))
                    .await?;
            }
        }
        Ok(receipt)
    }

    /// Receipt of a mined transaction; [`BlockchainError::Pending`] while it
    /// is not mined.
    pub async fn get_transaction_receipt(
        &self,
        request: &ReceiptRequest,
    ) -> Result<TransactionReceipt, ContractError> {
        let tx_hash = request.transaction_hash.trim().parse::<TxHash>().map_err(|_| {
            ContractError::InvalidInput(format!(
                "invalid transaction hash '{}'",
                request.transaction_hash
            ))
        })?;
        let record = self.marketplace.load().await?;
        let client = self
            .connector
            .connect(&resolve_rpc_url(request.rpc_url.as_ref(), &record))?;

        self.pipeline
            .fetch_receipt(client.as_ref(), tx_hash)
            .await?
            .ok_or_else(|| {
                BlockchainError::Pending {
                    tx_hash,
                    waited_secs: 0,
                }
                .into()
            })
    }

    /// Read-only call, decoded against the ABI.
    pub async fn query_contract(&self, request: &QueryRequest) -> Result<Value, ContractError> {
        let record = self.marketplace.load().await?;
        let contract = resolve_contract(request.contract_address.as_ref(), &record)?;

        let args = if !request.parameter_values.is_empty() {
            args_as_strings(&request.parameter_values)
        } else {
            request.token_id.iter().cloned().collect()
        };
        let call_data = self.artifact.encode_call(&request.function_name, &args)?;

        let client = self
            .connector
            .connect(&resolve_rpc_url(request.rpc_url.as_ref(), &record))?;
        let output = client.call(contract, &call_data).await?;

        tracing::debug!(
            contract = %contract,
            function = %request.function_name,
            bytes = output.len(),
            "Contract queried"
        );
        self.artifact
            .decode_output(&request.function_name, args.len(), &output)
    }

    async fn connect(
        &self,
        rpc_url: &str,
        chain_id: u64,
    ) -> Result<Arc<dyn ChainClient>, ContractError> {
        let client = self.connector.connect(rpc_url)?;
        verify_chain_id(client.as_ref(), ChainId(chain_id)).await?;
        Ok(client)
    }

    /// Root given in the request, else the current whitelist root.
    async fn resolve_root(&self, requested: Option<&String>) -> Result<B256, ContractError> {
        if let Some(raw) = requested.and_then(|r| non_blank_str(r)) {
            return raw.parse().map_err(|_| {
                ContractError::InvalidInput(format!("invalid merkleTreeRootHash '{}'", raw))
            });
        }
        self.whitelist.root().await.ok_or_else(|| {
            ContractError::InvalidInput(
                "whitelist is empty and no merkleTreeRootHash was given".into(),
            )
        })
    }
}

impl std::fmt::Debug for ContractService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractService")
            .field("pipeline", &self.pipeline)
            .field("marketplace", &self.marketplace.path())
            .field("default_chain_id", &self.default_chain_id)
            .finish()
    }
}

fn non_blank_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn pick(requested: &Option<String>, recorded: &str) -> String {
    non_blank(requested).unwrap_or(recorded).to_string()
}

/// Empty result means "the connector's default endpoint".
fn resolve_rpc_url(requested: Option<&String>, record: &MarketplaceRecord) -> String {
    requested
        .and_then(|r| non_blank_str(r))
        .unwrap_or(record.rpc_url.trim())
        .to_string()
}

fn resolve_contract(
    requested: Option<&String>,
    record: &MarketplaceRecord,
) -> Result<Address, ContractError> {
    if let Some(raw) = requested.and_then(|r| non_blank_str(r)) {
        return raw
            .parse()
            .map_err(|_| ContractError::InvalidInput(format!("invalid contractAddress '{}'", raw)));
    }
    match record.deployment_state().map_err(ContractError::Consistency)? {
        DeploymentState::Deployed {
            contract_address, ..
        } => Ok(contract_address),
        _ => Err(ContractError::InvalidInput(
            "no contractAddress given and no deployment is recorded".into(),
        )),
    }
}

/// Key from the request, else the environment. A supplied sender address
/// must match the key.
fn resolve_signer(
    sender_address: Option<&String>,
    private_key: Option<&String>,
    chain_id: u64,
) -> Result<KeyedSigner, ContractError> {
    let signer = match private_key.and_then(|k| non_blank_str(k)) {
        Some(key) => KeyedSigner::from_private_key(key, chain_id)?,
        None => KeyedSigner::from_env(chain_id)?,
    };

    if let Some(raw) = sender_address.and_then(|s| non_blank_str(s)) {
        let expected: Address = raw
            .parse()
            .map_err(|_| ContractError::InvalidInput(format!("invalid senderAddress '{}'", raw)))?;
        if expected != signer.address() {
            return Err(ContractError::InvalidInput(format!(
                "senderAddress {} does not match the signing key",
                expected
            )));
        }
    }
    Ok(signer)
}
