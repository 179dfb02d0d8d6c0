//! At-most-once deployment of the marketplace contract.
//!
//! # State Machine
//! ```text
//! NotDeployed ──broadcast──▶ Pending{hash} ──receipt ok──▶ Deployed{address, hash}
//!                                 │
//!                                 └──reverted──▶ NotDeployed
//! ```
//! The signed hash is written to the record before it is broadcast. A crash
//! or a lost reply after that point resumes by polling the recorded hash;
//! a second creation is only signed once the first is known to be dropped.

use alloy::primitives::{Bytes, TxHash, B256, U256};
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::blockchain::{
    BlockchainError, BroadcastJournal, ChainClient, KeyedSigner, SignedTransaction,
    TransactionPipeline, TransactionReceipt, TxOperation,
};
use crate::contract::ContractError;
use crate::observability::metrics;
use crate::storage::{DeploymentState, MarketplaceRecord, MarketplaceStore};

/// Deployment settings written into the record alongside the hash.
#[derive(Debug, Clone)]
pub struct DeployParams {
    pub rpc_url: String,
    pub chain_id: u64,
    pub collectible_name: String,
    pub collectible_symbol: String,
    pub ipfs_gateway_url: String,
}

/// Creation payload, only produced when a broadcast will actually happen.
#[derive(Debug, Clone)]
pub struct DeployCode {
    pub bytecode: Bytes,
    /// ABI-encoded constructor arguments.
    pub constructor_args: Bytes,
    pub merkle_root: Option<B256>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOutcome {
    pub receipt: TransactionReceipt,
    /// Record after the call, with the signing key redacted.
    pub record: MarketplaceRecord,
    /// No transaction was sent by this call.
    pub already_deployed: bool,
}

#[derive(Debug)]
pub struct DeploymentGuard {
    marketplace: Arc<MarketplaceStore>,
    pipeline: Arc<TransactionPipeline>,
    /// Serializes whole deploy calls; the record lock alone is per write.
    serial: Mutex<()>,
}

impl DeploymentGuard {
    pub fn new(marketplace: Arc<MarketplaceStore>, pipeline: Arc<TransactionPipeline>) -> Self {
        Self {
            marketplace,
            pipeline,
            serial: Mutex::new(()),
        }
    }

    /// Deploy unless the record says it already happened.
    ///
    /// - Deployed: re-fetch the stored receipt, send nothing
    /// - Pending: resume polling the stored hash, send nothing
    /// - NotDeployed: run `code`, record each signed hash, broadcast, confirm
    ///
    /// `code` is not called unless the record is NotDeployed.
    pub async fn deploy_once<F, Fut>(
        &self,
        client: &dyn ChainClient,
        signer: &KeyedSigner,
        params: &DeployParams,
        code: F,
    ) -> Result<DeploymentOutcome, ContractError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DeployCode, ContractError>>,
    {
        let _serial = self.serial.lock().await;

        let record = self.marketplace.load().await?;
        let state = record
            .deployment_state()
            .map_err(ContractError::Consistency)?;

        match state {
            DeploymentState::Deployed {
                contract_address,
                tx_hash,
            } => {
                let receipt = self
                    .pipeline
                    .fetch_receipt(client, tx_hash)
                    .await?
                    .ok_or_else(|| {
                        ContractError::Consistency(format!(
                            "contract {} is recorded as deployed by {} but no receipt is retrievable",
                            contract_address, tx_hash
                        ))
                    })?;
                tracing::info!(
                    contract_address = %contract_address,
                    tx_hash = %tx_hash,
                    confirmations = receipt.confirmations,
                    "Contract already deployed, returning stored deployment"
                );
                Ok(DeploymentOutcome {
                    receipt,
                    record: record.redacted(),
                    already_deployed: true,
                })
            }
            DeploymentState::Pending { tx_hash } => {
                tracing::warn!(tx_hash = %tx_hash, "Resuming pending deployment");
                self.confirm(client, tx_hash, true).await
            }
            DeploymentState::NotDeployed => {
                let code = code().await?;
                let operation = TxOperation::deploy(&code.bytecode, &code.constructor_args);
                let journal = PendingDeployment {
                    marketplace: &self.marketplace,
                    params,
                    merkle_root: code.merkle_root,
                    admin_address: signer.address().to_checksum(None),
                };
                let tx_hash = self
                    .pipeline
                    .submit_journaled(client, signer, &operation, U256::ZERO, &journal)
                    .await?;
                self.confirm(client, tx_hash, false).await
            }
        }
    }

    async fn confirm(
        &self,
        client: &dyn ChainClient,
        tx_hash: TxHash,
        resumed: bool,
    ) -> Result<DeploymentOutcome, ContractError> {
        let receipt = self.pipeline.await_receipt(client, tx_hash, None).await?;

        if !receipt.status {
            metrics::record_transaction("deploy", "reverted");
            self.marketplace
                .update(|record| {
                    if record.transaction_hash.parse::<TxHash>().ok() == Some(tx_hash) {
                        record.transaction_hash.clear();
                    }
                })
                .await?;
            tracing::warn!(tx_hash = %tx_hash, "Deployment reverted, pending hash cleared");
            return Err(BlockchainError::Reverted(tx_hash).into());
        }

        let contract_address = receipt.contract_address.ok_or_else(|| {
            ContractError::Consistency(format!(
                "deployment receipt for {} carries no contract address",
                tx_hash
            ))
        })?;

        let record = self
            .marketplace
            .update(|record| {
                record.is_updated = true;
                record.contract_address = contract_address.to_checksum(None);
                record.transaction_hash = tx_hash.to_string();
            })
            .await?;
        metrics::record_transaction("deploy", "confirmed");

        tracing::info!(
            contract_address = %contract_address,
            tx_hash = %tx_hash,
            block_number = receipt.block_number,
            resumed = resumed,
            "Contract deployed"
        );
        Ok(DeploymentOutcome {
            receipt,
            record: record.redacted(),
            already_deployed: false,
        })
    }
}

/// Keeps the record's pending hash in step with what is on the wire.
struct PendingDeployment<'a> {
    marketplace: &'a MarketplaceStore,
    params: &'a DeployParams,
    merkle_root: Option<B256>,
    admin_address: String,
}

#[async_trait]
impl<'a> BroadcastJournal for PendingDeployment<'a> {
    type Error = ContractError;

    async fn record(&self, signed: &SignedTransaction) -> Result<(), ContractError> {
        let tx_hash = signed.hash();
        let params = self.params;
        self.marketplace
            .update(|record| {
                record.is_updated = false;
                record.transaction_hash = tx_hash.to_string();
                record.contract_address.clear();
                record.rpc_url = params.rpc_url.clone();
                record.chain_id = Some(params.chain_id);
                record.admin_address = self.admin_address.clone();
                record.merkle_root = self.merkle_root.map(|r| r.to_string());
                record.erc721_collectible_name = params.collectible_name.clone();
                record.erc721_collectible_symbol = params.collectible_symbol.clone();
                record.ipfs_gateway_url = params.ipfs_gateway_url.clone();
            })
            .await?;
        tracing::info!(
            tx_hash = %tx_hash,
            nonce = signed.unsigned().nonce,
            "Deployment hash recorded before broadcast"
        );
        Ok(())
    }

    async fn discard(&self, signed: &SignedTransaction) -> Result<(), ContractError> {
        let tx_hash = signed.hash();
        self.marketplace
            .update(|record| {
                if record.transaction_hash.parse::<TxHash>().ok() == Some(tx_hash) {
                    record.transaction_hash.clear();
                }
            })
            .await?;
        tracing::warn!(tx_hash = %tx_hash, "Deployment never reached the chain, hash cleared");
        Ok(())
    }
}
