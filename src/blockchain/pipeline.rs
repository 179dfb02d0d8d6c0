//! Build → sign → broadcast → confirm orchestration.
//!
//! # Responsibilities
//! - Serialize operations per sender from nonce fetch through broadcast
//! - Poll for receipts with backoff until a deadline
//! - Normalize receipts against the chain head
//! - Apply the rebuild-transaction retry policy
//!
//! # Failure Semantics
//! - Signing failures are returned as-is and never retried
//! - Failures before a successful broadcast are retried by rebuilding from
//!   scratch (fresh nonce, fresh gas price, new signature)
//! - A broadcast error is reconciled against the chain before any rebuild:
//!   a transaction that landed anyway is never signed a second time
//! - A [`BroadcastJournal`] sees every signed hash before it is sent
//! - A receipt timeout returns [`BlockchainError::Pending`] with the hash;
//!   the transaction stays on the wire and callers resume by polling

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::blockchain::client::ChainClient;
use crate::blockchain::transaction::{
    SignedTransaction, TransactionBuilder, TxOperation, UnsignedTransaction,
};
use crate::blockchain::types::{
    BlockchainConfig, BlockchainError, BlockchainResult, TransactionReceipt,
};
use crate::blockchain::wallet::KeyedSigner;
use crate::config::RetryConfig;
use crate::error::RetryHint;
use crate::observability::metrics;
use crate::resilience::backoff::{calculate_backoff, PollSchedule};

/// Durable note of signed transactions, written before they are sent.
///
/// `record` failing aborts the attempt before broadcast. `discard` is only
/// called for a transaction known not to have reached the chain.
#[async_trait]
pub trait BroadcastJournal: Send + Sync {
    type Error: From<BlockchainError> + std::fmt::Display + Send;

    async fn record(&self, signed: &SignedTransaction) -> Result<(), Self::Error>;

    async fn discard(&self, signed: &SignedTransaction) -> Result<(), Self::Error>;
}

/// Journal for operations that keep no record of their own.
struct Unjournaled;

#[async_trait]
impl BroadcastJournal for Unjournaled {
    type Error = BlockchainError;

    async fn record(&self, _signed: &SignedTransaction) -> BlockchainResult<()> {
        Ok(())
    }

    async fn discard(&self, _signed: &SignedTransaction) -> BlockchainResult<()> {
        Ok(())
    }
}

/// Where a transaction stands after its broadcast call returned an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastStatus {
    /// Mined, or its nonce is taken in the pending pool.
    Landed,
    /// No receipt and the nonce is still free.
    Dropped,
    /// The chain could not be asked.
    Unknown,
}

/// Orchestrates transactions for any number of senders.
pub struct TransactionPipeline {
    builder: TransactionBuilder,
    /// One lock per sender address; held from nonce fetch through broadcast.
    sender_locks: DashMap<Address, Arc<Mutex<()>>>,
    poll_interval: Duration,
    max_poll_interval: Duration,
    receipt_timeout: Duration,
    retries: RetryConfig,
}

impl TransactionPipeline {
    pub fn new(builder: TransactionBuilder, config: &BlockchainConfig, retries: RetryConfig) -> Self {
        Self {
            builder,
            sender_locks: DashMap::new(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_interval: Duration::from_millis(config.max_poll_interval_ms),
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
            retries,
        }
    }

    pub fn from_config(config: &BlockchainConfig, retries: RetryConfig) -> Self {
        Self::new(TransactionBuilder::from_config(config), config, retries)
    }

    pub fn builder(&self) -> &TransactionBuilder {
        &self.builder
    }

    pub fn receipt_timeout(&self) -> Duration {
        self.receipt_timeout
    }

    fn sender_lock(&self, sender: Address) -> Arc<Mutex<()>> {
        self.sender_locks
            .entry(sender)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Sign a prepared transaction, broadcast it and wait for its receipt.
    ///
    /// The caller owns nonce discipline for `unsigned`; prefer [`Self::run`],
    /// which builds under the sender lock.
    pub async fn execute(
        &self,
        unsigned: UnsignedTransaction,
        signer: &KeyedSigner,
        client: &dyn ChainClient,
    ) -> BlockchainResult<TransactionReceipt> {
        let signed = signer.sign(unsigned).await?;
        let tx_hash = self.broadcast(client, &signed).await?;
        let receipt = self.await_receipt(client, tx_hash, None).await?;
        ensure_succeeded(receipt)
    }

    /// Build, sign and broadcast under the sender lock. Returns the hash.
    pub async fn submit(
        &self,
        client: &dyn ChainClient,
        signer: &KeyedSigner,
        operation: &TxOperation,
        value: U256,
    ) -> BlockchainResult<TxHash> {
        let lock = self.sender_lock(signer.address());
        let _guard = lock.lock().await;

        let signed = self.prepare(client, signer, operation, value).await?;
        self.broadcast(client, &signed).await
    }

    /// Build and sign. The caller holds the sender lock.
    async fn prepare(
        &self,
        client: &dyn ChainClient,
        signer: &KeyedSigner,
        operation: &TxOperation,
        value: U256,
    ) -> BlockchainResult<SignedTransaction> {
        let unsigned = self
            .builder
            .build(client, operation, signer.address(), value, signer.chain_id())
            .await?;
        signer.sign(unsigned).await
    }

    /// [`Self::submit`] with the rebuild-transaction retry policy applied.
    pub async fn submit_with_retry(
        &self,
        client: &dyn ChainClient,
        signer: &KeyedSigner,
        operation: &TxOperation,
        value: U256,
    ) -> BlockchainResult<TxHash> {
        self.submit_journaled(client, signer, operation, value, &Unjournaled)
            .await
    }

    /// Submit with retries, handing each signed transaction to `journal`
    /// before it is broadcast.
    ///
    /// A broadcast error is reconciled first. A landed transaction returns
    /// its hash. An unknown outcome returns [`BlockchainError::Pending`] so
    /// the caller polls instead of signing again. Only a dropped transaction
    /// is discarded and rebuilt.
    pub async fn submit_journaled<J: BroadcastJournal>(
        &self,
        client: &dyn ChainClient,
        signer: &KeyedSigner,
        operation: &TxOperation,
        value: U256,
        journal: &J,
    ) -> Result<TxHash, J::Error> {
        let sender = signer.address();
        let max_attempts = self.retries.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let failure = {
                let lock = self.sender_lock(sender);
                let _guard = lock.lock().await;

                match self.prepare(client, signer, operation, value).await {
                    Err(e) => e,
                    Ok(signed) => {
                        journal.record(&signed).await?;
                        let error = match self.broadcast(client, &signed).await {
                            Ok(tx_hash) => return Ok(tx_hash),
                            Err(e) => e,
                        };
                        match self.reconcile(client, sender, &signed).await {
                            BroadcastStatus::Landed => {
                                tracing::warn!(
                                    tx_hash = %signed.hash(),
                                    error = %error,
                                    "Broadcast reported an error but the transaction reached the chain"
                                );
                                return Ok(signed.hash());
                            }
                            BroadcastStatus::Unknown => {
                                metrics::record_transaction(operation.label(), "unknown");
                                return Err(BlockchainError::Pending {
                                    tx_hash: signed.hash(),
                                    waited_secs: 0,
                                }
                                .into());
                            }
                            BroadcastStatus::Dropped => {
                                journal.discard(&signed).await?;
                                error
                            }
                        }
                    }
                }
            };

            if attempt < max_attempts && failure.retry_hint() == RetryHint::RebuildTransaction {
                let delay = calculate_backoff(
                    attempt,
                    self.retries.base_delay_ms,
                    self.retries.max_delay_ms,
                );
                tracing::warn!(
                    operation = operation.label(),
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "Rebuilding transaction after failure"
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            metrics::record_transaction(operation.label(), "failed");
            return Err(failure.into());
        }
    }

    /// Decide whether `signed` reached the chain after its broadcast failed.
    ///
    /// The nonce check reads the pending-inclusive count, so a transaction
    /// sitting in the pool counts as landed.
    pub async fn reconcile(
        &self,
        client: &dyn ChainClient,
        sender: Address,
        signed: &SignedTransaction,
    ) -> BroadcastStatus {
        let tx_hash = signed.hash();
        match client.receipt(tx_hash).await {
            Ok(Some(_)) => return BroadcastStatus::Landed,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(tx_hash = %tx_hash, error = %e, "Receipt lookup failed during reconcile");
                return BroadcastStatus::Unknown;
            }
        }
        match client.nonce(sender).await {
            Ok(next) if next > signed.unsigned().nonce => BroadcastStatus::Landed,
            Ok(_) => BroadcastStatus::Dropped,
            Err(e) => {
                tracing::warn!(tx_hash = %tx_hash, error = %e, "Nonce lookup failed during reconcile");
                BroadcastStatus::Unknown
            }
        }
    }

    /// Full run for one logical operation: submit with retries, then wait.
    ///
    /// A mined but reverted transaction is reported as [`BlockchainError::Reverted`].
    pub async fn run(
        &self,
        client: &dyn ChainClient,
        signer: &KeyedSigner,
        operation: &TxOperation,
        value: U256,
    ) -> BlockchainResult<TransactionReceipt> {
        let tx_hash = self.submit_with_retry(client, signer, operation, value).await?;
        let receipt = self.await_receipt(client, tx_hash, None).await?;
        let outcome = if receipt.status { "confirmed" } else { "reverted" };
        metrics::record_transaction(operation.label(), outcome);
        ensure_succeeded(receipt)
    }

    /// Send signed bytes. The signed value is consumed logically here; a
    /// retry must go through the builder again.
    pub async fn broadcast(
        &self,
        client: &dyn ChainClient,
        signed: &SignedTransaction,
    ) -> BlockchainResult<TxHash> {
        let tx_hash = client.broadcast(signed.raw()).await?;
        if tx_hash != signed.hash() {
            tracing::warn!(
                expected = %signed.hash(),
                reported = %tx_hash,
                "Node reported a different transaction hash"
            );
        }
        tracing::info!(
            tx_hash = %tx_hash,
            nonce = signed.unsigned().nonce,
            gas_limit = signed.unsigned().gas_limit,
            deploy = signed.unsigned().is_deploy(),
            "Transaction broadcast"
        );
        Ok(tx_hash)
    }

    /// Poll until the transaction is mined or `timeout` (default: the
    /// configured receipt timeout) elapses.
    ///
    /// RPC errors while polling are logged and polling continues; the
    /// transaction is already on the wire.
    pub async fn await_receipt(
        &self,
        client: &dyn ChainClient,
        tx_hash: TxHash,
        timeout: Option<Duration>,
    ) -> BlockchainResult<TransactionReceipt> {
        let start = Instant::now();
        let timeout = timeout.unwrap_or(self.receipt_timeout);
        let mut schedule = PollSchedule::new(self.poll_interval, self.max_poll_interval, timeout);

        loop {
            match self.fetch_receipt(client, tx_hash).await {
                Ok(Some(receipt)) => {
                    metrics::record_receipt_wait(start);
                    tracing::info!(
                        tx_hash = %tx_hash,
                        block_number = receipt.block_number,
                        gas_used = receipt.gas_used,
                        status = receipt.status,
                        polls = schedule.attempts() + 1,
                        "Receipt received"
                    );
                    return Ok(receipt);
                }
                Ok(None) => {
                    tracing::debug!(tx_hash = %tx_hash, "Transaction not mined yet");
                }
                Err(e) => {
                    tracing::warn!(tx_hash = %tx_hash, error = %e, "Receipt poll failed");
                }
            }

            match schedule.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    tracing::warn!(
                        tx_hash = %tx_hash,
                        waited_secs = start.elapsed().as_secs(),
                        "Receipt wait timed out, transaction still pending"
                    );
                    return Err(BlockchainError::Pending {
                        tx_hash,
                        waited_secs: start.elapsed().as_secs(),
                    });
                }
            }
        }
    }

    /// One receipt lookup, normalized against the current head.
    pub async fn fetch_receipt(
        &self,
        client: &dyn ChainClient,
        tx_hash: TxHash,
    ) -> BlockchainResult<Option<TransactionReceipt>> {
        let raw = match client.receipt(tx_hash).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let head = client.block_number().await?;
        Ok(TransactionReceipt::from_raw(raw, head))
    }
}

fn ensure_succeeded(receipt: TransactionReceipt) -> BlockchainResult<TransactionReceipt> {
    if receipt.status {
        Ok(receipt)
    } else {
        Err(BlockchainError::Reverted(receipt.transaction_hash))
    }
}

impl std::fmt::Debug for TransactionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionPipeline")
            .field("builder", &self.builder)
            .field("senders", &self.sender_locks.len())
            .field("receipt_timeout", &self.receipt_timeout)
            .finish()
    }
}
