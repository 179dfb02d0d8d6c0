//! Chain-specific types and error definitions.

use alloy::primitives::{Address, TxHash, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorKind, RetryHint};

// Re-export BlockchainConfig from config module to avoid duplication
pub use crate::config::schema::BlockchainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Nonce, gas price or gas estimate could not be obtained.
    #[error("Estimation error: {0}")]
    Estimation(String),

    /// Invalid private key format or signing failure.
    #[error("Signing error: {0}")]
    Signing(String),

    /// The node refused the signed transaction.
    #[error("Broadcast error: {0}")]
    Broadcast(String),

    /// Broadcast succeeded but no receipt arrived before the deadline.
    #[error("Transaction {tx_hash} still pending after {waited_secs} seconds")]
    Pending { tx_hash: TxHash, waited_secs: u64 },

    /// Transaction was reverted on-chain.
    #[error("Transaction reverted: {0}")]
    Reverted(TxHash),

    /// Gas price exceeded maximum allowed.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Caller supplied something unusable (address, hash, URL).
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BlockchainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlockchainError::Rpc(_)
            | BlockchainError::Timeout(_)
            | BlockchainError::Estimation(_)
            | BlockchainError::Broadcast(_)
            | BlockchainError::GasPriceTooHigh { .. } => ErrorKind::Network,
            BlockchainError::Pending { .. } => ErrorKind::Pending,
            BlockchainError::Signing(_) => ErrorKind::Signing,
            BlockchainError::Reverted(_) => ErrorKind::StateConflict,
            BlockchainError::ChainMismatch { .. } | BlockchainError::InvalidInput(_) => {
                ErrorKind::Input
            }
        }
    }

    /// Retry policy for this failure. Anything that failed before or during
    /// broadcast is retried by rebuilding; a pending transaction is only polled.
    pub fn retry_hint(&self) -> RetryHint {
        match self {
            BlockchainError::Rpc(_)
            | BlockchainError::Timeout(_)
            | BlockchainError::Estimation(_)
            | BlockchainError::Broadcast(_)
            | BlockchainError::GasPriceTooHigh { .. } => RetryHint::RebuildTransaction,
            BlockchainError::Pending { .. } => RetryHint::ResumePolling,
            _ => RetryHint::None,
        }
    }

    /// Hash of the in-flight transaction, when the error refers to one.
    pub fn transaction_hash(&self) -> Option<TxHash> {
        match self {
            BlockchainError::Pending { tx_hash, .. } | BlockchainError::Reverted(tx_hash) => {
                Some(*tx_hash)
            }
            _ => None,
        }
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Receipt fields as returned by the node, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReceipt {
    pub transaction_hash: TxHash,
    pub block_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    pub status: bool,
}

impl From<alloy::rpc::types::TransactionReceipt> for RawReceipt {
    fn from(receipt: alloy::rpc::types::TransactionReceipt) -> Self {
        use alloy::network::ReceiptResponse as _;

        Self {
            transaction_hash: receipt.transaction_hash,
            block_hash: receipt.block_hash,
            block_number: receipt.block_number,
            from: receipt.from,
            to: receipt.to,
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used,
            status: receipt.status(),
        }
    }
}

/// Normalized receipt handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub block_hash: B256,
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    /// Only set for contract creation.
    pub contract_address: Option<Address>,
    pub transaction_hash: TxHash,
    pub gas_used: u64,
    pub status: bool,
    /// Blocks mined on top of the receipt's block at query time.
    pub confirmations: u64,
}

impl TransactionReceipt {
    /// Normalize a mined receipt against the current chain head.
    ///
    /// Returns `None` when the node reports the receipt without block data,
    /// which some nodes do for transactions still in the pending block.
    pub fn from_raw(raw: RawReceipt, head_block: u64) -> Option<Self> {
        let block_number = raw.block_number?;
        let block_hash = raw.block_hash?;
        Some(Self {
            block_hash,
            block_number,
            from: raw.from,
            to: raw.to,
            contract_address: raw.contract_address,
            transaction_hash: raw.transaction_hash,
            gas_used: raw.gas_used,
            status: raw.status,
            confirmations: head_block.saturating_sub(block_number),
        })
    }
}
