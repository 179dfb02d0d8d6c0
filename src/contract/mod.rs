//! Marketplace contract operations.
//!
//! # Data Flow
//! ```text
//! typed request (types.rs)
//!     → service.rs (resolve endpoint, signer, chain id check)
//!     → artifact.rs (ABI encoding of string arguments)
//!     → deployment.rs (at-most-once guard) or TransactionPipeline directly
//!     → TransactionReceipt
//! ```

pub mod artifact;
pub mod deployment;
pub mod service;
pub mod types;

pub use artifact::ContractArtifact;
pub use deployment::{DeployCode, DeployParams, DeploymentGuard, DeploymentOutcome};
pub use service::ContractService;

use alloy::primitives::TxHash;
use thiserror::Error;

use crate::blockchain::BlockchainError;
use crate::error::{ErrorKind, RetryHint};
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error(transparent)]
    Chain(#[from] BlockchainError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// ABI or bytecode unusable.
    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Deployment record violates an invariant.
    #[error("Deployment record is inconsistent: {0}")]
    Consistency(String),
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::Chain(e) => e.kind(),
            ContractError::Storage(e) => e.kind(),
            ContractError::Abi(_) | ContractError::InvalidInput(_) => ErrorKind::Input,
            ContractError::Consistency(_) => ErrorKind::Consistency,
        }
    }

    pub fn retry_hint(&self) -> RetryHint {
        match self {
            ContractError::Chain(e) => e.retry_hint(),
            _ => RetryHint::None,
        }
    }

    pub fn transaction_hash(&self) -> Option<TxHash> {
        match self {
            ContractError::Chain(e) => e.transaction_hash(),
            _ => None,
        }
    }
}
