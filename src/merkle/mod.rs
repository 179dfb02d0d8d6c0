//! Merkle whitelist subsystem.
//!
//! # Data Flow
//! ```text
//! add / remove (admin)
//!     → manager.rs (single-writer critical section)
//!     → tree.rs (full rebuild, sorted-pair hashing)
//!     → store.rs (whitelist + tree files, staged then renamed)
//!     → new root returned
//!
//! obtainProof / verifyProofOffchain (users)
//!     → manager.rs (read lock, in-memory tree)
//! ```

pub mod manager;
pub mod store;
pub mod tree;

pub use manager::{InclusionProof, MerkleWhitelistManager};
pub use store::{MerkleWhitelistStore, WhitelistSnapshot};
pub use tree::{StandardMerkleTree, TreeDump, TreeError};

use alloy::primitives::Address;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum WhitelistError {
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Address {0:#x} is already whitelisted")]
    AlreadyWhitelisted(Address),

    #[error("Address {0:#x} is not whitelisted")]
    NotWhitelisted(Address),

    #[error("No proof available for {0:#x}")]
    NotFound(Address),

    /// Whitelist and tree files disagree, or a file violates an invariant.
    #[error("Whitelist state is inconsistent: {0}")]
    Consistency(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Whitelist persistence task failed: {0}")]
    Task(String),
}

impl WhitelistError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WhitelistError::InvalidAddress(_) => ErrorKind::Input,
            WhitelistError::AlreadyWhitelisted(_) | WhitelistError::NotWhitelisted(_) => {
                ErrorKind::StateConflict
            }
            WhitelistError::NotFound(_) => ErrorKind::NotFound,
            WhitelistError::Consistency(_) => ErrorKind::Consistency,
            WhitelistError::Storage(e) => e.kind(),
            WhitelistError::Task(_) => ErrorKind::Storage,
        }
    }
}

impl From<TreeError> for WhitelistError {
    fn from(e: TreeError) -> Self {
        WhitelistError::Consistency(e.to_string())
    }
}

/// Parse a user-supplied address. Any letter case is accepted.
pub fn parse_address(input: &str) -> Result<Address, WhitelistError> {
    let trimmed = input.trim();
    if !trimmed.starts_with("0x") && !trimmed.starts_with("0X") {
        return Err(WhitelistError::InvalidAddress(input.to_string()));
    }
    trimmed
        .parse::<Address>()
        .map_err(|_| WhitelistError::InvalidAddress(input.to_string()))
}

/// Canonical on-disk spelling: lowercase, `0x`-prefixed.
pub fn normalize(address: &Address) -> String {
    format!("{:#x}", address)
}
