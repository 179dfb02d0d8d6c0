//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! TxOperation (deploy / invoke)
//!     → transaction.rs (nonce, gas price, estimate + 15%)
//!     → wallet.rs (EIP-155 signature → SignedTransaction)
//!     → BroadcastJournal (hash recorded before it leaves)
//!     → client.rs (eth_sendRawTransaction)
//!     → pipeline.rs (reconcile, receipt polling, normalization, retry policy)
//! ```
//!
//! # Security Constraints
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts
//! - Signed transactions are immutable and broadcast at most once

pub mod client;
pub mod pipeline;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::{verify_chain_id, ChainClient, ChainConnector, RpcChainClient, RpcConnector};
pub use pipeline::{BroadcastJournal, BroadcastStatus, TransactionPipeline};
pub use transaction::{SignedTransaction, TransactionBuilder, TxOperation, UnsignedTransaction};
pub use types::{BlockchainConfig, BlockchainError, BlockchainResult, ChainId, TransactionReceipt};
pub use wallet::KeyedSigner;
