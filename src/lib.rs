//! Merkle-whitelisted NFT minting gate.
//!
//! An administrator maintains a whitelist of addresses summarized by a
//! Merkle root, deploys the marketplace contract once, and pushes new roots
//! on-chain. Users fetch inclusion proofs to mint.

// Core subsystems
pub mod blockchain;
pub mod contract;
pub mod merkle;
pub mod storage;

// Outer surface
pub mod config;
pub mod http;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::AppConfig;
pub use error::{ErrorKind, RetryHint};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
