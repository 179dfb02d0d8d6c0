//! File-backed persistence.
//!
//! # Design Decisions
//! - Every write replaces the whole file: serialize to a temporary sibling,
//!   fsync, then rename over the target
//! - Readers never observe a half-written file
//! - Stores are injected into managers; nothing reads these files ambiently

pub mod json_file;
pub mod marketplace;

pub use json_file::{
    read_json, remove_file_if_exists, write_json_atomic, StagedWrite, StorageError,
};
pub use marketplace::{DeploymentState, MarketplaceRecord, MarketplaceStore, MarketplaceUpdate};
