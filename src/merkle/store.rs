//! Persisted whitelist set plus its derived tree.
//!
//! # Commit Protocol
//! 1. Stage both files next to their targets
//! 2. Write a commit marker naming the new root
//! 3. Rename the tree, then the list; the list rename is the commit point
//! 4. Remove the marker
//!
//! A marker found at load time means step 3 may have stopped half way. The
//! list is authoritative then and the tree is regenerated from it.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::merkle::tree::{StandardMerkleTree, TreeDump};
use crate::merkle::{normalize, parse_address, WhitelistError};
use crate::storage::json_file::{read_json, remove_file_if_exists, write_json_atomic, StagedWrite};

/// `{ "addresses": [...] }`
#[derive(Debug, Default, Serialize, Deserialize)]
struct WhitelistFile {
    #[serde(default)]
    addresses: Vec<String>,
}

/// Present only while `persist` is renaming files.
#[derive(Debug, Serialize, Deserialize)]
struct CommitMarker {
    root: Option<B256>,
}

/// Addresses and tree as loaded together.
#[derive(Debug, Clone)]
pub struct WhitelistSnapshot {
    pub addresses: Vec<Address>,
    pub tree: StandardMerkleTree,
    /// The tree file was absent and the tree was derived from the addresses.
    pub tree_missing: bool,
}

#[derive(Debug, Clone)]
pub struct MerkleWhitelistStore {
    whitelist_path: PathBuf,
    tree_path: PathBuf,
}

impl MerkleWhitelistStore {
    pub fn new(whitelist_path: impl Into<PathBuf>, tree_path: impl Into<PathBuf>) -> Self {
        Self {
            whitelist_path: whitelist_path.into(),
            tree_path: tree_path.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.whitelist_path, &config.tree_path)
    }

    pub fn whitelist_path(&self) -> &Path {
        &self.whitelist_path
    }

    pub fn tree_path(&self) -> &Path {
        &self.tree_path
    }

    /// Ordered, de-duplicated address list. Absent file reads as empty.
    pub fn load_addresses(&self) -> Result<Vec<Address>, WhitelistError> {
        let file: WhitelistFile = read_json(&self.whitelist_path)?.unwrap_or_default();
        let mut seen = HashSet::with_capacity(file.addresses.len());
        let mut addresses = Vec::with_capacity(file.addresses.len());
        for raw in &file.addresses {
            let address = parse_address(raw).map_err(|_| {
                WhitelistError::Consistency(format!(
                    "{} holds an invalid address '{}'",
                    self.whitelist_path.display(),
                    raw
                ))
            })?;
            if !seen.insert(address) {
                return Err(WhitelistError::Consistency(format!(
                    "{} lists {} more than once",
                    self.whitelist_path.display(),
                    normalize(&address)
                )));
            }
            addresses.push(address);
        }
        Ok(addresses)
    }

    fn marker_path(&self) -> PathBuf {
        let mut name = self
            .tree_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".commit");
        self.tree_path.with_file_name(name)
    }

    /// Load both files and check that the tree was built from the list.
    pub fn load(&self) -> Result<WhitelistSnapshot, WhitelistError> {
        self.finish_interrupted_commit()?;
        let addresses = self.load_addresses()?;

        let dump: Option<TreeDump> = read_json(&self.tree_path)?;
        let Some(dump) = dump else {
            return Ok(WhitelistSnapshot {
                tree: StandardMerkleTree::of(&addresses),
                addresses,
                tree_missing: true,
            });
        };

        let tree = StandardMerkleTree::load(dump)?;
        let tree_addresses: Vec<Address> = tree.addresses().collect();
        if tree_addresses != addresses {
            return Err(WhitelistError::Consistency(format!(
                "{} was built from {} addresses but {} lists {}",
                self.tree_path.display(),
                tree_addresses.len(),
                self.whitelist_path.display(),
                addresses.len()
            )));
        }

        Ok(WhitelistSnapshot {
            addresses,
            tree,
            tree_missing: false,
        })
    }

    /// Write both files. Both are fully staged before either is renamed into
    /// place, so a failed staging leaves the previous pair untouched.
    pub fn persist(
        &self,
        addresses: &[Address],
        tree: &StandardMerkleTree,
    ) -> Result<(), WhitelistError> {
        let file = WhitelistFile {
            addresses: addresses.iter().map(normalize).collect(),
        };
        let staged_list = StagedWrite::stage(&self.whitelist_path, &file)?;
        let staged_tree = StagedWrite::stage(&self.tree_path, &tree.dump())?;

        let marker = self.marker_path();
        write_json_atomic(&marker, &CommitMarker { root: tree.root() })?;
        staged_tree.commit()?;
        staged_list.commit()?;

        if let Err(e) = remove_file_if_exists(&marker) {
            // Committed already; the next load regenerates the same tree.
            tracing::warn!(marker = %marker.display(), error = %e, "Commit marker left behind");
        }

        tracing::debug!(
            whitelist = %self.whitelist_path.display(),
            tree = %self.tree_path.display(),
            size = addresses.len(),
            "Whitelist persisted"
        );
        Ok(())
    }

    /// Regenerate the tree from the list if a previous `persist` stopped
    /// between its renames.
    fn finish_interrupted_commit(&self) -> Result<(), WhitelistError> {
        let marker_path = self.marker_path();
        let marker: Option<CommitMarker> = read_json(&marker_path)?;
        let Some(marker) = marker else {
            return Ok(());
        };

        let addresses = self.load_addresses()?;
        let tree = StandardMerkleTree::of(&addresses);
        write_json_atomic(&self.tree_path, &tree.dump())?;
        remove_file_if_exists(&marker_path)?;

        tracing::warn!(
            interrupted_root = ?marker.root,
            root = ?tree.root(),
            size = addresses.len(),
            "Interrupted whitelist commit found, tree regenerated from the list"
        );
        Ok(())
    }
}
