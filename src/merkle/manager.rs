//! Whitelist mutation API.
//!
//! # Design Decisions
//! - One writer at a time: every mutation holds the write lock from reading
//!   the current set until both files are renamed into place
//! - In-memory state changes only after persistence succeeded
//! - Every mutation rebuilds the tree from scratch
//! - File I/O runs on the blocking pool, and the in-memory swap runs there
//!   too, so a dropped caller cannot leave memory behind the files

use alloy::primitives::{Address, B256};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::merkle::store::MerkleWhitelistStore;
use crate::merkle::tree::StandardMerkleTree;
use crate::merkle::{normalize, WhitelistError};
use crate::observability::metrics;
use crate::storage::MarketplaceStore;

/// Proof payload handed to users for minting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InclusionProof {
    /// Leaf value as stored, one element per leaf column.
    pub value: Vec<String>,
    pub proof: Vec<B256>,
}

#[derive(Debug)]
struct WhitelistState {
    addresses: Vec<Address>,
    tree: StandardMerkleTree,
}

#[derive(Debug)]
pub struct MerkleWhitelistManager {
    store: MerkleWhitelistStore,
    state: Arc<RwLock<WhitelistState>>,
}

impl MerkleWhitelistManager {
    /// Load persisted state.
    ///
    /// Divergent files fail with a consistency error unless `rebuild` is set,
    /// in which case the tree is regenerated from the address list. A missing
    /// tree file is always regenerated.
    pub fn open(store: MerkleWhitelistStore, rebuild: bool) -> Result<Self, WhitelistError> {
        let state = if rebuild {
            let addresses = store.load_addresses()?;
            let tree = StandardMerkleTree::of(&addresses);
            store.persist(&addresses, &tree)?;
            tracing::warn!(size = addresses.len(), "Merkle tree rebuilt from whitelist file");
            WhitelistState { addresses, tree }
        } else {
            let snapshot = store.load()?;
            if snapshot.tree_missing && !snapshot.addresses.is_empty() {
                store.persist(&snapshot.addresses, &snapshot.tree)?;
                tracing::info!(size = snapshot.addresses.len(), "Tree file absent, built from whitelist");
            }
            WhitelistState {
                addresses: snapshot.addresses,
                tree: snapshot.tree,
            }
        };

        metrics::set_whitelist_size(state.addresses.len());
        tracing::info!(
            size = state.addresses.len(),
            root = ?state.tree.root(),
            "Whitelist loaded"
        );

        Ok(Self {
            store,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Append `address` and return the new root.
    pub async fn add(&self, address: Address) -> Result<B256, WhitelistError> {
        let result = self
            .mutate(move |addresses| {
                if addresses.contains(&address) {
                    return Err(WhitelistError::AlreadyWhitelisted(address));
                }
                addresses.push(address);
                Ok(())
            })
            .await;
        record_outcome("add", &result);

        let root = result?.ok_or_else(|| {
            WhitelistError::Consistency("non-empty whitelist produced no root".into())
        })?;
        tracing::info!(address = %normalize(&address), root = %root, "Address whitelisted");
        Ok(root)
    }

    /// Remove `address` and return the new root (`None` once empty).
    pub async fn remove(&self, address: Address) -> Result<Option<B256>, WhitelistError> {
        let result = self
            .mutate(move |addresses| {
                let index = addresses
                    .iter()
                    .position(|a| *a == address)
                    .ok_or(WhitelistError::NotWhitelisted(address))?;
                addresses.remove(index);
                Ok(())
            })
            .await;
        record_outcome("remove", &result);

        let root = result?;
        tracing::info!(address = %normalize(&address), root = ?root, "Address removed from whitelist");
        Ok(root)
    }

    /// Rebuild and persist from the current set.
    pub async fn rebuild(&self) -> Result<Option<B256>, WhitelistError> {
        let result = self.mutate(|_| Ok(())).await;
        record_outcome("rebuild", &result);
        result
    }

    /// Re-read the whitelist file, rebuild the tree from it, and publish the
    /// root into the marketplace record.
    pub async fn start_merkle_tree(
        &self,
        marketplace: &MarketplaceStore,
    ) -> Result<Option<B256>, WhitelistError> {
        let result = self.reload_from_file().await;
        record_outcome("start", &result);
        let root = result?;

        marketplace
            .update(|record| record.merkle_root = root.map(|r| r.to_string()))
            .await?;
        tracing::info!(root = ?root, "Merkle tree started");
        Ok(root)
    }

    pub async fn root(&self) -> Option<B256> {
        self.state.read().await.tree.root()
    }

    pub async fn addresses(&self) -> Vec<Address> {
        self.state.read().await.addresses.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.addresses.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Proof for a member; [`WhitelistError::NotFound`] otherwise.
    pub async fn obtain_proof(&self, address: Address) -> Result<InclusionProof, WhitelistError> {
        let state = self.state.read().await;
        let proof = state
            .tree
            .proof(address)
            .ok_or(WhitelistError::NotFound(address))?;
        Ok(InclusionProof {
            value: vec![normalize(&address)],
            proof,
        })
    }

    /// Check `proof` against the current root.
    pub async fn verify_offchain(&self, address: Address, proof: &[B256]) -> bool {
        self.state.read().await.tree.verify(address, proof)
    }

    async fn reload_from_file(&self) -> Result<Option<B256>, WhitelistError> {
        self.commit(|store, _| store.load_addresses()).await
    }

    /// Apply `change` to a copy of the set, rebuild, persist, then swap.
    async fn mutate<F>(&self, change: F) -> Result<Option<B256>, WhitelistError>
    where
        F: FnOnce(&mut Vec<Address>) -> Result<(), WhitelistError> + Send + 'static,
    {
        self.commit(move |_, current| {
            let mut addresses = current.to_vec();
            change(&mut addresses)?;
            Ok(addresses)
        })
        .await
    }

    /// Derive the next set, persist it with its tree, and swap it in, all on
    /// the blocking pool under the write lock.
    async fn commit<F>(&self, next: F) -> Result<Option<B256>, WhitelistError>
    where
        F: FnOnce(&MerkleWhitelistStore, &[Address]) -> Result<Vec<Address>, WhitelistError>
            + Send
            + 'static,
    {
        let mut state = self.state.clone().write_owned().await;
        let store = self.store.clone();

        tokio::task::spawn_blocking(move || {
            let addresses = next(&store, &state.addresses)?;
            let tree = StandardMerkleTree::of(&addresses);
            store.persist(&addresses, &tree)?;

            let root = tree.root();
            metrics::set_whitelist_size(addresses.len());
            *state = WhitelistState { addresses, tree };
            Ok(root)
        })
        .await
        .map_err(|e| WhitelistError::Task(e.to_string()))?
    }
}

fn record_outcome<T>(op: &'static str, result: &Result<T, WhitelistError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    metrics::record_whitelist_mutation(op, outcome);
}
