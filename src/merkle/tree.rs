//! Sorted-pair Merkle tree over addresses, in the `standard-v1` layout.
//!
//! The tree is a flat array: the root at index 0, children of `i` at
//! `2i + 1` and `2i + 2`, and the leaves at the tail in descending hash order.
//! Leaf hash is `keccak256(keccak256(abi.encode(address)))`; internal nodes
//! hash their two children in ascending byte order, so the root does not
//! depend on insertion order.

use alloy::primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dump format identifier.
pub const FORMAT: &str = "standard-v1";

/// ABI type of every leaf value.
pub const LEAF_ENCODING: &str = "address";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Unsupported tree format: {0}")]
    Format(String),

    #[error("Invalid tree: {0}")]
    Integrity(String),
}

/// `keccak256(keccak256(abi.encode(address)))`.
pub fn leaf_hash(address: Address) -> B256 {
    keccak256(keccak256(address.into_word()))
}

/// Order-independent node combination.
pub fn hash_pair(a: &B256, b: &B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo.as_slice());
    buf[32..].copy_from_slice(hi.as_slice());
    keccak256(buf)
}

/// Fold a proof onto a leaf.
pub fn process_proof(leaf: B256, proof: &[B256]) -> B256 {
    proof.iter().fold(leaf, |acc, sibling| hash_pair(&acc, sibling))
}

/// `true` when `proof` links `address` to `root`.
pub fn verify_proof(root: &B256, address: Address, proof: &[B256]) -> bool {
    process_proof(leaf_hash(address), proof) == *root
}

fn left_child(i: usize) -> usize {
    2 * i + 1
}

fn sibling(i: usize) -> usize {
    if i % 2 == 1 {
        i + 1
    } else {
        i - 1
    }
}

fn parent(i: usize) -> usize {
    (i - 1) / 2
}

/// A value and the array slot holding its leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedValue {
    pub value: Address,
    pub tree_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardMerkleTree {
    tree: Vec<B256>,
    /// Insertion order of the source list.
    values: Vec<IndexedValue>,
}

impl StandardMerkleTree {
    /// Build from addresses in list order. An empty list gives an empty tree
    /// without a root.
    pub fn of(addresses: &[Address]) -> Self {
        let n = addresses.len();
        if n == 0 {
            return Self {
                tree: Vec::new(),
                values: Vec::new(),
            };
        }

        let mut hashed: Vec<(B256, usize)> = addresses
            .iter()
            .enumerate()
            .map(|(i, a)| (leaf_hash(*a), i))
            .collect();
        hashed.sort();

        let len = 2 * n - 1;
        let mut tree = vec![B256::ZERO; len];
        for (leaf_index, (hash, _)) in hashed.iter().enumerate() {
            tree[len - 1 - leaf_index] = *hash;
        }
        for i in (0..len - n).rev() {
            tree[i] = hash_pair(&tree[left_child(i)], &tree[left_child(i) + 1]);
        }

        let mut values: Vec<IndexedValue> = addresses
            .iter()
            .map(|a| IndexedValue {
                value: *a,
                tree_index: 0,
            })
            .collect();
        for (leaf_index, (_, value_index)) in hashed.iter().enumerate() {
            values[*value_index].tree_index = len - 1 - leaf_index;
        }

        Self { tree, values }
    }

    pub fn root(&self) -> Option<B256> {
        self.tree.first().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[IndexedValue] {
        &self.values
    }

    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.values.iter().map(|v| v.value)
    }

    /// Sibling hashes from the leaf of `address` up to the root.
    /// Linear scan; `None` for non-members.
    pub fn proof(&self, address: Address) -> Option<Vec<B256>> {
        let entry = self.values.iter().find(|v| v.value == address)?;
        let mut index = entry.tree_index;
        let mut proof = Vec::new();
        while index > 0 {
            proof.push(self.tree[sibling(index)]);
            index = parent(index);
        }
        Some(proof)
    }

    /// Verify against this tree's root. Always `false` for an empty tree.
    pub fn verify(&self, address: Address, proof: &[B256]) -> bool {
        self.root()
            .map(|root| verify_proof(&root, address, proof))
            .unwrap_or(false)
    }

    /// Check every node and leaf slot against the values.
    pub fn validate(&self) -> Result<(), TreeError> {
        let n = self.values.len();
        if n == 0 {
            return if self.tree.is_empty() {
                Ok(())
            } else {
                Err(TreeError::Integrity("nodes present without values".into()))
            };
        }
        if self.tree.len() != 2 * n - 1 {
            return Err(TreeError::Integrity(format!(
                "{} values need {} nodes, found {}",
                n,
                2 * n - 1,
                self.tree.len()
            )));
        }

        let first_leaf = self.tree.len() - n;
        let mut seen = vec![false; self.tree.len()];
        for v in &self.values {
            if v.tree_index < first_leaf || v.tree_index >= self.tree.len() {
                return Err(TreeError::Integrity(format!(
                    "treeIndex {} of {} is not a leaf slot",
                    v.tree_index, v.value
                )));
            }
            if std::mem::replace(&mut seen[v.tree_index], true) {
                return Err(TreeError::Integrity(format!(
                    "treeIndex {} is used twice",
                    v.tree_index
                )));
            }
            if self.tree[v.tree_index] != leaf_hash(v.value) {
                return Err(TreeError::Integrity(format!(
                    "leaf hash mismatch for {}",
                    v.value
                )));
            }
        }

        for i in 0..first_leaf {
            let expected = hash_pair(&self.tree[left_child(i)], &self.tree[left_child(i) + 1]);
            if self.tree[i] != expected {
                return Err(TreeError::Integrity(format!("node {} does not match its children", i)));
            }
        }
        Ok(())
    }

    pub fn dump(&self) -> TreeDump {
        TreeDump {
            format: FORMAT.to_string(),
            leaf_encoding: vec![LEAF_ENCODING.to_string()],
            tree: self.tree.clone(),
            values: self
                .values
                .iter()
                .map(|v| DumpValue {
                    value: vec![format!("{:#x}", v.value)],
                    tree_index: v.tree_index,
                })
                .collect(),
        }
    }

    /// Rebuild from a dump and validate it.
    pub fn load(dump: TreeDump) -> Result<Self, TreeError> {
        if dump.format != FORMAT {
            return Err(TreeError::Format(dump.format));
        }
        if dump.leaf_encoding.len() != 1 || dump.leaf_encoding[0] != LEAF_ENCODING {
            return Err(TreeError::Format(format!(
                "leaf encoding {:?}",
                dump.leaf_encoding
            )));
        }

        let values = dump
            .values
            .into_iter()
            .map(|v| {
                let raw = match v.value.as_slice() {
                    [single] => single,
                    other => {
                        return Err(TreeError::Integrity(format!(
                            "expected one value per leaf, found {}",
                            other.len()
                        )))
                    }
                };
                let value = raw
                    .parse::<Address>()
                    .map_err(|e| TreeError::Integrity(format!("bad address '{}': {}", raw, e)))?;
                Ok(IndexedValue {
                    value,
                    tree_index: v.tree_index,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tree = Self {
            tree: dump.tree,
            values,
        };
        tree.validate()?;
        Ok(tree)
    }
}

/// Serialized tree, compatible with `StandardMerkleTree.dump()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeDump {
    pub format: String,
    pub leaf_encoding: Vec<String>,
    pub tree: Vec<B256>,
    pub values: Vec<DumpValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpValue {
    pub value: Vec<String>,
    pub tree_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    fn a() -> Address {
        Address::repeat_byte(0x11)
    }
    fn b() -> Address {
        Address::repeat_byte(0x22)
    }
    fn c() -> Address {
        Address::repeat_byte(0x33)
    }

    #[test]
    fn test_leaf_hash_matches_reference() {
        assert_eq!(
            leaf_hash(a()),
            b256!("a7409058568815d08a7ad3c7d4fd44cf1dec90c620cb31e55ad24c654f7ba34f")
        );
    }

    #[test]
    fn test_reference_roots() {
        let two = StandardMerkleTree::of(&[a(), b()]);
        assert_eq!(
            two.root(),
            Some(b256!("c6ce8ae383124b268df66d71f0af2206e6dafb13eba0b03806eed8a4e7991329"))
        );

        let three = StandardMerkleTree::of(&[a(), b(), c()]);
        assert_eq!(
            three.root(),
            Some(b256!("ae6afff7b7c4d883d5efd44afa0b98e80317697e8984b4c2de7c54b49c1c4dd4"))
        );
        let indices: Vec<usize> = three.values().iter().map(|v| v.tree_index).collect();
        assert_eq!(indices, vec![3, 4, 2]);
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let tree = StandardMerkleTree::of(&[b()]);
        assert_eq!(tree.root(), Some(leaf_hash(b())));
        assert_eq!(tree.proof(b()), Some(vec![]));
        assert!(tree.verify(b(), &[]));
    }

    #[test]
    fn test_empty_tree_has_no_root() {
        let tree = StandardMerkleTree::of(&[]);
        assert!(tree.root().is_none());
        assert!(tree.proof(a()).is_none());
        assert!(!tree.verify(a(), &[]));
        tree.validate().unwrap();
    }

    #[test]
    fn test_root_ignores_order() {
        let addresses: Vec<Address> = (1..=7u8).map(Address::repeat_byte).collect();
        let forward = StandardMerkleTree::of(&addresses).root();
        let mut reversed = addresses.clone();
        reversed.reverse();
        let mut rotated = addresses.clone();
        rotated.rotate_left(3);
        assert_eq!(forward, StandardMerkleTree::of(&reversed).root());
        assert_eq!(forward, StandardMerkleTree::of(&rotated).root());
    }

    #[test]
    fn test_every_member_proof_verifies() {
        let addresses: Vec<Address> = (1..=11u8).map(Address::repeat_byte).collect();
        let tree = StandardMerkleTree::of(&addresses);
        for address in &addresses {
            let proof = tree.proof(*address).unwrap();
            assert!(tree.verify(*address, &proof));
        }
    }

    #[test]
    fn test_forged_proof_fails() {
        let tree = StandardMerkleTree::of(&[a(), b(), c()]);
        let proof = tree.proof(a()).unwrap();
        let outsider = Address::repeat_byte(0x44);
        assert!(tree.proof(outsider).is_none());
        assert!(!tree.verify(outsider, &proof));
        assert!(!tree.verify(b(), &proof));
    }

    #[test]
    fn test_dump_shape() {
        let dump = StandardMerkleTree::of(&[a(), b()]).dump();
        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["format"], "standard-v1");
        assert_eq!(json["leafEncoding"][0], "address");
        assert_eq!(json["tree"].as_array().unwrap().len(), 3);
        assert_eq!(
            json["values"][0]["value"][0],
            "0x1111111111111111111111111111111111111111"
        );
        assert_eq!(json["values"][0]["treeIndex"], 1);
    }

    #[test]
    fn test_load_rejects_tampering() {
        let tree = StandardMerkleTree::of(&[a(), b(), c()]);
        assert_eq!(StandardMerkleTree::load(tree.dump()).unwrap(), tree);

        let mut dump = tree.dump();
        dump.tree[0] = B256::ZERO;
        assert!(matches!(
            StandardMerkleTree::load(dump),
            Err(TreeError::Integrity(_))
        ));

        let mut dump = tree.dump();
        dump.values[0].tree_index = 0;
        assert!(StandardMerkleTree::load(dump).is_err());

        let mut dump = tree.dump();
        dump.format = "simple-v1".into();
        assert!(matches!(
            StandardMerkleTree::load(dump),
            Err(TreeError::Format(_))
        ));
    }
}
