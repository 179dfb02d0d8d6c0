//! Key holding and EIP-155 transaction signing.
//!
//! # Security
//! - Keys come from the environment or from the request that uses them
//! - Keys are never logged or serialized

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;

use crate::blockchain::transaction::{SignedTransaction, UnsignedTransaction};
use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Environment variable name for the default admin private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "MINT_GATE_ADMIN_PRIVATE_KEY";

/// A private key bound to one chain.
#[derive(Debug, Clone)]
pub struct KeyedSigner {
    /// The underlying signer (private key).
    signer: PrivateKeySigner,
    /// Chain ID for EIP-155 replay protection.
    chain_id: u64,
}

impl KeyedSigner {
    /// Create a signer from a hex-encoded private key string.
    ///
    /// # Arguments
    /// * `private_key_hex` - Hex string (with or without 0x prefix)
    /// * `chain_id` - Chain ID for transaction signing
    pub fn from_private_key(private_key_hex: &str, chain_id: u64) -> BlockchainResult<Self> {
        let key_hex = private_key_hex
            .trim()
            .strip_prefix("0x")
            .unwrap_or(private_key_hex.trim());

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BlockchainError::Signing(format!("Invalid private key format: {}", e)))?;

        tracing::debug!(
            address = %signer.address(),
            chain_id = chain_id,
            "Signer initialized"
        );

        Ok(Self { signer, chain_id })
    }

    /// Load the signer from `MINT_GATE_ADMIN_PRIVATE_KEY`.
    pub fn from_env(chain_id: u64) -> BlockchainResult<Self> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| {
            BlockchainError::Signing(format!(
                "Environment variable {} not set",
                PRIVATE_KEY_ENV_VAR
            ))
        })?;

        Self::from_private_key(&private_key, chain_id)
    }

    /// Get the signer's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Get the chain ID this signer is bound to.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sign an unsigned transaction, producing a new immutable signed value.
    ///
    /// Fails without retry if the transaction targets another chain or the
    /// key cannot produce a signature.
    pub async fn sign(&self, tx: UnsignedTransaction) -> BlockchainResult<SignedTransaction> {
        if tx.chain_id != self.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.chain_id,
                actual: tx.chain_id,
            });
        }

        let hash = tx.signing_hash();
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| BlockchainError::Signing(format!("Signing failed: {}", e)))?;

        Ok(SignedTransaction::new(tx, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, U256};

    // Well-known test private key (Anvil's first account)
    const TEST_PRIVATE_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn unsigned(chain_id: u64) -> UnsignedTransaction {
        UnsignedTransaction {
            nonce: 0,
            gas_limit: 21_000,
            gas_price: 1_000_000_000,
            value: U256::ZERO,
            to: Some(Address::repeat_byte(0x42)),
            data: Bytes::new(),
            chain_id,
        }
    }

    #[test]
    fn test_signer_from_private_key() {
        let signer = KeyedSigner::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();
        assert_eq!(
            signer.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_signer_with_0x_prefix() {
        let signer = KeyedSigner::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY), 1).unwrap();
        assert_eq!(
            signer.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_invalid_private_key() {
        let result = KeyedSigner::from_private_key("invalid_key", 1);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Invalid private key"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Signing);
    }

    #[tokio::test]
    async fn test_sign_rejects_foreign_chain() {
        let signer = KeyedSigner::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();
        let err = signer.sign(unsigned(5)).await.unwrap_err();
        assert!(matches!(
            err,
            BlockchainError::ChainMismatch {
                expected: 1,
                actual: 5
            }
        ));
    }

    #[tokio::test]
    async fn test_sign_embeds_chain_in_v() {
        let signer = KeyedSigner::from_private_key(TEST_PRIVATE_KEY, 1337).unwrap();
        let signed = signer.sign(unsigned(1337)).await.unwrap();
        let v = signed.v();
        assert!(v == 1337 * 2 + 35 || v == 1337 * 2 + 36);
    }
}
