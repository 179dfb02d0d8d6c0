//! Transaction values and the builder that fills in their dynamic fields.
//!
//! # Responsibilities
//! - Describe a logical operation (deploy or invoke)
//! - Fetch nonce, gas price and gas estimate from the chain
//! - Apply the fixed gas safety margin
//! - Turn a signature into an immutable, wire-encoded signed transaction

use alloy::consensus::{SignableTransaction, Signed, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, B256, U256};
use alloy::signers::Signature;
use serde::Serialize;

use crate::blockchain::client::ChainClient;
use crate::blockchain::types::{BlockchainConfig, BlockchainError, BlockchainResult};

/// Safety margin added on top of the node's gas estimate.
pub const GAS_MARGIN_PERCENT: u64 = 15;

/// `floor(estimate * 1.15)`, saturating at `u64::MAX`.
pub fn apply_gas_margin(estimate: u64) -> u64 {
    let padded = u128::from(estimate) * u128::from(100 + GAS_MARGIN_PERCENT) / 100;
    u64::try_from(padded).unwrap_or(u64::MAX)
}

/// A logical on-chain operation, before any chain state is consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOperation {
    /// Contract creation. `init_code` is the bytecode followed by the
    /// ABI-encoded constructor arguments.
    Deploy { init_code: Bytes },
    /// Call into an existing contract with pre-encoded call data.
    Invoke { contract: Address, call_data: Bytes },
}

impl TxOperation {
    pub fn deploy(bytecode: &[u8], constructor_args: &[u8]) -> Self {
        let mut init_code = Vec::with_capacity(bytecode.len() + constructor_args.len());
        init_code.extend_from_slice(bytecode);
        init_code.extend_from_slice(constructor_args);
        TxOperation::Deploy {
            init_code: init_code.into(),
        }
    }

    pub fn invoke(contract: Address, call_data: Bytes) -> Self {
        TxOperation::Invoke {
            contract,
            call_data,
        }
    }

    /// Destination, `None` for contract creation.
    pub fn to(&self) -> Option<Address> {
        match self {
            TxOperation::Deploy { .. } => None,
            TxOperation::Invoke { contract, .. } => Some(*contract),
        }
    }

    pub fn data(&self) -> &Bytes {
        match self {
            TxOperation::Deploy { init_code } => init_code,
            TxOperation::Invoke { call_data, .. } => call_data,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TxOperation::Deploy { .. } => "deploy",
            TxOperation::Invoke { .. } => "invoke",
        }
    }
}

/// Legacy (pre-EIP-1559) transaction with every field resolved.
///
/// Serializes with numeric fields as big-endian hex quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTransaction {
    #[serde(with = "alloy::serde::quantity")]
    pub nonce: u64,
    #[serde(with = "alloy::serde::quantity")]
    pub gas_limit: u64,
    #[serde(with = "alloy::serde::quantity")]
    pub gas_price: u128,
    pub value: U256,
    /// Empty for contract creation.
    pub to: Option<Address>,
    pub data: Bytes,
    #[serde(with = "alloy::serde::quantity")]
    pub chain_id: u64,
}

impl UnsignedTransaction {
    pub fn is_deploy(&self) -> bool {
        self.to.is_none()
    }

    fn to_legacy(&self) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: self.to.map(TxKind::Call).unwrap_or(TxKind::Create),
            value: self.value,
            input: self.data.clone(),
        }
    }

    /// EIP-155 digest the signer must sign.
    pub fn signing_hash(&self) -> B256 {
        self.to_legacy().signature_hash()
    }
}

/// An unsigned transaction plus its signature, already wire-encoded.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    unsigned: UnsignedTransaction,
    signature: Signature,
    hash: TxHash,
    raw: Bytes,
}

impl SignedTransaction {
    pub(crate) fn new(unsigned: UnsignedTransaction, signature: Signature) -> Self {
        let signed: Signed<TxLegacy> = unsigned.to_legacy().into_signed(signature);
        let hash = *signed.hash();
        let raw = Bytes::from(TxEnvelope::from(signed).encoded_2718());
        Self {
            unsigned,
            signature,
            hash,
            raw,
        }
    }

    pub fn unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// RLP bytes ready for `eth_sendRawTransaction`.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn r(&self) -> U256 {
        self.signature.r()
    }

    pub fn s(&self) -> U256 {
        self.signature.s()
    }

    /// EIP-155 `v`: `chain_id * 2 + 35 + y_parity`.
    pub fn v(&self) -> u64 {
        self.unsigned.chain_id * 2 + 35 + u64::from(self.signature.v())
    }
}

/// Assembles unsigned transactions from chain state.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    /// Gas price ceiling in gwei; 0 disables the check.
    max_gas_price_gwei: u64,
}

impl TransactionBuilder {
    pub fn new(max_gas_price_gwei: u64) -> Self {
        Self { max_gas_price_gwei }
    }

    pub fn from_config(config: &BlockchainConfig) -> Self {
        Self::new(config.max_gas_price_gwei)
    }

    /// Build a contract-creation transaction.
    pub async fn build_deploy(
        &self,
        client: &dyn ChainClient,
        bytecode: &[u8],
        constructor_args: &[u8],
        sender: Address,
        value: U256,
        chain_id: u64,
    ) -> BlockchainResult<UnsignedTransaction> {
        let operation = TxOperation::deploy(bytecode, constructor_args);
        self.build(client, &operation, sender, value, chain_id).await
    }

    /// Build a contract-call transaction.
    pub async fn build_invoke(
        &self,
        client: &dyn ChainClient,
        contract: Address,
        call_data: Bytes,
        sender: Address,
        value: U256,
        chain_id: u64,
    ) -> BlockchainResult<UnsignedTransaction> {
        let operation = TxOperation::invoke(contract, call_data);
        self.build(client, &operation, sender, value, chain_id).await
    }

    /// Resolve nonce, gas price and gas limit for an operation.
    ///
    /// Any RPC failure surfaces as [`BlockchainError::Estimation`]; nothing
    /// downstream may sign on failure.
    pub async fn build(
        &self,
        client: &dyn ChainClient,
        operation: &TxOperation,
        sender: Address,
        value: U256,
        chain_id: u64,
    ) -> BlockchainResult<UnsignedTransaction> {
        let nonce = client
            .nonce(sender)
            .await
            .map_err(|e| BlockchainError::Estimation(format!("nonce lookup failed: {}", e)))?;

        let gas_price = client
            .gas_price()
            .await
            .map_err(|e| BlockchainError::Estimation(format!("gas price lookup failed: {}", e)))?;

        let gas_price_gwei = gas_price / 1_000_000_000;
        if self.max_gas_price_gwei > 0 && gas_price_gwei > u128::from(self.max_gas_price_gwei) {
            return Err(BlockchainError::GasPriceTooHigh {
                current_gwei: u64::try_from(gas_price_gwei).unwrap_or(u64::MAX),
                max_gwei: self.max_gas_price_gwei,
            });
        }

        let to = operation.to();
        let data = operation.data().clone();
        let estimate = client
            .estimate_gas(sender, to, &data, value)
            .await
            .map_err(|e| BlockchainError::Estimation(format!("gas estimation failed: {}", e)))?;
        let gas_limit = apply_gas_margin(estimate);

        tracing::debug!(
            operation = operation.label(),
            sender = %sender,
            nonce = nonce,
            gas_price = gas_price,
            gas_estimate = estimate,
            gas_limit = gas_limit,
            "Transaction built"
        );

        Ok(UnsignedTransaction {
            nonce,
            gas_limit,
            gas_price,
            value,
            to,
            data,
            chain_id,
        })
    }
}
