//! Shared utilities for integration tests.
#![allow(dead_code)]

use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use mint_gate::blockchain::types::RawReceipt;
use mint_gate::blockchain::{BlockchainError, BlockchainResult, ChainClient, ChainConnector};
use mint_gate::config::AppConfig;

pub const CHAIN_ID: u64 = 31337;

/// First Hardhat/Anvil development account.
pub const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

pub const ADMIN_KEY: &str = "test-admin-key";

#[derive(Default)]
struct MockState {
    nonces: HashMap<Address, u64>,
    last_sender: Address,
    head: u64,
    mined: HashMap<TxHash, RawReceipt>,
    unmined: HashMap<TxHash, RawReceipt>,
    call_output: Bytes,
    calls: Vec<(Address, Bytes)>,
}

/// In-memory chain. Decodes every broadcast, enforces nonces, and mines
/// each transaction into its own block unless mining is paused.
pub struct MockChain {
    chain_id: u64,
    state: Mutex<MockState>,
    mining: AtomicBool,
    revert: AtomicBool,
    broadcasts: AtomicU32,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(MockState {
                head: 100,
                ..Default::default()
            }),
            mining: AtomicBool::new(true),
            revert: AtomicBool::new(false),
            broadcasts: AtomicU32::new(0),
        }
    }

    pub fn broadcast_count(&self) -> u32 {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn set_mining(&self, mining: bool) {
        self.mining.store(mining, Ordering::SeqCst);
    }

    pub fn set_revert(&self, revert: bool) {
        self.revert.store(revert, Ordering::SeqCst);
    }

    /// Mine everything broadcast while mining was paused.
    pub fn mine_pending(&self) {
        let mut state = self.state.lock().unwrap();
        let unmined: Vec<_> = state.unmined.drain().collect();
        for (hash, mut receipt) in unmined {
            state.head += 1;
            receipt.block_number = Some(state.head);
            receipt.block_hash = Some(B256::left_padding_from(&state.head.to_be_bytes()));
            state.mined.insert(hash, receipt);
        }
    }

    /// Add empty blocks on top of the head.
    pub fn advance(&self, blocks: u64) {
        self.state.lock().unwrap().head += blocks;
    }

    pub fn set_call_output(&self, output: Bytes) {
        self.state.lock().unwrap().call_output = output;
    }

    pub fn calls(&self) -> Vec<(Address, Bytes)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mined_receipt(&self, hash: TxHash) -> Option<RawReceipt> {
        self.state.lock().unwrap().mined.get(&hash).cloned()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> BlockchainResult<u64> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        Ok(self.state.lock().unwrap().head)
    }

    async fn nonce(&self, address: Address) -> BlockchainResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.last_sender = address;
        Ok(state.nonces.get(&address).copied().unwrap_or(0))
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        Ok(2_000_000_000)
    }

    async fn estimate_gas(
        &self,
        _from: Address,
        to: Option<Address>,
        _data: &Bytes,
        _value: U256,
    ) -> BlockchainResult<u64> {
        Ok(if to.is_none() { 1_000_000 } else { 60_000 })
    }

    async fn broadcast(&self, raw: &Bytes) -> BlockchainResult<TxHash> {
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| BlockchainError::Broadcast(format!("undecodable transaction: {}", e)))?;
        let hash = keccak256(raw);

        let mut state = self.state.lock().unwrap();
        let sender = state.last_sender;
        let expected = state.nonces.get(&sender).copied().unwrap_or(0);
        if envelope.nonce() != expected {
            return Err(BlockchainError::Broadcast(format!(
                "nonce too low: expected {}, got {}",
                expected,
                envelope.nonce()
            )));
        }
        state.nonces.insert(sender, expected + 1);
        self.broadcasts.fetch_add(1, Ordering::SeqCst);

        let to = envelope.to();
        let mut receipt = RawReceipt {
            transaction_hash: hash,
            block_hash: None,
            block_number: None,
            from: sender,
            to,
            contract_address: to.is_none().then(|| sender.create(expected)),
            gas_used: 50_000,
            status: !self.revert.load(Ordering::SeqCst),
        };

        if self.mining.load(Ordering::SeqCst) {
            state.head += 1;
            receipt.block_number = Some(state.head);
            receipt.block_hash = Some(B256::left_padding_from(&state.head.to_be_bytes()));
            state.mined.insert(hash, receipt);
        } else {
            state.unmined.insert(hash, receipt);
        }
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<RawReceipt>> {
        Ok(self.state.lock().unwrap().mined.get(&tx_hash).cloned())
    }

    async fn call(&self, to: Address, data: &Bytes) -> BlockchainResult<Bytes> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((to, data.clone()));
        Ok(state.call_output.clone())
    }
}

/// Hands out the same [`MockChain`] for every URL and remembers the URLs.
pub struct MockConnector {
    pub chain: Arc<MockChain>,
    urls: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(chain: Arc<MockChain>) -> Self {
        Self {
            chain,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl ChainConnector for MockConnector {
    fn connect(&self, rpc_url: &str) -> BlockchainResult<Arc<dyn ChainClient>> {
        self.urls.lock().unwrap().push(rpc_url.to_string());
        Ok(self.chain.clone() as Arc<dyn ChainClient>)
    }
}

/// Wraps a [`MockChain`]: broadcasts still reach the chain, but the next
/// `lose_replies` answers are replaced by a timeout. While lookups are down,
/// receipt and nonce queries fail too.
pub struct LossyChain {
    pub inner: Arc<MockChain>,
    lose_replies: AtomicU32,
    outage_on_loss: AtomicBool,
    lookups_down: AtomicBool,
}

impl LossyChain {
    pub fn new(inner: Arc<MockChain>) -> Self {
        Self {
            inner,
            lose_replies: AtomicU32::new(0),
            outage_on_loss: AtomicBool::new(false),
            lookups_down: AtomicBool::new(false),
        }
    }

    /// Lose the next `count` broadcast replies. With `outage`, each lost
    /// reply also takes lookups down.
    pub fn lose_replies(&self, count: u32, outage: bool) {
        self.lose_replies.store(count, Ordering::SeqCst);
        self.outage_on_loss.store(outage, Ordering::SeqCst);
    }

    pub fn set_lookups_down(&self, down: bool) {
        self.lookups_down.store(down, Ordering::SeqCst);
    }

    fn lookup_guard(&self) -> BlockchainResult<()> {
        if self.lookups_down.load(Ordering::SeqCst) {
            return Err(BlockchainError::Rpc("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for LossyChain {
    async fn chain_id(&self) -> BlockchainResult<u64> {
        self.inner.chain_id().await
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        self.inner.block_number().await
    }

    async fn nonce(&self, address: Address) -> BlockchainResult<u64> {
        self.lookup_guard()?;
        self.inner.nonce(address).await
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        self.inner.gas_price().await
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Option<Address>,
        data: &Bytes,
        value: U256,
    ) -> BlockchainResult<u64> {
        self.inner.estimate_gas(from, to, data, value).await
    }

    async fn broadcast(&self, raw: &Bytes) -> BlockchainResult<TxHash> {
        let tx_hash = self.inner.broadcast(raw).await?;
        let remaining = self.lose_replies.load(Ordering::SeqCst);
        if remaining > 0 {
            self.lose_replies.store(remaining - 1, Ordering::SeqCst);
            if self.outage_on_loss.load(Ordering::SeqCst) {
                self.lookups_down.store(true, Ordering::SeqCst);
            }
            return Err(BlockchainError::Timeout(10));
        }
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<RawReceipt>> {
        self.lookup_guard()?;
        self.inner.receipt(tx_hash).await
    }

    async fn call(&self, to: Address, data: &Bytes) -> BlockchainResult<Bytes> {
        self.inner.call(to, data).await
    }
}

/// Hands out one fixed client for every URL.
pub struct FixedConnector(pub Arc<dyn ChainClient>);

impl ChainConnector for FixedConnector {
    fn connect(&self, _rpc_url: &str) -> BlockchainResult<Arc<dyn ChainClient>> {
        Ok(self.0.clone())
    }
}

/// Configuration with every file under `dir`, fast polling, and a
/// placeholder bytecode file.
pub fn test_config(dir: &Path) -> AppConfig {
    let bytecode_path = dir.join("Marketplace.bin");
    std::fs::write(&bytecode_path, "0x6080604052348015600f57600080fd5b50").unwrap();

    let mut config = AppConfig::default();
    config.storage.whitelist_path = path_string(&dir.join("whitelistAddresses.json"));
    config.storage.tree_path = path_string(&dir.join("tree.json"));
    config.storage.marketplace_path = path_string(&dir.join("marketplaceData.json"));
    config.storage.contract_abi_path = format!(
        "{}/contracts/Marketplace.abi.json",
        env!("CARGO_MANIFEST_DIR")
    );
    config.storage.contract_bytecode_path = Some(path_string(&bytecode_path));

    config.blockchain.chain_id = CHAIN_ID;
    config.blockchain.poll_interval_ms = 1;
    config.blockchain.max_poll_interval_ms = 5;
    config.blockchain.receipt_timeout_secs = 1;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 2;
    config.admin.api_key = ADMIN_KEY.to_string();
    config
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `0x` + 40 copies of `digit`.
pub fn address_of(digit: char) -> String {
    format!("0x{}", digit.to_string().repeat(40))
}
