//! Deployment/marketplace record file.
//!
//! A flat JSON object shared with external tooling. Keys this crate does not
//! know about are carried through every rewrite unchanged.

use alloy::primitives::{Address, TxHash};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::storage::json_file::{read_json, write_json_atomic, StorageError};

const REDACTED: &str = "<redacted>";

/// On-disk shape of `marketplaceData.json`.
///
/// `isUpdated` is the deployed flag. Once it is `true`, `contractAddress`
/// and `transactionHash` are never rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceRecord {
    #[serde(default)]
    pub is_updated: bool,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub admin_address: String,
    #[serde(default)]
    pub admin_private_key: String,
    #[serde(default)]
    pub merkle_root: Option<String>,
    #[serde(default)]
    pub erc721_collectible_name: String,
    #[serde(default)]
    pub erc721_collectible_symbol: String,
    #[serde(default)]
    pub ipfs_gateway_url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Where the canonical deployment stands, derived from the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    NotDeployed,
    /// Broadcast happened; the receipt was never recorded.
    Pending { tx_hash: TxHash },
    Deployed { contract_address: Address, tx_hash: TxHash },
}

/// Fields settable through `setMarketplaceData`. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceUpdate {
    pub rpc_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub chain_id: Option<u64>,
    pub collectible_name: Option<String>,
    pub collectible_symbol: Option<String>,
    pub ipfs_gateway_url: Option<String>,
}

impl MarketplaceRecord {
    /// Interpret the deployment fields.
    ///
    /// A record flagged as deployed whose address or hash does not parse is
    /// reported as an error; it must never be treated as "not deployed".
    pub fn deployment_state(&self) -> Result<DeploymentState, String> {
        let tx_hash = non_empty(&self.transaction_hash)
            .map(|h| {
                h.parse::<TxHash>()
                    .map_err(|e| format!("invalid transactionHash '{}': {}", h, e))
            })
            .transpose()?;

        if self.is_updated {
            let tx_hash = tx_hash.ok_or("record is marked deployed without a transactionHash")?;
            let address = non_empty(&self.contract_address)
                .ok_or("record is marked deployed without a contractAddress")?;
            let contract_address = address
                .parse::<Address>()
                .map_err(|e| format!("invalid contractAddress '{}': {}", address, e))?;
            return Ok(DeploymentState::Deployed {
                contract_address,
                tx_hash,
            });
        }

        Ok(match tx_hash {
            Some(tx_hash) => DeploymentState::Pending { tx_hash },
            None => DeploymentState::NotDeployed,
        })
    }

    /// Copy with the signing key masked, for serving over the API.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.admin_private_key.is_empty() {
            copy.admin_private_key = REDACTED.to_string();
        }
        copy
    }

    pub fn apply(&mut self, update: &MarketplaceUpdate) {
        if let Some(rpc_url) = &update.rpc_url {
            self.rpc_url = rpc_url.clone();
        }
        if let Some(chain_id) = update.chain_id {
            self.chain_id = Some(chain_id);
        }
        if let Some(name) = &update.collectible_name {
            self.erc721_collectible_name = name.clone();
        }
        if let Some(symbol) = &update.collectible_symbol {
            self.erc721_collectible_symbol = symbol.clone();
        }
        if let Some(url) = &update.ipfs_gateway_url {
            self.ipfs_gateway_url = url.clone();
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Accept `1337`, `"1337"`, `""` and `null`.
pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u64),
        Str(String),
    }

    match Option::<NumOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrString::Num(n)) => Ok(Some(n)),
        Some(NumOrString::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(NumOrString::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid chainId '{}'", s))),
    }
}

/// Serialized read-modify-write access to the record file.
#[derive(Debug)]
pub struct MarketplaceStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MarketplaceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record; an absent file reads as an empty record.
    pub async fn load(&self) -> Result<MarketplaceRecord, StorageError> {
        let _guard = self.lock.lock().await;
        self.read()
    }

    /// Apply `mutate` and rewrite the whole file. Returns the new record.
    pub async fn update<F>(&self, mutate: F) -> Result<MarketplaceRecord, StorageError>
    where
        F: FnOnce(&mut MarketplaceRecord),
    {
        let _guard = self.lock.lock().await;
        let mut record = self.read()?;
        mutate(&mut record);
        write_json_atomic(&self.path, &record)?;
        tracing::debug!(path = %self.path.display(), "Marketplace record written");
        Ok(record)
    }

    fn read(&self) -> Result<MarketplaceRecord, StorageError> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let record: MarketplaceRecord = serde_json::from_value(json!({
            "isUpdated": false,
            "chainId": "1337",
            "deployedBy": "ops",
        }))
        .unwrap();
        assert_eq!(record.chain_id, Some(1337));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["deployedBy"], "ops");
        assert_eq!(value["chainId"], 1337);
        assert!(value.get("erc721CollectibleName").is_some());
        assert!(value.get("ipfsGatewayUrl").is_some());
    }

    #[test]
    fn test_deployment_state_from_record() {
        let mut record = MarketplaceRecord::default();
        assert_eq!(record.deployment_state().unwrap(), DeploymentState::NotDeployed);

        let hash = TxHash::repeat_byte(0xab);
        record.transaction_hash = hash.to_string();
        assert_eq!(
            record.deployment_state().unwrap(),
            DeploymentState::Pending { tx_hash: hash }
        );

        record.is_updated = true;
        assert!(record.deployment_state().is_err());

        record.contract_address = Address::repeat_byte(0x01).to_string();
        assert_eq!(
            record.deployment_state().unwrap(),
            DeploymentState::Deployed {
                contract_address: Address::repeat_byte(0x01),
                tx_hash: hash,
            }
        );
    }

    #[test]
    fn test_redaction_masks_key_only() {
        let record = MarketplaceRecord {
            admin_private_key: "0xdeadbeef".into(),
            admin_address: "0xabc".into(),
            ..Default::default()
        };
        let redacted = record.redacted();
        assert_eq!(redacted.admin_private_key, REDACTED);
        assert_eq!(redacted.admin_address, "0xabc");
        assert!(MarketplaceRecord::default().redacted().admin_private_key.is_empty());
    }

    #[tokio::test]
    async fn test_update_rewrites_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marketplaceData.json");
        std::fs::write(&path, r#"{"isUpdated":false,"custom":[1,2]}"#).unwrap();

        let store = MarketplaceStore::new(&path);
        let update = MarketplaceUpdate {
            rpc_url: Some("http://127.0.0.1:8545".into()),
            chain_id: Some(31337),
            collectible_name: Some("Gate".into()),
            ..Default::default()
        };
        store.update(|record| record.apply(&update)).await.unwrap();

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["rpcUrl"], "http://127.0.0.1:8545");
        assert_eq!(on_disk["erc721CollectibleName"], "Gate");
        assert_eq!(on_disk["custom"], json!([1, 2]));

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.chain_id, Some(31337));
    }
}
