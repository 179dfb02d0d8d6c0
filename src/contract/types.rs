//! Typed request and response bodies for contract operations.
//!
//! Field names follow the JSON API (`camelCase`). Optional fields fall back
//! to the deployment record and then to configuration.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::blockchain::TransactionReceipt;
use crate::storage::marketplace::lenient_u64;
use crate::storage::MarketplaceRecord;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// Checked against the address derived from the signing key.
    #[serde(default)]
    pub sender_address: Option<String>,
    #[serde(default)]
    pub sender_private_key: Option<String>,
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub merkle_tree_root_hash: Option<String>,
    #[serde(default)]
    pub erc721_collectible_name: Option<String>,
    #[serde(default)]
    pub erc721_collectible_symbol: Option<String>,
    #[serde(default)]
    pub ipfs_gateway_url: Option<String>,
    /// Overrides the default `[root, name, symbol, ipfsGatewayUrl]` arguments.
    #[serde(default)]
    pub constructor_args: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    #[serde(default)]
    pub sender_address: Option<String>,
    #[serde(default)]
    pub sender_private_key: Option<String>,
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub chain_id: Option<u64>,
    /// Defaults to the deployed contract.
    #[serde(default)]
    pub contract_address: Option<String>,
    pub function_name: String,
    #[serde(default)]
    pub merkle_tree_root_hash: Option<String>,
    #[serde(default)]
    pub parameter_values: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub rpc_url: Option<String>,
    pub function_name: String,
    /// Shorthand for `tokenURI`/`ownerOf` style getters.
    #[serde(default, deserialize_with = "lenient_string")]
    pub token_id: Option<String>,
    #[serde(default)]
    pub parameter_values: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRequest {
    pub transaction_hash: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub receipt: TransactionReceipt,
    pub marketplace_data: MarketplaceRecord,
    pub already_deployed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvokeResponse {
    pub receipt: TransactionReceipt,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub result: Value,
}

/// Render JSON arguments as the strings the ABI coercer expects. Arrays and
/// objects are passed as their JSON text.
pub fn args_as_strings(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect()
}

/// `Some` only for a non-blank value.
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invoke_request_accepts_original_shape() {
        let request: InvokeRequest = serde_json::from_value(json!({
            "senderAddress": "0x1111111111111111111111111111111111111111",
            "senderPrivateKey": "0xabc",
            "rpcUrl": "http://127.0.0.1:8545",
            "chainId": "31337",
            "contractAddress": "",
            "functionName": "updateRoot",
            "merkleTreeRootHash": "0x01",
        }))
        .unwrap();
        assert_eq!(request.chain_id, Some(31337));
        assert!(request.parameter_values.is_empty());
        assert_eq!(non_blank(&request.contract_address), None);
    }

    #[test]
    fn test_token_id_number_or_string() {
        let numeric: QueryRequest =
            serde_json::from_value(json!({"functionName": "tokenURI", "tokenId": 7})).unwrap();
        assert_eq!(numeric.token_id.as_deref(), Some("7"));

        let text: QueryRequest =
            serde_json::from_value(json!({"functionName": "tokenURI", "tokenId": "8"})).unwrap();
        assert_eq!(text.token_id.as_deref(), Some("8"));
    }

    #[test]
    fn test_args_as_strings() {
        let args = args_as_strings(&[json!("0xab"), json!(12), json!(true), json!(["0x01", "0x02"])]);
        assert_eq!(args, vec!["0xab", "12", "true", r#"["0x01","0x02"]"#]);
    }
}
