//! Route handlers. Each one parses a typed body, calls one core
//! operation, and wraps the result.

use alloy::primitives::{Address, B256};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::contract::types::{
    DeployRequest, DeployResponse, InvokeRequest, InvokeResponse, QueryRequest, QueryResponse,
    ReceiptRequest,
};
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::merkle::{normalize, parse_address, InclusionProof};
use crate::observability::metrics;
use crate::storage::{MarketplaceRecord, MarketplaceUpdate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    #[serde(default)]
    pub user_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    pub user_address: String,
    pub proof: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootResponse {
    pub merkle_root: Option<B256>,
}

#[derive(Debug, Serialize)]
pub struct AddressesResponse {
    pub addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub status: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiResponse {
    pub contract_abi: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceResponse {
    pub status: bool,
    pub marketplace_data: MarketplaceRecord,
}

/// Turn a body rejection into the structured input error.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::input(rejection.body_text()))
}

fn address(raw: &str) -> Result<Address, ApiError> {
    if raw.trim().is_empty() {
        return Err(ApiError::input("userAddress is required"));
    }
    Ok(parse_address(raw.trim())?)
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let rpc_healthy = match state.connector.connect("") {
        Ok(client) => client.block_number().await.is_ok(),
        Err(_) => false,
    };
    metrics::record_rpc_health(rpc_healthy);

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "whitelistSize": state.whitelist.len().await,
        "rpcHealthy": rpc_healthy,
    }))
}

pub async fn start_merkle_tree(State(state): State<AppState>) -> Result<Json<RootResponse>, ApiError> {
    let merkle_root = state.whitelist.start_merkle_tree(&state.marketplace).await?;
    Ok(Json(RootResponse { merkle_root }))
}

pub async fn whitelist_address(
    State(state): State<AppState>,
    payload: Result<Json<AddressRequest>, JsonRejection>,
) -> Result<Json<RootResponse>, ApiError> {
    let request = body(payload)?;
    let root = state.whitelist.add(address(&request.user_address)?).await?;
    Ok(Json(RootResponse {
        merkle_root: Some(root),
    }))
}

pub async fn remove_whitelisted(
    State(state): State<AppState>,
    payload: Result<Json<AddressRequest>, JsonRejection>,
) -> Result<Json<RootResponse>, ApiError> {
    let request = body(payload)?;
    let merkle_root = state.whitelist.remove(address(&request.user_address)?).await?;
    Ok(Json(RootResponse { merkle_root }))
}

pub async fn get_merkle_root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        merkle_root: state.whitelist.root().await,
    })
}

pub async fn get_whitelisted_addresses(State(state): State<AppState>) -> Json<AddressesResponse> {
    let addresses = state.whitelist.addresses().await;
    Json(AddressesResponse {
        addresses: addresses.iter().map(normalize).collect(),
    })
}

pub async fn obtain_proof(
    State(state): State<AppState>,
    payload: Result<Json<AddressRequest>, JsonRejection>,
) -> Result<Json<InclusionProof>, ApiError> {
    let request = body(payload)?;
    let proof = state.whitelist.obtain_proof(address(&request.user_address)?).await?;
    Ok(Json(proof))
}

pub async fn verify_proof_offchain(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let request = body(payload)?;
    let user = address(&request.user_address)?;
    let proof = request
        .proof
        .ok_or_else(|| ApiError::input("proof is required"))?
        .iter()
        .map(|node| {
            node.trim()
                .parse::<B256>()
                .map_err(|_| ApiError::input(format!("invalid proof element '{}'", node)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let status = state.whitelist.verify_offchain(user, &proof).await;
    Ok(Json(VerifyResponse { status }))
}

pub async fn get_contract_abi(State(state): State<AppState>) -> Json<AbiResponse> {
    Json(AbiResponse {
        contract_abi: state.contracts.contract_abi().clone(),
    })
}

pub async fn deploy_contract(
    State(state): State<AppState>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Json<DeployResponse>, ApiError> {
    let request = body(payload)?;
    Ok(Json(state.contracts.deploy_contract(&request).await?))
}

pub async fn invoke_contract(
    State(state): State<AppState>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let request = body(payload)?;
    let receipt = state.contracts.invoke_contract(&request).await?;
    Ok(Json(InvokeResponse { receipt }))
}

pub async fn query_contract(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let request = body(payload)?;
    let result = state.contracts.query_contract(&request).await?;
    Ok(Json(QueryResponse { result }))
}

pub async fn get_transaction_receipt(
    State(state): State<AppState>,
    payload: Result<Json<ReceiptRequest>, JsonRejection>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let request = body(payload)?;
    let receipt = state.contracts.get_transaction_receipt(&request).await?;
    Ok(Json(InvokeResponse { receipt }))
}

pub async fn get_marketplace_data(
    State(state): State<AppState>,
) -> Result<Json<MarketplaceRecord>, ApiError> {
    Ok(Json(state.contracts.marketplace_data().await?))
}

pub async fn set_marketplace_data(
    State(state): State<AppState>,
    payload: Result<Json<MarketplaceUpdate>, JsonRejection>,
) -> Result<Json<MarketplaceResponse>, ApiError> {
    let update = body(payload)?;
    let marketplace_data = state.contracts.set_marketplace_data(&update).await?;
    Ok(Json(MarketplaceResponse {
        status: true,
        marketplace_data,
    }))
}
