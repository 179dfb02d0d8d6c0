//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router for the admin, user and common APIs
//! - Wire up middleware (request ID, tracing, timeout, body limit, metrics)
//! - Serve until the shutdown coordinator fires

use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::blockchain::ChainConnector;
use crate::config::ListenerConfig;
use crate::contract::ContractService;
use crate::http::auth::admin_auth_middleware;
use crate::http::handlers;
use crate::lifecycle::Shutdown;
use crate::merkle::MerkleWhitelistManager;
use crate::observability::metrics;
use crate::storage::MarketplaceStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub whitelist: Arc<MerkleWhitelistManager>,
    pub contracts: Arc<ContractService>,
    pub marketplace: Arc<MarketplaceStore>,
    pub connector: Arc<dyn ChainConnector>,
    /// Empty disables the admin routes.
    pub admin_api_key: Arc<str>,
}

/// Router with every route and middleware layer attached.
#[allow(deprecated)]
pub fn build_router(state: AppState, listener: &ListenerConfig) -> Router {
    let admin = Router::new()
        .route("/api/admin/merkle/startMerkleTree", get(handlers::start_merkle_tree))
        .route("/api/admin/merkle/whitelistAddress", post(handlers::whitelist_address))
        .route("/api/admin/merkle/removeWhitelisted", post(handlers::remove_whitelisted))
        .route("/api/admin/contract/deployContract", post(handlers::deploy_contract))
        .route("/api/admin/contract/invokeContract", post(handlers::invoke_contract))
        .route("/api/admin/marketplace/getMarketplaceData", get(handlers::get_marketplace_data))
        .route("/api/admin/marketplace/setMarketplaceData", post(handlers::set_marketplace_data))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/get/user/getContractAbi", get(handlers::get_contract_abi))
        .route("/api/get/common/getWhitelistedAddresses", get(handlers::get_whitelisted_addresses))
        .route("/api/common/merkle/getMerkleRoot", get(handlers::get_merkle_root))
        .route("/api/user/merkle/obtainProof", post(handlers::obtain_proof))
        .route("/api/common/merkle/verifyProofOffchain", post(handlers::verify_proof_offchain))
        .route("/api/common/contract/queryContract", post(handlers::query_contract))
        .route("/api/common/contract/getTransactionReceipt", post(handlers::get_transaction_receipt));

    Router::new()
        .merge(admin)
        .merge(public)
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(listener.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(listener.request_timeout_secs)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let response = next.run(request).await;
    metrics::record_http_request(&route, response.status().as_u16());
    response
}

/// HTTP server for the mint-gate API.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, listener: &ListenerConfig) -> Self {
        Self {
            router: build_router(state, listener),
        }
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.notified())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
