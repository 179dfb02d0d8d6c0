mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use common::{MockChain, MockConnector, ADMIN_KEY, CHAIN_ID, DEV_ADDRESS, DEV_KEY};
use mint_gate::config::AppConfig;
use mint_gate::http::build_router;
use mint_gate::lifecycle::build_state_with;

struct TestApp {
    _dir: tempfile::TempDir,
    chain: Arc<MockChain>,
    router: Router,
}

fn app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    configure(&mut config);
    let chain = Arc::new(MockChain::new(CHAIN_ID));
    let connector = Arc::new(MockConnector::new(chain.clone()));
    let state = build_state_with(&config, connector, false).unwrap();
    TestApp {
        _dir: dir,
        chain,
        router: build_router(state, &config.listener),
    }
}

fn app() -> TestApp {
    app_with(|_| {})
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin(mut request: Request<Body>) -> Request<Body> {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", ADMIN_KEY).parse().unwrap(),
    );
    request
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let app = app();
    let body = json!({ "userAddress": common::address_of('a') });

    let (status, _) = send(&app.router, post("/api/admin/merkle/whitelistAddress", body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut wrong = post("/api/admin/merkle/whitelistAddress", body.clone());
    wrong
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer nope".parse().unwrap());
    let (status, _) = send(&app.router, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app.router, admin(post("/api/admin/merkle/whitelistAddress", body))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_empty_admin_key_disables_admin_routes() {
    let app = app_with(|config| config.admin.api_key.clear());
    let (status, _) = send(&app.router, admin(get("/api/admin/marketplace/getMarketplaceData"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app.router, get("/api/common/merkle/getMerkleRoot")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_whitelist_proof_verify_round() {
    let app = app();
    let a = common::address_of('a');
    let b = common::address_of('b');

    let (_, first) = send(
        &app.router,
        admin(post("/api/admin/merkle/whitelistAddress", json!({ "userAddress": a }))),
    )
    .await;
    let (status, second) = send(
        &app.router,
        admin(post("/api/admin/merkle/whitelistAddress", json!({ "userAddress": b.to_uppercase().replace("0X", "0x") }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(first["merkleRoot"], second["merkleRoot"]);

    let (_, root) = send(&app.router, get("/api/common/merkle/getMerkleRoot")).await;
    assert_eq!(root["merkleRoot"], second["merkleRoot"]);

    let (_, listed) = send(&app.router, get("/api/get/common/getWhitelistedAddresses")).await;
    assert_eq!(listed["addresses"], json!([a, b]));

    let (status, proof) = send(&app.router, post("/api/user/merkle/obtainProof", json!({ "userAddress": a }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(proof["value"], json!([a]));

    let (_, verified) = send(
        &app.router,
        post(
            "/api/common/merkle/verifyProofOffchain",
            json!({ "userAddress": a, "proof": proof["proof"] }),
        ),
    )
    .await;
    assert_eq!(verified["status"], true);

    let (_, forged) = send(
        &app.router,
        post(
            "/api/common/merkle/verifyProofOffchain",
            json!({ "userAddress": common::address_of('c'), "proof": proof["proof"] }),
        ),
    )
    .await;
    assert_eq!(forged["status"], false);
}

#[tokio::test]
async fn test_error_bodies_are_structured() {
    let app = app();
    let a = common::address_of('a');
    send(&app.router, admin(post("/api/admin/merkle/whitelistAddress", json!({ "userAddress": a })))).await;

    let (status, body) = send(
        &app.router,
        admin(post("/api/admin/merkle/whitelistAddress", json!({ "userAddress": a }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state_conflict");
    assert_eq!(body["retry"], "none");

    let (status, body) = send(
        &app.router,
        post("/api/user/merkle/obtainProof", json!({ "userAddress": common::address_of('d') })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = send(
        &app.router,
        post("/api/user/merkle/obtainProof", json!({ "userAddress": "not-an-address" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "input");

    let (status, body) = send(
        &app.router,
        post("/api/common/merkle/verifyProofOffchain", json!({ "userAddress": a })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "proof is required");

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/user/merkle/obtainProof")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{"))
        .unwrap();
    let (status, body) = send(&app.router, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "input");
}

#[tokio::test]
async fn test_start_merkle_tree_publishes_root() {
    let app = app();
    let a = common::address_of('a');
    let (_, added) = send(&app.router, admin(post("/api/admin/merkle/whitelistAddress", json!({ "userAddress": a })))).await;

    let (status, started) = send(&app.router, admin(get("/api/admin/merkle/startMerkleTree"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["merkleRoot"], added["merkleRoot"]);

    let (_, record) = send(&app.router, admin(get("/api/admin/marketplace/getMarketplaceData"))).await;
    assert_eq!(record["merkleRoot"], added["merkleRoot"]);
}

#[tokio::test]
async fn test_deploy_then_redeploy_over_http() {
    let app = app();
    let request = json!({
        "senderAddress": DEV_ADDRESS,
        "senderPrivateKey": DEV_KEY,
        "rpcUrl": "http://node.test:8545",
        "chainId": CHAIN_ID.to_string(),
        "merkleTreeRootHash": format!("0x{}", "01".repeat(32)),
        "erc721CollectibleName": "Gate Pass",
        "erc721CollectibleSymbol": "GATE",
        "ipfsGatewayUrl": "https://ipfs.io/ipfs/",
    });

    let (status, first) = send(&app.router, admin(post("/api/admin/contract/deployContract", request.clone()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["alreadyDeployed"], false);
    assert_eq!(first["marketplaceData"]["isUpdated"], true);

    let (status, second) = send(&app.router, admin(post("/api/admin/contract/deployContract", request))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["alreadyDeployed"], true);
    assert_eq!(second["receipt"]["contractAddress"], first["receipt"]["contractAddress"]);
    assert_eq!(app.chain.broadcast_count(), 1);

    let (status, receipt) = send(
        &app.router,
        post(
            "/api/common/contract/getTransactionReceipt",
            json!({ "transactionHash": first["receipt"]["transactionHash"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["receipt"]["blockNumber"], first["receipt"]["blockNumber"]);
}

#[tokio::test]
async fn test_pending_deploy_is_accepted_with_hash() {
    let app = app();
    app.chain.set_mining(false);
    let request = json!({
        "senderPrivateKey": DEV_KEY,
        "chainId": CHAIN_ID,
        "merkleTreeRootHash": format!("0x{}", "02".repeat(32)),
    });

    let (status, body) = send(&app.router, admin(post("/api/admin/contract/deployContract", request))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["error"], "pending");
    assert_eq!(body["retry"], "resume_polling");
    assert!(body["transactionHash"].as_str().unwrap().starts_with("0x"));
}

#[tokio::test]
async fn test_marketplace_data_is_redacted_and_settable() {
    let app = app();
    let (status, updated) = send(
        &app.router,
        admin(post(
            "/api/admin/marketplace/setMarketplaceData",
            json!({
                "rpcUrl": "http://node.test:8545",
                "chainId": "31337",
                "collectibleName": "Gate Pass",
                "collectibleSymbol": "GATE",
                "ipfsGatewayUrl": "https://ipfs.io/ipfs/",
            }),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], true);
    assert_eq!(updated["marketplaceData"]["chainId"], 31337);
    assert_eq!(updated["marketplaceData"]["erc721CollectibleSymbol"], "GATE");

    let marketplace_path = {
        let (_, record) = send(&app.router, admin(get("/api/admin/marketplace/getMarketplaceData"))).await;
        assert_eq!(record["rpcUrl"], "http://node.test:8545");
        app._dir.path().join("marketplaceData.json")
    };

    let mut raw: Value = serde_json::from_str(&std::fs::read_to_string(&marketplace_path).unwrap()).unwrap();
    raw["adminPrivateKey"] = json!(DEV_KEY);
    std::fs::write(&marketplace_path, raw.to_string()).unwrap();

    let (_, record) = send(&app.router, admin(get("/api/admin/marketplace/getMarketplaceData"))).await;
    assert_eq!(record["adminPrivateKey"], "<redacted>");
}

#[tokio::test]
async fn test_contract_abi_and_health() {
    let app = app();
    let (status, abi) = send(&app.router, get("/api/get/user/getContractAbi")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(abi["contractAbi"]
        .as_array()
        .unwrap()
        .iter()
        .any(|item| item["name"] == "updateRoot"));

    let (status, health) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["rpcHealthy"], true);
    assert_eq!(health["whitelistSize"], 0);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(get("/api/common/merkle/getMerkleRoot"))
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}
