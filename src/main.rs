//! mint-gate service.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                      MINT GATE                        │
//!   Admin / User     │  ┌─────────┐    ┌──────────────┐   ┌──────────────┐  │
//!   ─────────────────┼─▶│  http   │───▶│    merkle    │──▶│   storage    │  │
//!                    │  │ routes  │    │  whitelist   │   │ (JSON files) │  │
//!                    │  └────┬────┘    └──────────────┘   └──────────────┘  │
//!                    │       │                                   ▲          │
//!                    │       ▼                                   │          │
//!                    │  ┌──────────┐   ┌──────────────┐          │          │
//!                    │  │ contract │──▶│  blockchain  │──────────┼──────── ┼──▶ JSON-RPC
//!                    │  │ service  │   │   pipeline   │          │          │
//!                    │  └────┬─────┘   └──────────────┘          │          │
//!                    │       └──── deployment guard ─────────────┘          │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use mint_gate::blockchain::RpcChainClient;
use mint_gate::config::load_config;
use mint_gate::lifecycle::{build_state, wait_for_signal, Shutdown};
use mint_gate::observability::{init_tracing, metrics};
use mint_gate::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "mint-gate", version, about = "Merkle whitelist and contract deployment service")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, default_value = "mint-gate.toml")]
    config: PathBuf,

    /// Regenerate the tree file from the whitelist file at startup.
    #[arg(long)]
    rebuild_tree: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    init_tracing(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mint-gate starting");
    tracing::info!(
        config = %args.config.display(),
        bind_address = %config.listener.bind_address,
        rpc_url = %config.blockchain.rpc_url,
        chain_id = config.blockchain.chain_id,
        admin_enabled = !config.admin.api_key.is_empty(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let state = build_state(&config, args.rebuild_tree)?;

    match RpcChainClient::from_config(&config.blockchain) {
        Ok(client) if client.is_healthy().await => {
            tracing::info!(rpc_url = %config.blockchain.rpc_url, "Default RPC endpoint reachable")
        }
        Ok(_) => tracing::warn!(
            rpc_url = %config.blockchain.rpc_url,
            "Default RPC endpoint unreachable, contract operations will fail until it answers"
        ),
        Err(e) => tracing::warn!(error = %e, "Default RPC endpoint is not usable"),
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    HttpServer::new(state, &config.listener)
        .run(listener, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
