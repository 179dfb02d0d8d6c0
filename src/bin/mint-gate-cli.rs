use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "mint-gate-cli")]
#[command(about = "Management CLI for the mint-gate API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8909")]
    url: String,

    /// Admin API key; falls back to MINT_GATE_ADMIN_API_KEY.
    #[arg(short, long, env = "MINT_GATE_ADMIN_API_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current Merkle root
    Root,
    /// List whitelisted addresses
    Addresses,
    /// Whitelist an address
    Add { address: String },
    /// Remove an address from the whitelist
    Remove { address: String },
    /// Rebuild the tree from the whitelist file and publish the root
    Start,
    /// Fetch the inclusion proof for an address
    Proof { address: String },
    /// Verify a proof off-chain
    Verify {
        address: String,
        /// Proof elements, leaf to root
        proof: Vec<String>,
    },
    /// Look up a transaction receipt
    Receipt {
        hash: String,
        #[arg(long)]
        rpc_url: Option<String>,
    },
    /// Show the deployment/marketplace record
    Marketplace,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if !cli.key.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
        );
    }

    let request = match cli.command {
        Commands::Root => client.get(format!("{}/api/common/merkle/getMerkleRoot", base)),
        Commands::Addresses => {
            client.get(format!("{}/api/get/common/getWhitelistedAddresses", base))
        }
        Commands::Add { address } => client
            .post(format!("{}/api/admin/merkle/whitelistAddress", base))
            .json(&json!({ "userAddress": address })),
        Commands::Remove { address } => client
            .post(format!("{}/api/admin/merkle/removeWhitelisted", base))
            .json(&json!({ "userAddress": address })),
        Commands::Start => client.get(format!("{}/api/admin/merkle/startMerkleTree", base)),
        Commands::Proof { address } => client
            .post(format!("{}/api/user/merkle/obtainProof", base))
            .json(&json!({ "userAddress": address })),
        Commands::Verify { address, proof } => client
            .post(format!("{}/api/common/merkle/verifyProofOffchain", base))
            .json(&json!({ "userAddress": address, "proof": proof })),
        Commands::Receipt { hash, rpc_url } => client
            .post(format!("{}/api/common/contract/getTransactionReceipt", base))
            .json(&json!({ "transactionHash": hash, "rpcUrl": rpc_url })),
        Commands::Marketplace => {
            client.get(format!("{}/api/admin/marketplace/getMarketplaceData", base))
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if !text.is_empty() => println!("{}", text),
        Err(_) => {}
    }

    if status.is_success() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
