//! A one-shot helper, not a shovel: POST a single hex-encoded extrinsic to
//! a node's JSON-RPC endpoint via `author_submitExtrinsic` and report
//! whether it was accepted. Explicitly out of the warehouse-ingestion
//! core (§6) — no chain cursor, no checkpoint, no buffer.

use std::time::Duration;

use clap::Parser;
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// A recognised, informational rejection (§6): the node saw this
/// extrinsic recently and is refusing to re-gossip it, not a failure of
/// the extrinsic itself.
const BANNED_MESSAGE: &str = "Transaction is temporarily banned";

#[derive(Parser)]
#[command(about = "Submit a single hex-encoded extrinsic via author_submitExtrinsic")]
struct Args {
    /// Node RPC endpoint, e.g. http://localhost:9944.
    #[arg(long, env = "SUBSTRATE_ARCHIVE_NODE_URL")]
    node_url: String,

    /// The SCALE-encoded extrinsic, hex, with or without a leading 0x.
    #[arg(long)]
    extrinsic: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();

    let args = Args::parse();
    let hex = if args.extrinsic.starts_with("0x") { args.extrinsic.clone() } else { format!("0x{}", args.extrinsic) };

    let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
    let body = json!({
        "jsonrpc": "2.0",
        "method": "author_submitExtrinsic",
        "params": [hex],
        "id": 1,
    });

    let response = client.post(&args.node_url).json(&body).send().await?;
    let status = response.status();
    let payload: Value = response.json().await?;

    if !status.is_success() {
        anyhow::bail!("node returned HTTP {status}: {payload}");
    }

    if let Some(error) = payload.get("error") {
        let message = error.get("message").and_then(Value::as_str).unwrap_or("");
        if message.contains(BANNED_MESSAGE) {
            warn!(%message, "extrinsic temporarily banned by node, treating as informational");
            return Ok(());
        }
        anyhow::bail!("node rejected extrinsic: {error}");
    }

    match payload.get("result") {
        Some(Value::Null) | None => anyhow::bail!("node returned a null result: {payload}"),
        Some(result) => {
            info!(%result, "extrinsic accepted");
            Ok(())
        }
    }
}
