//! `folder-mcp-bridge` — short-lived per-MCP-client-session process
//! (C11). Reads line-delimited JSON-RPC requests from stdin, proxies each
//! to the daemon's REST facade, and writes the JSON-RPC response to
//! stdout. stdout carries JSON-RPC only; everything else goes to stderr.

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use folder_mcp::mcp_bridge::{ensure_daemon_running, handle_request, BridgeClient, JsonRpcRequest};

#[derive(Parser, Debug)]
#[command(name = "folder-mcp-bridge")]
struct Cli {
    /// Base URL of the daemon's REST facade.
    #[arg(long, default_value = "http://127.0.0.1:3002")]
    daemon_url: String,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let client = BridgeClient::new(cli.daemon_url.clone());

    if let Err(message) = ensure_daemon_running(&client).await {
        tracing::error!(%message, "daemon unavailable; MCP tools will report degraded-mode errors until a retry succeeds");
    }

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => {
                if !client.health().await {
                    if let Err(message) = ensure_daemon_running(&client).await {
                        tracing::warn!(%message, "daemon still unavailable for this request");
                    }
                }
                handle_request(&client, request).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "received malformed JSON-RPC line");
                continue;
            }
        };

        let mut serialized = serde_json::to_string(&response)?;
        serialized.push('\n');
        stdout.write_all(serialized.as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}
