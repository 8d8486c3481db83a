//! MCP Bridge (C11): a short-lived per-client-session process that speaks
//! line-delimited JSON-RPC 2.0 over stdio and proxies tool calls to the
//! long-running daemon's REST facade.
//!
//! stdout carries ONLY JSON-RPC frames — all diagnostics go through
//! `tracing` to stderr, the same stdout/stderr split the daemon's own
//! logging setup uses. The daemon auto-spawn/health-poll dance is modeled
//! on the teacher crate's HTTP retry-with-backoff style in `embedding.rs`,
//! generalized from "retry an HTTP call" to "retry until a sibling process
//! is reachable".

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const HEALTH_POLL_INTERVAL_MS: u64 = 500;
const HEALTH_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed catalog of tools this bridge exposes to an MCP client. Stable by
/// design — clients enumerate it once per session.
pub const TOOL_NAMES: &[&str] = &[
    "get_server_info",
    "list_folders",
    "explore",
    "list_documents",
    "get_document_metadata",
    "get_chunks",
    "get_document_text",
    "search_content",
    "find_documents",
];

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
        }
    }
}

/// Thin REST client bound to one daemon instance.
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(base_url: String) -> Self {
        Self { http: reqwest::Client::new(), base_url }
    }

    pub async fn health(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_millis(HEALTH_POLL_INTERVAL_MS * 2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn get(&self, path: &str) -> Result<Value, (i64, String)> {
        let resp = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .map_err(|e| (-32000, format!("daemon request failed: {e}")))?;
        parse_response(resp).await
    }

    async fn get_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, (i64, String)> {
        let resp = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .send()
            .await
            .map_err(|e| (-32000, format!("daemon request failed: {e}")))?;
        parse_response(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, (i64, String)> {
        let resp = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| (-32000, format!("daemon request failed: {e}")))?;
        parse_response(resp).await
    }
}

async fn parse_response(resp: reqwest::Response) -> Result<Value, (i64, String)> {
    let status = resp.status();
    let body: Value = resp
        .json()
        .await
        .unwrap_or(Value::Null);
    if status.is_success() {
        Ok(body)
    } else {
        let message = body
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or("daemon returned an error")
            .to_string();
        Err((-32001, message))
    }
}

/// Dispatches one MCP `tools/call`-style request (`method` is the tool
/// name directly, matching this bridge's simplified framing) to the
/// daemon and returns the JSON-RPC response to write back to stdout.
pub async fn handle_request(client: &BridgeClient, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone();
    let result = dispatch(client, &request.method, &request.params).await;
    match result {
        Ok(value) => JsonRpcResponse::ok(id, value),
        Err((code, message)) => JsonRpcResponse::err(id, code, message),
    }
}

async fn dispatch(client: &BridgeClient, method: &str, params: &Value) -> Result<Value, (i64, String)> {
    match method {
        "get_server_info" => client.get("/server-info").await,
        "list_folders" => client.get("/folders").await,
        "explore" => {
            let folder_id = require_str(params, "folder_id")?;
            let path = params.get("path").and_then(|p| p.as_str());
            let mut query = vec![("folder_id", folder_id)];
            if let Some(path) = path {
                query.push(("path", path));
            }
            client.get_query("/explore", &query).await
        }
        "list_documents" => {
            let folder_id = require_str(params, "folder_id")?;
            client.get(&format!("/folders/{folder_id}/documents")).await
        }
        "get_document_metadata" => {
            let folder_id = require_str(params, "folder_id")?;
            let doc_id = require_str(params, "document_id")?;
            client.get(&format!("/documents/{folder_id}/{doc_id}/metadata")).await
        }
        "get_chunks" => {
            let folder_id = require_str(params, "folder_id")?;
            let doc_id = require_str(params, "document_id")?;
            client
                .post(&format!("/documents/{folder_id}/{doc_id}/chunks"), params)
                .await
        }
        "get_document_text" => {
            let folder_id = require_str(params, "folder_id")?;
            let doc_id = require_str(params, "document_id")?;
            client.get(&format!("/documents/{folder_id}/{doc_id}/text")).await
        }
        "search_content" => client.post("/search/content", params).await,
        "find_documents" => client.post("/search/documents", params).await,
        _ => Err((-32601, format!("unknown tool: {method}"))),
    }
}

fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, (i64, String)> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| (-32602, format!("missing required parameter: {key}")))
}

/// Whether the daemon auto-spawn path is enabled (`AUTO_SPAWN_DAEMON=false`
/// opts out).
pub fn auto_spawn_enabled() -> bool {
    std::env::var("AUTO_SPAWN_DAEMON")
        .map(|v| v != "false")
        .unwrap_or(true)
}

/// Ensures a daemon is reachable at `base_url`, spawning one detached
/// (sibling executable next to this binary) if it is not and auto-spawn
/// is enabled. Polls `/health` every 500ms up to 10s.
pub async fn ensure_daemon_running(client: &BridgeClient) -> Result<(), String> {
    if client.health().await {
        return Ok(());
    }

    if !auto_spawn_enabled() {
        return Err("daemon is not reachable and AUTO_SPAWN_DAEMON=false".to_string());
    }

    let daemon_path = locate_daemon_executable()?;
    tracing::info!(path = %daemon_path.display(), "spawning daemon process");
    std::process::Command::new(&daemon_path)
        .spawn()
        .map_err(|e| format!("failed to spawn daemon at {}: {e}", daemon_path.display()))?;

    let deadline = tokio::time::Instant::now() + HEALTH_POLL_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if client.health().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(HEALTH_POLL_INTERVAL_MS)).await;
    }

    Err("daemon did not become healthy within 10s of being spawned".to_string())
}

fn locate_daemon_executable() -> Result<std::path::PathBuf, String> {
    let current_exe = std::env::current_exe().map_err(|e| e.to_string())?;
    let dir = current_exe
        .parent()
        .ok_or_else(|| "bridge executable has no parent directory".to_string())?;
    let name = if cfg!(windows) {
        "folder-mcp-daemon.exe"
    } else {
        "folder-mcp-daemon"
    };
    let candidate = dir.join(name);
    if candidate.exists() {
        Ok(candidate)
    } else {
        Err(format!("could not locate daemon executable at {}", candidate.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_str_reports_missing_parameter() {
        let params = serde_json::json!({});
        let err = require_str(&params, "folder_id").unwrap_err();
        assert_eq!(err.0, -32602);
    }

    #[test]
    fn auto_spawn_enabled_defaults_to_true() {
        std::env::remove_var("AUTO_SPAWN_DAEMON");
        assert!(auto_spawn_enabled());
    }

    #[test]
    fn tool_catalog_is_stable_and_nonempty() {
        assert!(TOOL_NAMES.contains(&"search_content"));
        assert!(!TOOL_NAMES.is_empty());
    }
}
