//! Exercises the MCP bridge's request dispatch against a real (if empty)
//! daemon REST facade, proving `dispatch`'s method/param wiring actually
//! reaches the routes `rest.rs` registers.

use std::collections::HashMap;
use std::sync::Arc;

use folder_mcp::config::ModelHostConfig;
use folder_mcp::mcp_bridge::{handle_request, BridgeClient, JsonRpcRequest};
use folder_mcp::model_host::ModelHost;
use folder_mcp::rest::{router, AppState};

fn fixture_model_host_path() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_test-fixture-model-host"))
}

async fn start_empty_daemon() -> String {
    let config = ModelHostConfig {
        command: fixture_model_host_path().to_string_lossy().to_string(),
        args: vec![],
        timeout_ms: 5_000,
        max_retries: 3,
        health_check_interval_ms: 30_000,
        auto_restart: true,
        max_restart_attempts: 5,
        restart_delay_ms: 100,
    };
    let model_host = Arc::new(ModelHost::spawn(config).await.unwrap());
    let state = AppState { orchestrators: Arc::new(HashMap::new()), model_host, version: "test" };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn request(method: &str, params: serde_json::Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: serde_json::json!(1),
        method: method.to_string(),
        params,
    }
}

#[tokio::test]
async fn get_server_info_round_trips_through_the_daemon() {
    let base_url = start_empty_daemon().await;
    let client = BridgeClient::new(base_url);

    let response = handle_request(&client, request("get_server_info", serde_json::json!({}))).await;
    assert!(response.error.is_none());
    assert_eq!(response.result.unwrap()["folder_count"], 0);
}

#[tokio::test]
async fn list_documents_on_an_unknown_folder_surfaces_as_an_rpc_error() {
    let base_url = start_empty_daemon().await;
    let client = BridgeClient::new(base_url);

    let response = handle_request(
        &client,
        request("list_documents", serde_json::json!({ "folder_id": "nope" })),
    )
    .await;
    assert!(response.result.is_none());
    assert!(response.error.is_some());
}

#[tokio::test]
async fn unknown_tool_name_is_rejected_before_any_http_call() {
    let base_url = start_empty_daemon().await;
    let client = BridgeClient::new(base_url);

    let response = handle_request(&client, request("delete_everything", serde_json::json!({}))).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, -32601);
}

#[tokio::test]
async fn explore_without_folder_id_reports_a_missing_parameter() {
    let base_url = start_empty_daemon().await;
    let client = BridgeClient::new(base_url);

    let response = handle_request(&client, request("explore", serde_json::json!({}))).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, -32602);
}
