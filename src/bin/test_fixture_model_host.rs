//! Deterministic stand-in for the real embedding model subprocess, used
//! only by integration tests (see `tests/`). Speaks the same
//! line-delimited JSON-RPC 2.0 protocol as [`folder_mcp::model_host`]
//! expects, so the orchestrator and search engine can be exercised
//! end-to-end without a real model runtime installed.
//!
//! Embeddings are derived deterministically from each input string's
//! bytes rather than randomly, so tests asserting on relative similarity
//! (e.g. "a query about rust scores higher against a rust chunk than a
//! python chunk") stay stable across runs.

use serde_json::{json, Value};
use std::io::{BufRead, Write};

const DIM: usize = 16;

fn embed(text: &str) -> Vec<f32> {
    let mut vec = vec![0f32; DIM];
    for (i, byte) in text.bytes().enumerate() {
        vec[i % DIM] += byte as f32;
    }
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
    vec
}

fn key_phrases(text: &str) -> Value {
    let mut words: Vec<&str> = text
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .collect();
    words.sort_by_key(|w| std::cmp::Reverse(w.len()));
    words.dedup();
    words.truncate(3);
    json!(words
        .into_iter()
        .map(|w| json!({ "text": w, "score": 1.0 }))
        .collect::<Vec<_>>())
}

fn handle(method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "health_check" | "is_model_cached" => Ok(json!(true)),
        "download_model" => Ok(Value::Null),
        "generate_embeddings" => {
            let texts = params
                .get("texts")
                .and_then(|v| v.as_array())
                .ok_or("missing texts")?;
            let vectors: Vec<Vec<f32>> = texts
                .iter()
                .map(|t| embed(t.as_str().unwrap_or_default()))
                .collect();
            Ok(json!(vectors))
        }
        "extract_key_phrases" => {
            let text = params.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(key_phrases(text))
        }
        "shutdown" => Ok(Value::Null),
        other => Err(format!("unknown method: {other}")),
    }
}

fn main() {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(|v| v.as_str()).unwrap_or_default();
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        let response = match handle(method, &params) {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err(message) => json!({ "jsonrpc": "2.0", "id": id, "error": { "message": message } }),
        };

        let _ = writeln!(stdout, "{response}");
        let _ = stdout.flush();

        if method == "shutdown" {
            break;
        }
    }
}
