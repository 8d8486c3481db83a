//! Embedding Model Host (C7): a singleton, auto-restarting subprocess that
//! speaks line-delimited JSON-RPC 2.0 over its own stdin/stdout.
//!
//! The host state machine (`stopped -> starting -> ready -> degraded /
//! unhealthy -> stopped`) and the exponential-backoff restart policy are
//! grounded in the teacher crate's `embedding.rs` OpenAI provider retry
//! strategy (1s, 2s, 4s, ... capped) generalized from HTTP retries to
//! process restarts. Request dispatch follows the two-priority-lane shape
//! used by the resource manager: `immediate` requests are served ahead of
//! queued `batch` requests.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::config::ModelHostConfig;
use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Stopped,
    Starting,
    Ready,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPriority {
    Immediate,
    Batch,
}

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: i64,
    method: String,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: i64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcResponseError>,
}

#[derive(Debug, Deserialize)]
struct RpcResponseError {
    message: String,
}

struct PendingCall {
    priority: CallPriority,
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value>>,
}

/// Handle to the running model host. Clone freely; cheap, shares the
/// underlying process and request channel.
#[derive(Clone)]
pub struct ModelHost {
    inner: Arc<ModelHostInner>,
}

struct ModelHostInner {
    config: ModelHostConfig,
    state: RwLock<HostState>,
    request_tx: mpsc::UnboundedSender<PendingCall>,
    restart_attempts: AtomicU32,
    next_id: AtomicI64,
}

impl ModelHost {
    /// Spawns the subprocess and starts the background reader/writer loop.
    /// The returned handle is usable as soon as the first health check
    /// reports `ready`.
    pub async fn spawn(config: ModelHostConfig) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ModelHostInner {
            config: config.clone(),
            state: RwLock::new(HostState::Starting),
            request_tx,
            restart_attempts: AtomicU32::new(0),
            next_id: AtomicI64::new(1),
        });

        let host = ModelHost { inner: inner.clone() };
        tokio::spawn(run_supervisor(inner, request_rx));

        host.wait_until_ready(Duration::from_millis(config.timeout_ms)).await?;
        Ok(host)
    }

    pub async fn state(&self) -> HostState {
        *self.inner.state.read().await
    }

    async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if *self.inner.state.read().await == HostState::Ready {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(HarnessError::Transient("model host did not become ready in time".into()));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn call(&self, method: &str, params: Value, priority: CallPriority) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .request_tx
            .send(PendingCall {
                priority,
                method: method.to_string(),
                params,
                reply: tx,
            })
            .map_err(|_| HarnessError::Transient("model host channel closed".into()))?;

        tokio::time::timeout(Duration::from_millis(self.inner.config.timeout_ms), rx)
            .await
            .map_err(|_| HarnessError::Transient(format!("model host call {method} timed out")))?
            .map_err(|_| HarnessError::Transient("model host dropped the request".into()))?
    }

    pub async fn generate_embeddings(
        &self,
        texts: &[String],
        priority: CallPriority,
    ) -> Result<Vec<Vec<f32>>> {
        let result = self
            .call("generate_embeddings", serde_json::json!({ "texts": texts }), priority)
            .await?;
        serde_json::from_value(result)
            .map_err(|e| HarnessError::ProtocolViolation(format!("bad generate_embeddings reply: {e}")))
    }

    pub async fn extract_key_phrases(
        &self,
        text: &str,
        priority: CallPriority,
    ) -> Result<Vec<crate::models::KeyPhrase>> {
        let result = self
            .call("extract_key_phrases", serde_json::json!({ "text": text }), priority)
            .await?;
        serde_json::from_value(result)
            .map_err(|e| HarnessError::ProtocolViolation(format!("bad extract_key_phrases reply: {e}")))
    }

    pub async fn health_check(&self) -> Result<()> {
        self.call("health_check", Value::Null, CallPriority::Immediate)
            .await
            .map(|_| ())
    }

    pub async fn is_model_cached(&self, model_id: &str) -> Result<bool> {
        let result = self
            .call("is_model_cached", serde_json::json!({ "model_id": model_id }), CallPriority::Immediate)
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    pub async fn download_model(&self, model_id: &str) -> Result<()> {
        self.call("download_model", serde_json::json!({ "model_id": model_id }), CallPriority::Batch)
            .await
            .map(|_| ())
    }

    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.call("shutdown", Value::Null, CallPriority::Immediate).await;
        *self.inner.state.write().await = HostState::Stopped;
        Ok(())
    }
}

/// Owns the child process and its reader/writer halves; restarted in
/// place on crash.
async fn run_supervisor(
    inner: Arc<ModelHostInner>,
    mut request_rx: mpsc::UnboundedReceiver<PendingCall>,
) {
    let mut immediate_backlog: std::collections::VecDeque<PendingCall> = std::collections::VecDeque::new();
    let mut batch_backlog: std::collections::VecDeque<PendingCall> = std::collections::VecDeque::new();

    loop {
        *inner.state.write().await = HostState::Starting;
        let spawn_result = spawn_child(&inner.config);
        let mut child = match spawn_result {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn model host process");
                if !backoff_or_give_up(&inner).await {
                    *inner.state.write().await = HostState::Unhealthy;
                    drain_with_error(&mut request_rx, &mut immediate_backlog, &mut batch_backlog, "model host permanently unavailable");
                    return;
                }
                continue;
            }
        };

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let mut reader = BufReader::new(stdout).lines();
        let mut writer = stdin;
        let pending: Arc<tokio::sync::Mutex<HashMap<i64, oneshot::Sender<Result<Value>>>>> =
            Arc::new(tokio::sync::Mutex::new(HashMap::new()));

        *inner.state.write().await = HostState::Ready;
        inner.restart_attempts.store(0, Ordering::SeqCst);

        let pending_for_reader = pending.clone();
        let reader_task = tokio::spawn(async move {
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        if let Ok(resp) = serde_json::from_str::<RpcResponse>(&line) {
                            if let Some(tx) = pending_for_reader.lock().await.remove(&resp.id) {
                                let result = match resp.error {
                                    Some(e) => Err(HarnessError::Transient(e.message)),
                                    None => Ok(resp.result.unwrap_or(Value::Null)),
                                };
                                let _ = tx.send(result);
                            }
                        }
                    }
                    _ => break,
                }
            }
        });

        let mut crashed = false;
        'dispatch: loop {
            if immediate_backlog.is_empty() && batch_backlog.is_empty() {
                match request_rx.recv().await {
                    Some(c) => enqueue_by_priority(c, &mut immediate_backlog, &mut batch_backlog),
                    None => break 'dispatch,
                }
            }
            // Pull in anything else already queued so immediate calls that
            // arrived after a batch call still jump ahead of it.
            while let Ok(c) = request_rx.try_recv() {
                enqueue_by_priority(c, &mut immediate_backlog, &mut batch_backlog);
            }

            let call = match immediate_backlog.pop_front() {
                Some(c) => c,
                None => match batch_backlog.pop_front() {
                    Some(c) => c,
                    None => continue 'dispatch,
                },
            };

            let id = inner.next_id.fetch_add(1, Ordering::SeqCst);
            let request = RpcRequest {
                jsonrpc: "2.0",
                id,
                method: call.method.clone(),
                params: call.params.clone(),
            };
            let Ok(mut line) = serde_json::to_string(&request) else {
                let _ = call.reply.send(Err(HarnessError::ProtocolViolation("unserializable request".into())));
                continue;
            };
            line.push('\n');

            pending.lock().await.insert(id, call.reply);
            if writer.write_all(line.as_bytes()).await.is_err() || writer.flush().await.is_err() {
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(Err(HarnessError::Transient("model host pipe closed".into())));
                }
                crashed = true;
                break 'dispatch;
            }
        }

        reader_task.abort();
        let _ = child.kill().await;

        if crashed {
            *inner.state.write().await = HostState::Degraded;
            if !inner.config.auto_restart {
                *inner.state.write().await = HostState::Unhealthy;
                drain_with_error(&mut request_rx, &mut immediate_backlog, &mut batch_backlog, "model host crashed and auto_restart is disabled");
                return;
            }
            if !backoff_or_give_up(&inner).await {
                *inner.state.write().await = HostState::Unhealthy;
                drain_with_error(&mut request_rx, &mut immediate_backlog, &mut batch_backlog, "model host exceeded max restart attempts");
                return;
            }
        } else {
            // Channel closed cleanly (handle dropped) — stop the supervisor.
            *inner.state.write().await = HostState::Stopped;
            return;
        }
    }
}

fn enqueue_by_priority(
    call: PendingCall,
    immediate_backlog: &mut std::collections::VecDeque<PendingCall>,
    batch_backlog: &mut std::collections::VecDeque<PendingCall>,
) {
    match call.priority {
        CallPriority::Immediate => immediate_backlog.push_back(call),
        CallPriority::Batch => batch_backlog.push_back(call),
    }
}

fn spawn_child(config: &ModelHostConfig) -> std::io::Result<Child> {
    Command::new(&config.command)
        .args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
}

/// Sleeps for `restart_delay_ms * 2^attempt` (capped at `2^5`) with up to
/// 50% jitter to avoid every folder's model host restarting in lockstep,
/// returning `false` once `max_restart_attempts` is exceeded.
async fn backoff_or_give_up(inner: &Arc<ModelHostInner>) -> bool {
    let attempt = inner.restart_attempts.fetch_add(1, Ordering::SeqCst) + 1;
    if attempt > inner.config.max_restart_attempts {
        return false;
    }
    let exponent = attempt.min(5);
    let base_delay_ms = inner.config.restart_delay_ms.saturating_mul(1u64 << exponent);
    let jitter_factor = rand::thread_rng().gen_range(0.5..1.5);
    let delay_ms = (base_delay_ms as f64 * jitter_factor) as u64;
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    true
}

fn drain_with_error(
    request_rx: &mut mpsc::UnboundedReceiver<PendingCall>,
    immediate_backlog: &mut std::collections::VecDeque<PendingCall>,
    batch_backlog: &mut std::collections::VecDeque<PendingCall>,
    message: &str,
) {
    for call in immediate_backlog.drain(..).chain(batch_backlog.drain(..)) {
        let _ = call.reply.send(Err(HarnessError::Transient(message.to_string())));
    }
    while let Ok(call) = request_rx.try_recv() {
        let _ = call.reply.send(Err(HarnessError::Transient(message.to_string())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_state_is_copy_and_comparable() {
        assert_eq!(HostState::Ready, HostState::Ready);
        assert_ne!(HostState::Ready, HostState::Degraded);
    }

    #[test]
    fn rpc_request_serializes_with_jsonrpc_2_0() {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "health_check".into(),
            params: Value::Null,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"health_check\""));
    }
}
