//! Daemon configuration parsing and validation.
//!
//! The daemon is configured via a TOML file (default: `./config/folder-mcp.toml`).
//! It lists the folders to index, resource manager limits, task queue
//! defaults, the periodic sync interval, model host settings, and the REST
//! bind address. `serde` ignores unknown keys by default, so every config
//! record below opts into `#[serde(deny_unknown_fields)]`: a typo'd key
//! fails `load_config` instead of being silently dropped.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default)]
    pub folders: Vec<FolderConfig>,
    #[serde(default)]
    pub resource_manager: ResourceManagerConfig,
    #[serde(default)]
    pub task_queue: TaskQueueConfig,
    #[serde(default)]
    pub periodic_sync: PeriodicSyncConfig,
    #[serde(default)]
    pub model_host: ModelHostConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FolderConfig {
    pub path: PathBuf,
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub max_concurrent_tasks: Option<usize>,
    #[serde(default)]
    pub consecutive_error_threshold: Option<u32>,
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ResourceManagerConfig {
    #[serde(default = "default_max_concurrent_operations")]
    pub max_concurrent_operations: usize,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: default_max_concurrent_operations(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

fn default_max_concurrent_operations() -> usize {
    2
}
fn default_max_queue_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TaskQueueConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_max_concurrent_tasks() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PeriodicSyncConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_true")]
    pub vec0_cleanup_enabled: bool,
}

impl Default for PeriodicSyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            vec0_cleanup_enabled: true,
        }
    }
}

fn default_interval_ms() -> u64 {
    60_000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ModelHostConfig {
    #[serde(default = "default_model_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_true")]
    pub auto_restart: bool,
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

impl Default for ModelHostConfig {
    fn default() -> Self {
        Self {
            command: default_model_command(),
            args: Vec::new(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            health_check_interval_ms: default_health_check_interval_ms(),
            auto_restart: true,
            max_restart_attempts: default_max_restart_attempts(),
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

fn default_model_command() -> String {
    "folder-mcp-model-runtime".to_string()
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_health_check_interval_ms() -> u64 {
    30_000
}
fn default_max_restart_attempts() -> u32 {
    5
}
fn default_restart_delay_ms() -> u64 {
    2_000
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3002".to_string()
}

/// Known embedding dimensionality for the bundled model names; falls back
/// to 384 (the default model's dimension) for an unrecognized name, since
/// the model host — not this config layer — is authoritative about what
/// it actually produces.
pub fn model_dimension(model_name: &str) -> usize {
    match model_name {
        "all-MiniLM-L6-v2" => 384,
        "all-mpnet-base-v2" => 768,
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        _ => 384,
    }
}

/// Load and validate a daemon configuration file.
///
/// Validation mirrors the teacher crate's load-then-validate shape: parse
/// first, then reject out-of-range values before the daemon starts rather
/// than failing deep inside a running orchestrator.
pub fn load_config(path: &Path) -> Result<DaemonConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: DaemonConfig =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &DaemonConfig) -> Result<()> {
    if config.resource_manager.max_concurrent_operations == 0 {
        anyhow::bail!("resource_manager.max_concurrent_operations must be >= 1");
    }
    if config.resource_manager.max_queue_size == 0 {
        anyhow::bail!("resource_manager.max_queue_size must be >= 1");
    }
    if config.task_queue.retry_delay_ms == 0 {
        anyhow::bail!("task_queue.retry_delay_ms must be > 0");
    }
    if config.task_queue.max_concurrent_tasks == 0 {
        anyhow::bail!("task_queue.max_concurrent_tasks must be >= 1");
    }
    if config.periodic_sync.interval_ms == 0 {
        anyhow::bail!("periodic_sync.interval_ms must be > 0");
    }
    for folder in &config.folders {
        if folder.path.as_os_str().is_empty() {
            anyhow::bail!("folders[].path must not be empty");
        }
    }
    let mut seen = std::collections::HashSet::new();
    for folder in &config.folders {
        let canonical = folder
            .path
            .canonicalize()
            .unwrap_or_else(|_| folder.path.clone());
        if !seen.insert(canonical.clone()) {
            anyhow::bail!("duplicate folder path: {}", canonical.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_when_sections_absent() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "folders = []").unwrap();
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.resource_manager.max_concurrent_operations, 2);
        assert_eq!(cfg.task_queue.max_retries, 3);
        assert_eq!(cfg.periodic_sync.interval_ms, 60_000);
        assert_eq!(cfg.server.bind, "127.0.0.1:3002");
    }

    #[test]
    fn rejects_zero_queue_size() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "folders = []").unwrap();
        writeln!(f, "[resource_manager]").unwrap();
        writeln!(f, "max_queue_size = 0").unwrap();
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("max_queue_size"));
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "folders = []").unwrap();
        writeln!(f, "bind_addresss = \"127.0.0.1:9999\"").unwrap();
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("bind_addresss"));
    }

    #[test]
    fn rejects_unknown_key_in_nested_section() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "folders = []").unwrap();
        writeln!(f, "[resource_manager]").unwrap();
        writeln!(f, "max_concurrent_operationss = 4").unwrap();
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("max_concurrent_operationss"));
    }

    #[test]
    fn rejects_duplicate_folders() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[[folders]]").unwrap();
        writeln!(f, "path = \"{}\"", dir.path().display()).unwrap();
        writeln!(f, "[[folders]]").unwrap();
        writeln!(f, "path = \"{}\"", dir.path().display()).unwrap();
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate folder path"));
    }
}
