//! Global cache (ambient, shared across all folders): a small read/write/
//! purge layer over `~/.folder-mcp/cache/<key>.json`.
//!
//! Each entry is a `{data, metadata}` envelope with a SHA-256 checksum of
//! the serialized `data`. A checksum mismatch on read is treated as a
//! cache miss and the corrupted entry is deleted, following the same
//! load-then-validate shape as [`crate::config::load_config`].

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct CacheMetadata {
    created_at: i64,
    expires_at: Option<i64>,
    version: u32,
    checksum: String,
}

pub struct Cache {
    root: PathBuf,
}

impl Cache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Defaults to `~/.folder-mcp/cache`; falls back to `./.folder-mcp/cache`
    /// if the home directory cannot be determined.
    pub fn default_location() -> Self {
        let root = dirs_home().unwrap_or_else(|| PathBuf::from("."));
        Self::new(root.join(".folder-mcp").join("cache"))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    pub fn write<T: Serialize>(&self, key: &str, data: &T, ttl_seconds: Option<i64>) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| HarnessError::Transient(e.to_string()))?;

        let data_json = serde_json::to_string(data)
            .map_err(|e| HarnessError::InvariantViolation(e.to_string()))?;
        let checksum = checksum_of(data_json.as_bytes());

        let now = now_unix();
        let envelope = serde_json::json!({
            "data": data,
            "metadata": {
                "created_at": now,
                "expires_at": ttl_seconds.map(|ttl| now + ttl),
                "version": 1,
                "checksum": checksum,
            }
        });

        let path = self.entry_path(key);
        let serialized = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| HarnessError::InvariantViolation(e.to_string()))?;
        std::fs::write(&path, serialized).map_err(|e| HarnessError::Transient(e.to_string()))?;
        Ok(())
    }

    /// Reads and validates a cache entry. Returns `Ok(None)` on a clean
    /// miss (absent, expired, or corrupt — corrupt entries are deleted).
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.entry_path(key);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HarnessError::Transient(e.to_string())),
        };

        let parsed: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(_) => {
                self.purge(key);
                return Ok(None);
            }
        };

        let envelope: Result<CacheEnvelopeRaw> = serde_json::from_value(parsed.clone())
            .map_err(|e| HarnessError::StoreCorrupt(e.to_string()));
        let envelope = match envelope {
            Ok(e) => e,
            Err(_) => {
                self.purge(key);
                return Ok(None);
            }
        };

        let data_value = parsed.get("data").cloned().unwrap_or(serde_json::Value::Null);
        let data_json = serde_json::to_string(&data_value).unwrap_or_default();
        let actual_checksum = checksum_of(data_json.as_bytes());
        if actual_checksum != envelope.metadata.checksum {
            self.purge(key);
            return Ok(None);
        }

        if let Some(expires_at) = envelope.metadata.expires_at {
            if now_unix() >= expires_at {
                self.purge(key);
                return Ok(None);
            }
        }

        match serde_json::from_value(data_value) {
            Ok(data) => Ok(Some(data)),
            Err(_) => {
                self.purge(key);
                Ok(None)
            }
        }
    }

    pub fn purge(&self, key: &str) {
        let _ = std::fs::remove_file(self.entry_path(key));
    }
}

/// Used only to deserialize the envelope's metadata for checksum
/// verification; `data` is re-read separately once validated, since its
/// concrete type varies per call site.
#[derive(Deserialize)]
struct CacheEnvelopeRaw {
    metadata: CacheMetadata,
}

fn checksum_of(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
