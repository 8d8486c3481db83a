//! Filesystem Watcher (C12): event contract only.
//!
//! Real-time notify-driven watching is out of scope for this daemon (the
//! periodic sync service's poll-based diffing covers drift detection);
//! this module fixes the event shape and the [`FileWatcher`] trait so a
//! push-based backend can be dropped in later without touching the
//! orchestrator. Grounded in `other_examples`' change-handler shape
//! (`ChangeType`/`FileChange` feeding a processing pipeline) and the
//! teacher's `connector_fs.rs` default-exclude list.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChangeType, FileChange};

/// Directories always excluded from watch registration, matching the
/// change detector's implicit excludes plus the store's own directory.
pub const DEFAULT_WATCH_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/target/**",
    "**/node_modules/**",
    "**/.folder-mcp/**",
];

/// A raw filesystem event as reported by a watch backend, prior to being
/// turned into a [`FileChange`] (which additionally carries the content
/// fingerprint the orchestrator needs).
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: String,
    pub change_type: ChangeType,
}

/// Contract a push-based watch backend must implement to feed the folder
/// orchestrator without it having to poll. No implementation ships with
/// this daemon; [`crate::sync_service::PeriodicSyncService`] is the only
/// change-detection path currently wired in.
#[async_trait]
pub trait FileWatcher: Send + Sync {
    /// Starts watching `folder_root`, respecting `exclude_patterns` in
    /// addition to [`DEFAULT_WATCH_EXCLUDES`].
    async fn watch(&self, folder_root: &std::path::Path, exclude_patterns: &[String]) -> Result<()>;

    /// Stops watching a previously-registered folder. No-op if unknown.
    async fn unwatch(&self, folder_root: &std::path::Path) -> Result<()>;

    /// Pulls the next batch of raw events, blocking until at least one is
    /// available or the watcher is shut down (returning an empty batch).
    async fn next_events(&self) -> Vec<WatchEvent>;
}

/// Turns a raw watch event into a [`FileChange`] by reading the file's
/// current fingerprint (absent for removals).
pub fn to_file_change(
    event: &WatchEvent,
    fingerprint: Option<String>,
    size: u64,
    last_modified: chrono::DateTime<chrono::Utc>,
) -> FileChange {
    FileChange {
        path: event.path.clone(),
        change_type: event.change_type,
        last_modified,
        size,
        hash: fingerprint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_excludes_cover_the_store_directory() {
        assert!(DEFAULT_WATCH_EXCLUDES.contains(&"**/.folder-mcp/**"));
    }

    #[test]
    fn to_file_change_preserves_path_and_type() {
        let event = WatchEvent {
            path: "a.txt".into(),
            change_type: ChangeType::Modified,
        };
        let change = to_file_change(&event, Some("hash".into()), 10, chrono::Utc::now());
        assert_eq!(change.path, "a.txt");
        assert_eq!(change.change_type, ChangeType::Modified);
        assert_eq!(change.hash.as_deref(), Some("hash"));
    }
}
