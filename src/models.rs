//! Core data model shared across the store, orchestrator, and search engine.
//!
//! These types mirror the design's data model: `Folder`, `FolderState`,
//! `FileEmbeddingTask`, `Document`, `Chunk`, plus the embedding config row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A configured folder root with its own embedding store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub path: PathBuf,
    pub model_id: String,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub max_concurrent_tasks: Option<usize>,
}

/// Lifecycle status of a folder (see [`crate::folder_state::FolderStateMachine`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FolderStatus {
    Scanning,
    Indexing,
    Active,
    Error,
}

impl std::fmt::Display for FolderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FolderStatus::Scanning => "scanning",
            FolderStatus::Indexing => "indexing",
            FolderStatus::Active => "active",
            FolderStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Progress snapshot for a folder's current indexing pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
    pub percentage: u8,
}

impl Progress {
    pub fn recompute(&mut self) {
        self.percentage = if self.total == 0 {
            0
        } else {
            ((self.completed as f64 / self.total as f64) * 100.0).round() as u8
        };
    }
}

/// Read-only snapshot of one folder's state, handed to subscribers and the
/// REST facade. Copies only, never shared by reference across an await
/// point — this is how the orchestrator/state/callback cycle from the
/// original design is broken (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderStateSnapshot {
    pub folder_id: String,
    pub folder_path: PathBuf,
    pub status: FolderStatus,
    pub progress: Progress,
    pub consecutive_errors: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum TaskType {
    CreateEmbeddings,
    UpdateEmbeddings,
    RemoveEmbeddings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Error)
    }
}

/// One file-level unit of indexing work, live only during the indexing phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEmbeddingTask {
    pub id: String,
    pub file: PathBuf,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

/// A ranked key phrase with a relevance score in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPhrase {
    pub text: String,
    pub score: f32,
}

/// A document row as persisted in the embedding store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub file_path: String,
    pub fingerprint: String,
    pub file_size: u64,
    pub mime_type: String,
    pub last_modified: DateTime<Utc>,
    pub last_indexed: DateTime<Utc>,
    pub needs_reindex: bool,
    pub document_keywords: Vec<KeyPhrase>,
    pub keywords_extracted: bool,
}

/// A chunk row as persisted in the embedding store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub token_count: i64,
    pub key_phrases: Vec<KeyPhrase>,
    pub readability_score: f32,
    pub semantic_processed: bool,
    pub semantic_timestamp: Option<DateTime<Utc>>,
}

/// A new chunk as produced by the (out-of-scope) chunker, prior to storage.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i64,
    pub content: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub token_count: i64,
}

/// Per-chunk semantic enrichment the orchestrator must attach before a
/// chunk can be written (semantic enrichment contract in the orchestrator
/// design).
#[derive(Debug, Clone)]
pub struct SemanticEnrichment {
    pub key_phrases: Vec<KeyPhrase>,
    pub readability_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfigRow {
    pub model_name: String,
    pub model_dimension: usize,
    pub document_embedding_policy: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Change type produced by the change detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub change_type: ChangeType,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    pub hash: Option<String>,
}

impl From<ChangeType> for TaskType {
    fn from(c: ChangeType) -> Self {
        match c {
            ChangeType::Added => TaskType::CreateEmbeddings,
            ChangeType::Modified => TaskType::UpdateEmbeddings,
            ChangeType::Removed => TaskType::RemoveEmbeddings,
        }
    }
}
