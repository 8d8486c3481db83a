//! Folder Lifecycle Orchestrator (C5): drives one folder from `scanning`
//! through `indexing` to `active`, turning file changes into embedding
//! store writes.
//!
//! Progress/state-change notification uses a broadcast channel rather than
//! the callback-registration style of the teacher crate's `registry.rs` —
//! broadcast avoids the update-callback/re-registration cycle that a
//! direct observer list would otherwise need (see DESIGN.md's note on
//! this Open Question).

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::change_detector::{detect_changes, scan_folder};
use crate::error::{HarnessError, Result};
use crate::extract::extract_and_chunk;
use crate::folder_state::FolderStateMachine;
use crate::model_host::{CallPriority, ModelHost};
use crate::models::{FileEmbeddingTask, FolderStateSnapshot, SemanticEnrichment, TaskType};
use crate::resource_manager::{Priority as ResourcePriority, ResourceManager};
use crate::store::{mean_pool, EmbeddingStore};
use crate::task_queue::TaskQueue;

pub const DEFAULT_CONSECUTIVE_ERROR_THRESHOLD: u32 = 3;

#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    StateChanged(FolderStateSnapshot),
    ProgressUpdated(FolderStateSnapshot),
}

pub struct FolderOrchestrator {
    folder_id: String,
    folder_path: PathBuf,
    exclude_patterns: Vec<String>,
    model_id: String,
    model_dim: usize,
    store: Arc<EmbeddingStore>,
    resource_manager: Arc<ResourceManager>,
    model_host: Arc<ModelHost>,
    state: RwLock<FolderStateMachine>,
    queue: RwLock<TaskQueue>,
    events: broadcast::Sender<OrchestratorEvent>,
}

impl FolderOrchestrator {
    pub fn new(
        folder_id: String,
        folder_path: PathBuf,
        exclude_patterns: Vec<String>,
        model_id: String,
        model_dim: usize,
        store: Arc<EmbeddingStore>,
        resource_manager: Arc<ResourceManager>,
        model_host: Arc<ModelHost>,
        consecutive_error_threshold: u32,
        max_retries: u32,
        retry_delay_ms: u64,
        max_queue_size: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: RwLock::new(FolderStateMachine::new(
                folder_id.clone(),
                folder_path.clone(),
                consecutive_error_threshold,
            )),
            queue: RwLock::new(TaskQueue::new(max_retries, retry_delay_ms, max_queue_size)),
            folder_id,
            folder_path,
            exclude_patterns,
            model_id,
            model_dim,
            store,
            resource_manager,
            model_host,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> FolderStateSnapshot {
        self.state.read().await.snapshot()
    }

    fn emit_state_changed(&self, snapshot: FolderStateSnapshot) {
        let _ = self.events.send(OrchestratorEvent::StateChanged(snapshot));
    }

    fn emit_progress(&self, snapshot: FolderStateSnapshot) {
        let _ = self.events.send(OrchestratorEvent::ProgressUpdated(snapshot));
    }

    /// Initializes the store, scans the folder, diffs against known
    /// fingerprints, and enqueues one task per change. Transitions
    /// `scanning -> indexing` if there is work, or `scanning -> active`
    /// if the folder is already fully indexed.
    pub async fn start_scanning(&self) -> Result<()> {
        self.store.initialize(&self.model_id, self.model_dim).await?;

        let current = scan_folder(&self.folder_path, &self.exclude_patterns)?;
        let known = self.store.get_document_fingerprints().await?;
        let changes = detect_changes(&current, &known);

        if changes.is_empty() {
            let mut state = self.state.write().await;
            state.transition_to(crate::models::FolderStatus::Active)?;
            let snapshot = state.snapshot();
            drop(state);
            self.emit_state_changed(snapshot);
            return Ok(());
        }

        {
            let mut queue = self.queue.write().await;
            for change in &changes {
                queue.add_tasks(&PathBuf::from(&change.path), change.change_type)?;
            }
        }

        let mut state = self.state.write().await;
        state.transition_to(crate::models::FolderStatus::Indexing)?;
        state.update_progress(0, changes.len() as u64);
        let snapshot = state.snapshot();
        drop(state);
        self.emit_state_changed(snapshot);

        Ok(())
    }

    pub async fn get_next_task(&self) -> Option<FileEmbeddingTask> {
        self.queue.write().await.get_next_task()
    }

    /// Processes one task end to end: extract/chunk (C1's external
    /// collaborator), embed, enrich, and persist. Never leaves partial
    /// chunk data behind — `replace_chunks` is transactional.
    pub async fn process_task(&self, task: &FileEmbeddingTask) -> Result<()> {
        let full_path = self.folder_path.join(&task.file);
        let file_path_str = task.file.to_string_lossy().to_string();

        let result = self
            .resource_manager
            .submit(&task.id, &self.folder_path, ResourcePriority::Batch, || {
                self.process_task_inner(&full_path, &file_path_str, task.task_type)
            })
            .await;

        let mut queue = self.queue.write().await;
        match &result {
            Ok(()) => queue.update_task_status(&task.id, true, None)?,
            Err(e) => queue.update_task_status(&task.id, false, Some(e.to_string()))?,
        }
        drop(queue);

        self.on_task_complete(result.is_ok(), result.as_ref().err().map(|e| e.to_string()))
            .await?;
        result
    }

    async fn process_task_inner(
        &self,
        full_path: &PathBuf,
        file_path_str: &str,
        task_type: TaskType,
    ) -> Result<()> {
        if task_type == TaskType::RemoveEmbeddings {
            self.store.delete_document(file_path_str).await?;
            return Ok(());
        }

        let fingerprint = crate::change_detector::fingerprint_file(full_path)?;
        let metadata = std::fs::metadata(full_path).map_err(|e| HarnessError::Transient(e.to_string()))?;
        let last_modified: chrono::DateTime<chrono::Utc> = metadata
            .modified()
            .map_err(|e| HarnessError::Transient(e.to_string()))?
            .into();
        let mime_type = mime_guess_from_path(full_path);

        let document_id = self
            .store
            .upsert_document(file_path_str, &fingerprint, metadata.len(), &mime_type, last_modified)
            .await?;

        let extracted = extract_and_chunk(full_path)?;
        if extracted.chunks.is_empty() {
            return Ok(());
        }

        let mut chunk_vectors = Vec::with_capacity(extracted.chunks.len());
        let key_phrase_calls = extracted.chunks.iter().map(|chunk| {
            self.model_host
                .extract_key_phrases(&chunk.content, CallPriority::Batch)
        });
        let key_phrase_results = futures::future::join_all(key_phrase_calls).await;
        let mut enrichments = Vec::with_capacity(extracted.chunks.len());
        for (chunk, key_phrases) in extracted.chunks.iter().zip(key_phrase_results) {
            enrichments.push(SemanticEnrichment {
                key_phrases: key_phrases?,
                readability_score: estimate_readability(&chunk.content),
            });
        }

        let chunk_ids = self
            .store
            .replace_chunks(document_id, &extracted.chunks, &enrichments)
            .await?;

        let texts: Vec<String> = extracted.chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self
            .model_host
            .generate_embeddings(&texts, CallPriority::Batch)
            .await?;
        for (chunk_id, vector) in chunk_ids.iter().zip(vectors.iter()) {
            self.store.insert_chunk_embedding(*chunk_id, vector).await?;
            chunk_vectors.push(vector.clone());
        }

        let document_vector = mean_pool(&chunk_vectors);
        if !document_vector.is_empty() {
            self.store.insert_document_embedding(document_id, &document_vector).await?;
        }

        let mut all_phrases: Vec<_> = enrichments.iter().flat_map(|e| e.key_phrases.clone()).collect();
        all_phrases.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        all_phrases.truncate(20);
        self.store.set_document_keywords(document_id, &all_phrases).await?;

        Ok(())
    }

    async fn on_task_complete(&self, success: bool, error_message: Option<String>) -> Result<()> {
        let stats = self.queue.read().await.stats();
        let total = stats.pending + stats.in_progress + stats.succeeded + stats.failed;
        let completed = stats.succeeded + stats.failed;

        let mut state = self.state.write().await;
        state.update_progress(completed as u64, total as u64);
        if success {
            state.record_success();
        } else {
            state.record_error(error_message.unwrap_or_else(|| "unknown error".into()))?;
        }
        let snapshot = state.snapshot();
        let is_drained = completed == total;
        let status = snapshot.status;
        drop(state);

        self.emit_progress(snapshot.clone());

        if is_drained && status != crate::models::FolderStatus::Error {
            let mut state = self.state.write().await;
            if state.status() == crate::models::FolderStatus::Indexing {
                state.transition_to(crate::models::FolderStatus::Active)?;
                let snapshot = state.snapshot();
                drop(state);
                self.emit_state_changed(snapshot);
            }
        }

        Ok(())
    }

    /// Re-runs the scan/diff cycle from `active`, used by the periodic
    /// sync service. A no-op if there is nothing to index.
    pub async fn rescan(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.transition_to(crate::models::FolderStatus::Scanning)?;
        }
        self.start_scanning().await
    }

    pub async fn reset(&self) {
        self.queue.write().await.reset();
    }

    pub async fn queue_is_drained(&self) -> bool {
        self.queue.read().await.is_drained()
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    pub fn folder_path(&self) -> &std::path::Path {
        &self.folder_path
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }
}

fn mime_guess_from_path(path: &std::path::Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md") => "text/markdown",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Placeholder readability heuristic (Flesch-like, clamped to `[0, 100]`)
/// until a richer scorer is wired in; the semantic-enrichment invariant
/// only requires a value in range, not a specific formula.
fn estimate_readability(text: &str) -> f32 {
    let words = text.split_whitespace().count().max(1) as f32;
    let sentences = text.matches(['.', '!', '?']).count().max(1) as f32;
    let avg_words_per_sentence = words / sentences;
    (100.0 - avg_words_per_sentence * 2.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readability_is_clamped() {
        let score = estimate_readability("");
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn mime_guess_maps_known_extensions() {
        assert_eq!(mime_guess_from_path(std::path::Path::new("a.md")), "text/markdown");
        assert_eq!(mime_guess_from_path(std::path::Path::new("a.bin")), "application/octet-stream");
    }
}
