//! Periodic Sync Service (C9): a timer-driven pass over every configured
//! folder that re-scans `active` folders for drift, retries `error`
//! folders, leaves `scanning`/`indexing` folders alone, and repairs
//! orphaned vector rows.
//!
//! Timer and idempotent-start shape follow the teacher crate's background
//! task conventions (`tokio::time::interval` loops spawned once from
//! `main`); per-folder error isolation means one folder's failure never
//! stops the sweep from reaching the rest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::models::FolderStatus;
use crate::orchestrator::FolderOrchestrator;

pub struct PeriodicSyncService {
    orchestrators: Vec<Arc<FolderOrchestrator>>,
    interval: Duration,
    vec0_cleanup_enabled: bool,
    started: AtomicBool,
}

impl PeriodicSyncService {
    pub fn new(
        orchestrators: Vec<Arc<FolderOrchestrator>>,
        interval_ms: u64,
        vec0_cleanup_enabled: bool,
    ) -> Self {
        Self {
            orchestrators,
            interval: Duration::from_millis(interval_ms),
            vec0_cleanup_enabled,
            started: AtomicBool::new(false),
        }
    }

    /// Spawns the background sweep loop. Calling this more than once on
    /// the same instance is a no-op — the service is idempotent to start.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.interval);
            loop {
                ticker.tick().await;
                this.run_once().await;
            }
        });
    }

    /// Runs a single sweep across every folder. Exposed separately from
    /// `start` so tests can drive one pass deterministically.
    pub async fn run_once(&self) {
        for orchestrator in &self.orchestrators {
            let folder_id = orchestrator.folder_id().to_string();
            let status = orchestrator.snapshot().await.status;
            let outcome = match status {
                FolderStatus::Active => orchestrator.rescan().await,
                FolderStatus::Error => orchestrator.rescan().await,
                FolderStatus::Scanning | FolderStatus::Indexing => Ok(()),
            };
            if let Err(e) = outcome {
                tracing::warn!(folder = %folder_id, error = %e, "periodic sync pass failed for folder");
            }

            if self.vec0_cleanup_enabled {
                if let Err(e) = self.repair_orphans(orchestrator).await {
                    tracing::warn!(folder = %folder_id, error = %e, "orphan repair failed for folder");
                }
            }
        }
    }

    async fn repair_orphans(&self, orchestrator: &Arc<FolderOrchestrator>) -> crate::error::Result<()> {
        let store = orchestrator.store();
        let chunk_orphans = store.purge_chunk_embeddings_without_chunk().await?;
        let document_orphans = store.purge_document_embeddings_without_document().await?;
        if chunk_orphans > 0 || document_orphans > 0 {
            tracing::info!(
                folder = %orchestrator.folder_id(),
                chunk_orphans,
                document_orphans,
                "repaired orphaned vector rows"
            );
        }
        Ok(())
    }
}
