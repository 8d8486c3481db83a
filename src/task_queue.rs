//! Task Queue (C3): bounded FIFO of per-file indexing tasks with retry and
//! exponential backoff.
//!
//! Modeled on the teacher crate's progress/registry bookkeeping style
//! (`progress.rs`), replacing its single global counter with a queue of
//! typed [`FileEmbeddingTask`] rows plus a retry policy.

use chrono::Utc;
use std::collections::VecDeque;
use uuid::Uuid;

use crate::error::{HarnessError, Result};
use crate::models::{ChangeType, FileEmbeddingTask, TaskStatus, TaskType};

#[derive(Debug, Clone, Copy)]
pub struct TaskQueueStats {
    pub pending: usize,
    pub in_progress: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct TaskQueue {
    max_retries: u32,
    retry_delay_ms: u64,
    max_size: usize,
    pending: VecDeque<FileEmbeddingTask>,
    in_progress: Vec<FileEmbeddingTask>,
    succeeded: Vec<FileEmbeddingTask>,
    failed: Vec<FileEmbeddingTask>,
    retry_not_before: std::collections::HashMap<String, chrono::DateTime<Utc>>,
}

impl TaskQueue {
    pub fn new(max_retries: u32, retry_delay_ms: u64, max_size: usize) -> Self {
        Self {
            max_retries,
            retry_delay_ms,
            max_size,
            pending: VecDeque::new(),
            in_progress: Vec::new(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            retry_not_before: std::collections::HashMap::new(),
        }
    }

    /// Enqueues one task per file change, in the order given. Fails with
    /// `ResourceExhausted` if the queue's capacity would be exceeded.
    pub fn add_tasks(&mut self, file: &std::path::Path, change_type: ChangeType) -> Result<String> {
        if self.pending.len() + self.in_progress.len() >= self.max_size {
            return Err(HarnessError::ResourceExhausted(format!(
                "task queue at capacity ({})",
                self.max_size
            )));
        }
        let now = Utc::now();
        let task = FileEmbeddingTask {
            id: Uuid::new_v4().to_string(),
            file: file.to_path_buf(),
            task_type: TaskType::from(change_type),
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: self.max_retries,
            created_at: now,
            updated_at: now,
        error_message: None,
        };
        let id = task.id.clone();
        self.pending.push_back(task);
        Ok(id)
    }

    /// Pops the next eligible task (respecting retry backoff), moving it
    /// to `in_progress`.
    pub fn get_next_task(&mut self) -> Option<FileEmbeddingTask> {
        let now = Utc::now();
        let idx = self.pending.iter().position(|t| {
            self.retry_not_before
                .get(&t.id)
                .map(|not_before| now >= *not_before)
                .unwrap_or(true)
        })?;
        let mut task = self.pending.remove(idx)?;
        task.status = TaskStatus::InProgress;
        task.updated_at = now;
        self.in_progress.push(task.clone());
        Some(task)
    }

    /// Records the outcome of a task. A failed task below its retry budget
    /// is re-enqueued behind an exponential backoff delay
    /// (`retry_delay_ms * 2^retry_count`); beyond the budget it becomes a
    /// permanent failure.
    pub fn update_task_status(
        &mut self,
        task_id: &str,
        success: bool,
        error_message: Option<String>,
    ) -> Result<()> {
        let pos = self
            .in_progress
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| HarnessError::NotFound(format!("no in-progress task {task_id}")))?;
        let mut task = self.in_progress.remove(pos);
        task.updated_at = Utc::now();

        if success {
            task.status = TaskStatus::Success;
            self.retry_not_before.remove(task_id);
            self.succeeded.push(task);
            return Ok(());
        }

        task.error_message = error_message;
        if task.retry_count < task.max_retries {
            task.retry_count += 1;
            task.status = TaskStatus::Pending;
            let backoff_ms = self.retry_delay_ms.saturating_mul(1u64 << task.retry_count.min(20));
            self.retry_not_before.insert(
                task_id.to_string(),
                Utc::now() + chrono::Duration::milliseconds(backoff_ms as i64),
            );
            self.pending.push_back(task);
        } else {
            task.status = TaskStatus::Error;
            self.retry_not_before.remove(task_id);
            self.failed.push(task);
        }
        Ok(())
    }

    pub fn stats(&self) -> TaskQueueStats {
        TaskQueueStats {
            pending: self.pending.len(),
            in_progress: self.in_progress.len(),
            succeeded: self.succeeded.len(),
            failed: self.failed.len(),
        }
    }

    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.in_progress.is_empty()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.in_progress.clear();
        self.succeeded.clear();
        self.failed.clear();
        self.retry_not_before.clear();
    }

    pub fn failed_tasks(&self) -> &[FileEmbeddingTask] {
        &self.failed
    }
}
