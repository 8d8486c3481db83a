//! Folder State Machine (C4): the permitted lifecycle transitions for a
//! single folder, and a snapshot type safe to hand out to readers.
//!
//! Pure transition logic kept separate from I/O, in the same spirit as the
//! teacher crate's `progress.rs` bookkeeping — this module never touches
//! the database or the filesystem.

use chrono::Utc;

use crate::error::{HarnessError, Result};
use crate::models::{FolderStateSnapshot, FolderStatus, Progress};

/// Returns whether `from -> to` is a permitted transition. Self-transitions
/// are never permitted; callers that mean "no-op" should not call
/// `transition_to` in that case.
pub fn can_transition_to(from: FolderStatus, to: FolderStatus) -> bool {
    use FolderStatus::*;
    matches!(
        (from, to),
        (Scanning, Indexing)
            | (Scanning, Active)
            | (Scanning, Error)
            | (Indexing, Active)
            | (Indexing, Error)
            | (Active, Scanning)
            | (Active, Error)
            | (Error, Scanning)
    )
}

pub struct FolderStateMachine {
    state: FolderStateSnapshot,
    consecutive_error_threshold: u32,
}

impl FolderStateMachine {
    pub fn new(
        folder_id: String,
        folder_path: std::path::PathBuf,
        consecutive_error_threshold: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            state: FolderStateSnapshot {
                folder_id,
                folder_path,
                status: FolderStatus::Scanning,
                progress: Progress::default(),
                consecutive_errors: 0,
                error_message: None,
                created_at: now,
                updated_at: now,
            },
            consecutive_error_threshold,
        }
    }

    pub fn snapshot(&self) -> FolderStateSnapshot {
        self.state.clone()
    }

    pub fn status(&self) -> FolderStatus {
        self.state.status
    }

    /// Attempts the transition, failing with `InvariantViolation` if it is
    /// not permitted from the current state.
    pub fn transition_to(&mut self, to: FolderStatus) -> Result<()> {
        if !can_transition_to(self.state.status, to) {
            return Err(HarnessError::InvariantViolation(format!(
                "illegal transition {} -> {}",
                self.state.status, to
            )));
        }
        self.state.status = to;
        self.state.updated_at = Utc::now();
        if to != FolderStatus::Error {
            self.state.error_message = None;
        }
        Ok(())
    }

    pub fn update_progress(&mut self, completed: u64, total: u64) {
        self.state.progress.completed = completed;
        self.state.progress.total = total;
        self.state.progress.recompute();
        self.state.updated_at = Utc::now();
    }

    /// Records a task failure. Once `consecutive_errors` reaches the
    /// configured threshold, the folder is driven to `error` (if a
    /// transition from the current state is legal).
    pub fn record_error(&mut self, message: String) -> Result<()> {
        self.state.consecutive_errors += 1;
        self.state.error_message = Some(message);
        self.state.updated_at = Utc::now();
        if self.state.consecutive_errors >= self.consecutive_error_threshold
            && can_transition_to(self.state.status, FolderStatus::Error)
        {
            self.state.status = FolderStatus::Error;
        }
        Ok(())
    }

    pub fn record_success(&mut self) {
        self.state.consecutive_errors = 0;
        self.state.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FolderStatus::*;

    #[test]
    fn permitted_transitions_match_table() {
        assert!(can_transition_to(Scanning, Indexing));
        assert!(can_transition_to(Indexing, Active));
        assert!(can_transition_to(Active, Scanning));
        assert!(can_transition_to(Error, Scanning));
        assert!(!can_transition_to(Scanning, Scanning));
        assert!(!can_transition_to(Active, Indexing));
        assert!(!can_transition_to(Error, Active));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut m = FolderStateMachine::new("f1".into(), "/tmp".into(), 3);
        let err = m.transition_to(Error).is_ok();
        assert!(err); // Scanning -> Error is legal
        let err2 = m.transition_to(Indexing);
        assert!(err2.is_err());
    }

    #[test]
    fn consecutive_errors_drive_to_error_state() {
        let mut m = FolderStateMachine::new("f1".into(), "/tmp".into(), 3);
        m.transition_to(Indexing).unwrap();
        m.record_error("boom".into()).unwrap();
        m.record_error("boom".into()).unwrap();
        assert_eq!(m.status(), Indexing);
        m.record_error("boom".into()).unwrap();
        assert_eq!(m.status(), Error);
    }

    #[test]
    fn success_resets_consecutive_error_count() {
        let mut m = FolderStateMachine::new("f1".into(), "/tmp".into(), 3);
        m.transition_to(Indexing).unwrap();
        m.record_error("boom".into()).unwrap();
        m.record_success();
        assert_eq!(m.snapshot().consecutive_errors, 0);
    }

    #[test]
    fn progress_percentage_is_computed() {
        let mut m = FolderStateMachine::new("f1".into(), "/tmp".into(), 3);
        m.update_progress(5, 10);
        assert_eq!(m.snapshot().progress.percentage, 50);
    }
}
