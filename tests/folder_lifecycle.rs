//! Exercises the scan -> diff -> queue -> state-transition chain without
//! the orchestrator, against a real temporary directory of files.

use folder_mcp::change_detector::{detect_changes, scan_folder};
use folder_mcp::folder_state::FolderStateMachine;
use folder_mcp::models::{ChangeType, FolderStatus};
use folder_mcp::task_queue::TaskQueue;

#[test]
fn scan_detect_queue_and_transition_to_indexing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.md"), "alpha content").unwrap();
    std::fs::write(dir.path().join("b.md"), "beta content").unwrap();

    let current = scan_folder(dir.path(), &[]).unwrap();
    assert_eq!(current.len(), 2);

    let changes = detect_changes(&current, &std::collections::HashMap::new());
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c.change_type == ChangeType::Added));

    let mut queue = TaskQueue::new(3, 1000, 100);
    for change in &changes {
        queue.add_tasks(&std::path::PathBuf::from(&change.path), change.change_type).unwrap();
    }
    assert_eq!(queue.stats().pending, 2);

    let mut state = FolderStateMachine::new("f1".into(), dir.path().to_path_buf(), 3);
    state.transition_to(FolderStatus::Indexing).unwrap();
    state.update_progress(0, changes.len() as u64);
    assert_eq!(state.snapshot().status, FolderStatus::Indexing);
}

#[test]
fn rescan_after_no_changes_goes_straight_to_active() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.md"), "alpha content").unwrap();

    let current = scan_folder(dir.path(), &[]).unwrap();
    let known: std::collections::HashMap<_, _> =
        current.iter().map(|(path, (hash, _, _))| (path.clone(), hash.clone())).collect();

    let changes = detect_changes(&current, &known);
    assert!(changes.is_empty());

    let mut state = FolderStateMachine::new("f1".into(), dir.path().to_path_buf(), 3);
    state.transition_to(FolderStatus::Active).unwrap();
    assert_eq!(state.snapshot().status, FolderStatus::Active);
}

#[test]
fn removed_file_is_detected_as_a_removal() {
    let dir = tempfile::tempdir().unwrap();
    let current = scan_folder(dir.path(), &[]).unwrap();
    let mut known = std::collections::HashMap::new();
    known.insert("gone.md".to_string(), "old-hash".to_string());

    let changes = detect_changes(&current, &known);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change_type, ChangeType::Removed);
    assert_eq!(changes[0].path, "gone.md");
}

#[test]
fn exclude_patterns_skip_matching_paths() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
    std::fs::write(dir.path().join("node_modules/dep.js"), "ignored").unwrap();
    std::fs::write(dir.path().join("keep.md"), "kept").unwrap();

    let current = scan_folder(dir.path(), &["**/node_modules/**".to_string()]).unwrap();
    assert_eq!(current.len(), 1);
    assert!(current.contains_key("keep.md"));
}

#[test]
fn repeated_transition_to_the_same_status_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = FolderStateMachine::new("f1".into(), dir.path().to_path_buf(), 3);
    assert!(state.transition_to(FolderStatus::Scanning).is_err());
}

#[test]
fn consecutive_errors_past_threshold_moves_to_error_status() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = FolderStateMachine::new("f1".into(), dir.path().to_path_buf(), 2);
    state.transition_to(FolderStatus::Indexing).unwrap();
    state.record_error("boom 1".into()).unwrap();
    assert_eq!(state.snapshot().status, FolderStatus::Indexing);
    state.record_error("boom 2".into()).unwrap();
    assert_eq!(state.snapshot().status, FolderStatus::Error);
    assert_eq!(state.snapshot().error_message.as_deref(), Some("boom 2"));
}
