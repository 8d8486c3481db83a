//! Change Detector (C2): diffs a folder's current filesystem listing
//! against the embedding store's fingerprint table to produce an ordered
//! list of added/modified/removed files.
//!
//! Walking and glob filtering follow the teacher crate's `connector_fs.rs`
//! (`walkdir` + `globset`); fingerprinting follows the size+mtime+content
//! hash shape used throughout the teacher's ingest path, upgraded to
//! SHA-256 over the file content.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{HarnessError, Result};
use crate::models::{ChangeType, FileChange};

/// Builds a matcher from glob-style exclude patterns (e.g. `**/.git/**`,
/// `**/node_modules/**`). An empty pattern list excludes nothing.
fn build_excludes(patterns: &[String]) -> Result<globset::GlobSet> {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::Glob::new(pattern)
            .map_err(|e| HarnessError::InvariantViolation(format!("bad exclude pattern {pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| HarnessError::InvariantViolation(e.to_string()))
}

/// Computes a SHA-256 fingerprint over a file's content.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| HarnessError::Transient(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Walks `folder_root`, skipping paths matched by `exclude_patterns`, and
/// returns every regular file's relative path alongside its fingerprint,
/// size, and last-modified time.
pub fn scan_folder(
    folder_root: &Path,
    exclude_patterns: &[String],
) -> Result<HashMap<String, (String, u64, chrono::DateTime<chrono::Utc>)>> {
    let excludes = build_excludes(exclude_patterns)?;
    let mut out = HashMap::new();

    for entry in walkdir::WalkDir::new(folder_root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(folder_root) {
            Ok(p) => p,
            Err(_) => continue,
        };
        let relative_str = relative.to_string_lossy().replace('\\', "/");
        if relative_str.starts_with(".folder-mcp") {
            continue;
        }
        if excludes.is_match(&relative_str) {
            continue;
        }

        let metadata = entry
            .metadata()
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
        let modified: chrono::DateTime<chrono::Utc> = metadata
            .modified()
            .map_err(|e| HarnessError::Transient(e.to_string()))?
            .into();
        let fingerprint = fingerprint_file(entry.path())?;

        out.insert(relative_str, (fingerprint, metadata.len(), modified));
    }

    Ok(out)
}

/// Diffs the current filesystem listing against the store's known
/// fingerprints. Order is stable: removals first, then additions, then
/// modifications, each sorted by path — callers that care about a
/// specific processing order impose it themselves.
pub fn detect_changes(
    current: &HashMap<String, (String, u64, chrono::DateTime<chrono::Utc>)>,
    known_fingerprints: &HashMap<String, String>,
) -> Vec<FileChange> {
    let mut changes = Vec::new();

    let mut removed: Vec<_> = known_fingerprints
        .keys()
        .filter(|path| !current.contains_key(*path))
        .cloned()
        .collect();
    removed.sort();
    for path in removed {
        changes.push(FileChange {
            path,
            change_type: ChangeType::Removed,
            last_modified: chrono::Utc::now(),
            size: 0,
            hash: None,
        });
    }

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for (path, (hash, size, modified_at)) in current {
        match known_fingerprints.get(path) {
            None => added.push((path.clone(), hash.clone(), *size, *modified_at)),
            Some(known_hash) if known_hash != hash => {
                modified.push((path.clone(), hash.clone(), *size, *modified_at))
            }
            _ => {}
        }
    }
    added.sort_by(|a, b| a.0.cmp(&b.0));
    modified.sort_by(|a, b| a.0.cmp(&b.0));

    for (path, hash, size, modified_at) in added {
        changes.push(FileChange {
            path,
            change_type: ChangeType::Added,
            last_modified: modified_at,
            size,
            hash: Some(hash),
        });
    }
    for (path, hash, size, modified_at) in modified {
        changes.push(FileChange {
            path,
            change_type: ChangeType::Modified,
            last_modified: modified_at,
            size,
            hash: Some(hash),
        });
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_added_modified_removed() {
        let mut known = HashMap::new();
        known.insert("stale.txt".to_string(), "old-hash".to_string());
        known.insert("unchanged.txt".to_string(), "same-hash".to_string());
        known.insert("changed.txt".to_string(), "old-hash-2".to_string());

        let mut current = HashMap::new();
        current.insert(
            "unchanged.txt".to_string(),
            ("same-hash".to_string(), 10, chrono::Utc::now()),
        );
        current.insert(
            "changed.txt".to_string(),
            ("new-hash-2".to_string(), 20, chrono::Utc::now()),
        );
        current.insert(
            "new.txt".to_string(),
            ("new-hash".to_string(), 5, chrono::Utc::now()),
        );

        let changes = detect_changes(&current, &known);
        let removed: Vec<_> = changes
            .iter()
            .filter(|c| c.change_type == ChangeType::Removed)
            .collect();
        let added: Vec<_> = changes
            .iter()
            .filter(|c| c.change_type == ChangeType::Added)
            .collect();
        let modified: Vec<_> = changes
            .iter()
            .filter(|c| c.change_type == ChangeType::Modified)
            .collect();

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].path, "stale.txt");
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].path, "new.txt");
        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].path, "changed.txt");
    }

    #[test]
    fn no_changes_when_fingerprints_match() {
        let mut known = HashMap::new();
        known.insert("a.txt".to_string(), "h".to_string());
        let mut current = HashMap::new();
        current.insert("a.txt".to_string(), ("h".to_string(), 1, chrono::Utc::now()));
        assert!(detect_changes(&current, &known).is_empty());
    }

    #[test]
    fn fingerprint_is_stable_for_same_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"hello world").unwrap();
        let a = fingerprint_file(&path).unwrap();
        let b = fingerprint_file(&path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn scan_folder_skips_store_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".folder-mcp")).unwrap();
        fs::write(dir.path().join(".folder-mcp").join("embeddings.db"), b"x").unwrap();
        fs::write(dir.path().join("doc.txt"), b"hello").unwrap();

        let result = scan_folder(dir.path(), &[]).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("doc.txt"));
    }

    #[test]
    fn scan_folder_honors_exclude_patterns() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules").join("x.js"), b"x").unwrap();
        fs::write(dir.path().join("doc.txt"), b"hello").unwrap();

        let result = scan_folder(dir.path(), &["**/node_modules/**".to_string()]).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("doc.txt"));
    }
}
