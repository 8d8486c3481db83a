//! Text extraction and chunking contract.
//!
//! Format-specific extraction and chunking heuristics are explicitly out
//! of scope; this module provides the stable contract the orchestrator
//! depends on — plain text in, ordered chunks with byte offsets out — with
//! a minimal plain-text/markdown implementation good enough to exercise
//! the rest of the pipeline. A production deployment swaps this module
//! for a real extractor without touching the orchestrator.
//!
//! Grounded in the teacher crate's `extract.rs`/`chunk.rs` shape (ordered,
//! offset-tagged chunks over a document's plain-text body).

use crate::error::{HarnessError, Result};
use crate::models::NewChunk;

const DEFAULT_CHUNK_CHARS: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 100;

pub struct ExtractedDocument {
    pub plain_text: String,
    pub chunks: Vec<NewChunk>,
}

/// Reads `path` as UTF-8 text and splits it into overlapping chunks.
/// Fails with `Transient` on I/O errors and `InvariantViolation` if the
/// file is not valid UTF-8 — binary format extraction is a collaborator
/// this contract does not implement.
pub fn extract_and_chunk(path: &std::path::Path) -> Result<ExtractedDocument> {
    let bytes = std::fs::read(path).map_err(|e| HarnessError::Transient(e.to_string()))?;
    let plain_text = String::from_utf8(bytes)
        .map_err(|e| HarnessError::InvariantViolation(format!("not valid UTF-8: {e}")))?;
    let chunks = chunk_text(&plain_text, DEFAULT_CHUNK_CHARS, DEFAULT_CHUNK_OVERLAP);
    Ok(ExtractedDocument { plain_text, chunks })
}

/// Splits `text` into chunks of at most `chunk_chars` characters, each
/// overlapping the previous by `overlap` characters. Offsets are byte
/// offsets into `text`, always satisfying `0 <= start <= end <= text.len()`.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap: usize) -> Vec<NewChunk> {
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut chunks = Vec::new();
    let mut start_idx = 0usize;
    let mut chunk_index = 0i64;

    while start_idx < chars.len() {
        let end_idx = (start_idx + chunk_chars).min(chars.len());
        let start_offset = chars[start_idx].0;
        let end_offset = if end_idx < chars.len() {
            chars[end_idx].0
        } else {
            text.len()
        };
        let content = text[start_offset..end_offset].to_string();
        let token_count = content.split_whitespace().count() as i64;

        chunks.push(NewChunk {
            chunk_index,
            content,
            start_offset: start_offset as i64,
            end_offset: end_offset as i64,
            token_count,
        });

        chunk_index += 1;
        if end_idx >= chars.len() {
            break;
        }
        start_idx = end_idx.saturating_sub(overlap).max(start_idx + 1);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_text_covers_the_whole_input() {
        let text = "a".repeat(2500);
        let chunks = chunk_text(&text, 1000, 100);
        assert!(chunks.len() >= 3);
        assert_eq!(chunks.last().unwrap().end_offset as usize, text.len());
        for c in &chunks {
            assert!(c.start_offset <= c.end_offset);
        }
    }

    #[test]
    fn chunk_text_handles_empty_input() {
        assert!(chunk_text("", 1000, 100).is_empty());
    }

    #[test]
    fn chunk_text_single_short_document_is_one_chunk() {
        let chunks = chunk_text("hello world", 1000, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello world");
    }

    #[test]
    fn extract_and_chunk_rejects_non_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.dat");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0xff]).unwrap();
        let err = extract_and_chunk(&path).unwrap_err();
        assert_eq!(err.kind(), "InvariantViolation");
    }
}
