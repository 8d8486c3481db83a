//! Search Engine (C8): hybrid chunk-level `search_content` and
//! document-level `find_documents`.
//!
//! Chunk search embeds `semantic_concepts` through the model host, mean-
//! pools multi-concept queries into one vector (a stable policy choice,
//! not a per-call one — see SPEC_FULL.md), scores by cosine distance, then
//! boosts chunks whose content or key phrases contain an exact match of
//! any `exact_terms` entry by 1.5x, clipped at a similarity of `1.0`. When
//! only `exact_terms` is given, embedding is skipped entirely and chunks
//! are ranked by term-match count. This keeps the teacher crate's min-max
//! hybrid-merge *shape* (semantic score + lexical bonus) from `search.rs`
//! while replacing its FTS5/BM25 lexical half with a cheap substring
//! check, since chunk content is already loaded for scoring.

use serde::Serialize;

use crate::error::Result;
use crate::model_host::{CallPriority, ModelHost};
use crate::models::KeyPhrase;
use crate::store::{mean_pool, EmbeddingStore};

/// Number of `exact_terms` that match a chunk's content or any of its key
/// phrases, case-insensitively.
fn count_matching_terms(lower_terms: &[String], content: &str, key_phrases: &[KeyPhrase]) -> usize {
    if lower_terms.is_empty() {
        return 0;
    }
    let lower_content = content.to_lowercase();
    lower_terms
        .iter()
        .filter(|term| {
            lower_content.contains(term.as_str())
                || key_phrases
                    .iter()
                    .any(|kp| kp.text.to_lowercase().contains(term.as_str()))
        })
        .count()
}

const EXACT_TERM_BOOST: f32 = 1.5;

#[derive(Debug, Clone, Serialize)]
pub struct ContentSearchHit {
    pub chunk_id: i64,
    pub document_id: i64,
    pub file_path: String,
    pub content: String,
    pub chunk_index: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub key_phrases: Vec<KeyPhrase>,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSearchHit {
    pub document_id: i64,
    pub file_path: String,
    pub document_keywords: Vec<KeyPhrase>,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchPage<T> {
    pub hits: Vec<T>,
    pub continuation_token: Option<String>,
}

/// Searches chunk content by semantic concepts, exact terms, or both.
/// `semantic_concepts` are mean-pooled into a single query vector before
/// cosine scoring (the chosen, stable multi-concept policy); `exact_terms`
/// case-insensitively boost any chunk whose content or key phrases contain
/// one of them. When `semantic_concepts` is empty, embedding is skipped
/// entirely and chunks are ranked by how many `exact_terms` they match.
/// At least one of the two must be non-empty; callers validate this.
pub async fn search_content(
    store: &EmbeddingStore,
    model_host: &ModelHost,
    semantic_concepts: &[String],
    exact_terms: &[String],
    max_results: usize,
    continuation_token: Option<&str>,
) -> Result<SearchPage<ContentSearchHit>> {
    let lower_terms: Vec<String> = exact_terms.iter().map(|t| t.to_lowercase()).collect();
    let offset = parse_continuation(continuation_token);

    let mut hits: Vec<ContentSearchHit> = if semantic_concepts.is_empty() {
        let rows = store.all_chunks_for_term_search().await?;
        rows.into_iter()
            .filter_map(|row| {
                let match_count = count_matching_terms(&lower_terms, &row.content, &row.key_phrases);
                if match_count == 0 {
                    return None;
                }
                Some(ContentSearchHit {
                    chunk_id: row.chunk_id,
                    document_id: row.document_id,
                    file_path: row.file_path,
                    content: row.content,
                    chunk_index: row.chunk_index,
                    start_offset: row.start_offset,
                    end_offset: row.end_offset,
                    key_phrases: row.key_phrases,
                    score: match_count as f32,
                })
            })
            .collect()
    } else {
        let concept_vectors = model_host
            .generate_embeddings(semantic_concepts, CallPriority::Immediate)
            .await?;
        let query_vector = mean_pool(&concept_vectors);

        let fetch_count = offset + max_results + 1;
        let scored = store.search_chunks(&query_vector, fetch_count).await?;

        let chunk_ids: Vec<i64> = scored.iter().map(|r| r.chunk_id).collect();
        let contents = store.get_chunks_content(&chunk_ids).await?;

        scored
            .into_iter()
            .filter_map(|row| {
                let content = contents.get(&row.chunk_id)?;
                let base_score = 1.0 - row.distance;
                let has_exact_term =
                    count_matching_terms(&lower_terms, &content.content, &row.key_phrases) > 0;
                let score = if has_exact_term {
                    (base_score * EXACT_TERM_BOOST).min(1.0)
                } else {
                    base_score
                };
                Some(ContentSearchHit {
                    chunk_id: row.chunk_id,
                    document_id: row.document_id,
                    file_path: row.file_path,
                    content: content.content.clone(),
                    chunk_index: content.chunk_index,
                    start_offset: row.start_offset,
                    end_offset: row.end_offset,
                    key_phrases: row.key_phrases,
                    score,
                })
            })
            .collect()
    };

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let safe_offset = offset.min(hits.len());
    let remaining_after_offset = hits.len() - safe_offset;
    let page: Vec<ContentSearchHit> = hits.drain(safe_offset..).take(max_results).collect();
    let next_token = if remaining_after_offset > max_results {
        Some((safe_offset + max_results).to_string())
    } else {
        None
    };

    Ok(SearchPage {
        hits: page,
        continuation_token: next_token,
    })
}

/// Searches at document granularity using the document-level embedding
/// (mean-pool of the document's chunk vectors, computed once by the
/// orchestrator).
pub async fn find_documents(
    store: &EmbeddingStore,
    model_host: &ModelHost,
    concepts: &[String],
    max_results: usize,
) -> Result<Vec<DocumentSearchHit>> {
    let concept_vectors = model_host
        .generate_embeddings(concepts, CallPriority::Immediate)
        .await?;
    let query_vector = mean_pool(&concept_vectors);

    let scored = store.find_documents(&query_vector, max_results).await?;
    Ok(scored
        .into_iter()
        .map(|row| DocumentSearchHit {
            document_id: row.document_id,
            file_path: row.file_path,
            document_keywords: row.document_keywords,
            score: 1.0 - row.distance,
        })
        .collect())
}

fn parse_continuation(token: Option<&str>) -> usize {
    token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_token_defaults_to_zero() {
        assert_eq!(parse_continuation(None), 0);
        assert_eq!(parse_continuation(Some("5")), 5);
        assert_eq!(parse_continuation(Some("not-a-number")), 0);
    }

    #[test]
    fn exact_term_boost_is_clipped_at_one() {
        let base_score = 0.9f32;
        let boosted = (base_score * EXACT_TERM_BOOST).min(1.0);
        assert_eq!(boosted, 1.0);
    }

    #[test]
    fn exact_term_matches_key_phrase_text_not_just_content() {
        let terms = vec!["greeting".to_string()];
        let key_phrases = vec![KeyPhrase { text: "Greeting".to_string(), score: 0.5 }];
        assert_eq!(count_matching_terms(&terms, "unrelated content", &key_phrases), 1);
    }

    #[test]
    fn no_exact_terms_never_matches() {
        assert_eq!(count_matching_terms(&[], "hello world", &[]), 0);
    }
}
