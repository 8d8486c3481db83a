//! End-to-end exercise of the per-folder embedding store: schema
//! initialization, document/chunk upserts, embeddings, and the vector
//! search primitives, all against a real on-disk SQLite file.

use chrono::Utc;
use folder_mcp::models::{KeyPhrase, NewChunk, SemanticEnrichment};
use folder_mcp::store::EmbeddingStore;

async fn open_store(dir: &std::path::Path) -> EmbeddingStore {
    let pool = folder_mcp::db::connect(dir).await.unwrap();
    let store = EmbeddingStore::new(pool);
    store.initialize("test-model", 4).await.unwrap();
    store
}

fn chunk(index: i64, content: &str) -> NewChunk {
    NewChunk {
        chunk_index: index,
        content: content.to_string(),
        start_offset: 0,
        end_offset: content.len() as i64,
        token_count: content.split_whitespace().count() as i64,
    }
}

fn enrichment(phrase: &str) -> SemanticEnrichment {
    SemanticEnrichment {
        key_phrases: vec![KeyPhrase { text: phrase.to_string(), score: 1.0 }],
        readability_score: 60.0,
    }
}

#[tokio::test]
async fn initialize_is_idempotent_and_rejects_dimension_changes() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    store.initialize("test-model", 4).await.unwrap();

    let err = store.initialize("test-model", 8).await.unwrap_err();
    assert!(matches!(err, folder_mcp::error::HarnessError::SchemaMismatch(_)));
}

#[tokio::test]
async fn upsert_then_fingerprint_lookup_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;

    let id = store
        .upsert_document("a.md", "hash1", 100, "text/markdown", Utc::now())
        .await
        .unwrap();

    let fingerprints = store.get_document_fingerprints().await.unwrap();
    assert_eq!(fingerprints.get("a.md"), Some(&"hash1".to_string()));

    // Re-upserting the same path updates in place rather than duplicating.
    let id2 = store
        .upsert_document("a.md", "hash2", 200, "text/markdown", Utc::now())
        .await
        .unwrap();
    assert_eq!(id, id2);
    let fingerprints = store.get_document_fingerprints().await.unwrap();
    assert_eq!(fingerprints.get("a.md"), Some(&"hash2".to_string()));
}

#[tokio::test]
async fn replace_chunks_rejects_empty_key_phrases() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let doc_id = store
        .upsert_document("a.md", "hash", 10, "text/markdown", Utc::now())
        .await
        .unwrap();

    let chunks = vec![chunk(0, "hello world")];
    let bad_enrichment = vec![SemanticEnrichment { key_phrases: vec![], readability_score: 50.0 }];
    let err = store.replace_chunks(doc_id, &chunks, &bad_enrichment).await.unwrap_err();
    assert!(matches!(err, folder_mcp::error::HarnessError::InvariantViolation(_)));
}

#[tokio::test]
async fn search_chunks_ranks_closer_vector_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let doc_id = store
        .upsert_document("a.md", "hash", 10, "text/markdown", Utc::now())
        .await
        .unwrap();

    let chunks = vec![chunk(0, "rust programming"), chunk(1, "python scripting")];
    let enrichments = vec![enrichment("rust"), enrichment("python")];
    let chunk_ids = store.replace_chunks(doc_id, &chunks, &enrichments).await.unwrap();

    store.insert_chunk_embedding(chunk_ids[0], &[1.0, 0.0, 0.0, 0.0]).await.unwrap();
    store.insert_chunk_embedding(chunk_ids[1], &[0.0, 1.0, 0.0, 0.0]).await.unwrap();

    let results = store.search_chunks(&[1.0, 0.0, 0.0, 0.0], 10).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk_id, chunk_ids[0]);
    assert!(results[0].distance < results[1].distance);
}

#[tokio::test]
async fn delete_document_removes_chunks_and_embeddings() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let doc_id = store
        .upsert_document("a.md", "hash", 10, "text/markdown", Utc::now())
        .await
        .unwrap();
    let chunks = vec![chunk(0, "some content")];
    let enrichments = vec![enrichment("content")];
    let chunk_ids = store.replace_chunks(doc_id, &chunks, &enrichments).await.unwrap();
    store.insert_chunk_embedding(chunk_ids[0], &[1.0, 0.0, 0.0, 0.0]).await.unwrap();
    store.insert_document_embedding(doc_id, &[1.0, 0.0, 0.0, 0.0]).await.unwrap();

    store.delete_document("a.md").await.unwrap();

    assert!(store.get_document_by_id(doc_id).await.unwrap().is_none());
    let results = store.search_chunks(&[1.0, 0.0, 0.0, 0.0], 10).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn find_documents_uses_document_level_embeddings() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let doc_a = store
        .upsert_document("a.md", "hash-a", 10, "text/markdown", Utc::now())
        .await
        .unwrap();
    let doc_b = store
        .upsert_document("b.md", "hash-b", 10, "text/markdown", Utc::now())
        .await
        .unwrap();
    store.insert_document_embedding(doc_a, &[1.0, 0.0, 0.0, 0.0]).await.unwrap();
    store.insert_document_embedding(doc_b, &[0.0, 1.0, 0.0, 0.0]).await.unwrap();
    store.set_document_keywords(doc_a, &[KeyPhrase { text: "alpha".into(), score: 1.0 }]).await.unwrap();

    let hits = store.find_documents(&[1.0, 0.0, 0.0, 0.0], 10).await.unwrap();
    assert_eq!(hits[0].document_id, doc_a);
    assert_eq!(hits[0].document_keywords[0].text, "alpha");
}
