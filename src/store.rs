//! Per-folder embedding store (C1): documents, chunks, chunk/document
//! vectors, and the semantic metadata attached to each chunk.
//!
//! One [`EmbeddingStore`] wraps one SQLite file at
//! `<folder>/.folder-mcp/embeddings.db`. The owning orchestrator is the
//! sole writer; [`EmbeddingStore::searchChunks`]-style readers use plain
//! `SELECT`s against the WAL-mode pool, which is snapshot-consistent with
//! respect to concurrent writers.
//!
//! Schema and transaction shape are grounded in the teacher crate's
//! `migrate.rs` (idempotent `CREATE TABLE IF NOT EXISTS`) and `embedding.rs`
//! (blob encoding, cosine similarity); the invariants enforced here come
//! from the design's store invariants.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};

use crate::error::{HarnessError, Result};
use crate::models::{Chunk, Document, KeyPhrase, NewChunk, SemanticEnrichment};

/// Bumped on schema-breaking changes. A mismatch triggers a rebuild, never
/// an in-place migration.
pub const SCHEMA_VERSION: i64 = 1;

pub struct EmbeddingStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct ChunkSearchRow {
    pub chunk_id: i64,
    pub document_id: i64,
    pub file_path: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub key_phrases: Vec<KeyPhrase>,
    pub readability_score: f32,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct ChunkContent {
    pub content: String,
    pub file_path: String,
    pub chunk_index: i64,
    pub key_phrases: Vec<KeyPhrase>,
}

#[derive(Debug, Clone)]
pub struct DocumentSearchRow {
    pub document_id: i64,
    pub file_path: String,
    pub document_keywords: Vec<KeyPhrase>,
    pub distance: f32,
}

/// A chunk with its content and key phrases but no vector, for exact-term
/// scoring that skips embedding entirely.
#[derive(Debug, Clone)]
pub struct ChunkTermRow {
    pub chunk_id: i64,
    pub document_id: i64,
    pub file_path: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub chunk_index: i64,
    pub content: String,
    pub key_phrases: Vec<KeyPhrase>,
}

impl EmbeddingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the schema if absent. If a store already exists with a
    /// different model dimension or schema version, fails with
    /// `SchemaMismatch` — the caller is responsible for rebuilding.
    pub async fn initialize(&self, model_name: &str, model_dim: usize) -> Result<()> {
        create_tables(&self.pool).await?;

        let existing_version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;

        match existing_version {
            None => {
                sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
                    .bind(SCHEMA_VERSION)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;
            }
            Some(v) if v != SCHEMA_VERSION => {
                return Err(HarnessError::SchemaMismatch(format!(
                    "schema_version {v} != expected {SCHEMA_VERSION}"
                )));
            }
            _ => {}
        }

        let existing_config: Option<(String, i64)> = sqlx::query_as(
            "SELECT model_name, model_dimension FROM embedding_config LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;

        match existing_config {
            None => {
                let now = Utc::now().timestamp();
                sqlx::query(
                    "INSERT INTO embedding_config (model_name, model_dimension, document_embedding_policy, created_at, updated_at) VALUES (?, ?, 'mean_pool_chunks', ?, ?)",
                )
                .bind(model_name)
                .bind(model_dim as i64)
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;
            }
            Some((_, dim)) if dim as usize != model_dim => {
                return Err(HarnessError::SchemaMismatch(format!(
                    "stored model dimension {dim} != requested {model_dim}"
                )));
            }
            _ => {}
        }

        Ok(())
    }

    /// Idempotent upsert keyed by `file_path`. Returns the document id.
    pub async fn upsert_document(
        &self,
        file_path: &str,
        fingerprint: &str,
        file_size: u64,
        mime_type: &str,
        last_modified: chrono::DateTime<Utc>,
    ) -> Result<i64> {
        let now = Utc::now().timestamp();
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM documents WHERE file_path = ?")
                .bind(file_path)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| HarnessError::Transient(e.to_string()))?;

        if let Some(id) = existing {
            sqlx::query(
                "UPDATE documents SET fingerprint = ?, file_size = ?, mime_type = ?, last_modified = ?, last_indexed = ?, needs_reindex = 0 WHERE id = ?",
            )
            .bind(fingerprint)
            .bind(file_size as i64)
            .bind(mime_type)
            .bind(last_modified.timestamp())
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
            Ok(id)
        } else {
            let result = sqlx::query(
                "INSERT INTO documents (file_path, fingerprint, file_size, mime_type, last_modified, last_indexed, needs_reindex, document_keywords, keywords_extracted) VALUES (?, ?, ?, ?, ?, ?, 0, '[]', 0)",
            )
            .bind(file_path)
            .bind(fingerprint)
            .bind(file_size as i64)
            .bind(mime_type)
            .bind(last_modified.timestamp())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
            Ok(result.last_insert_rowid())
        }
    }

    /// Transactionally replaces all chunks (and their embeddings) for a
    /// document, enforcing the semantic-enrichment invariant: a chunk
    /// without key phrases or a readability score outside `[0, 100]`
    /// fails loudly rather than persisting partial data.
    pub async fn replace_chunks(
        &self,
        document_id: i64,
        chunks: &[NewChunk],
        enrichments: &[SemanticEnrichment],
    ) -> Result<Vec<i64>> {
        if chunks.len() != enrichments.len() {
            return Err(HarnessError::InvariantViolation(
                "chunk count must match enrichment count".into(),
            ));
        }
        for e in enrichments {
            if e.key_phrases.is_empty() {
                return Err(HarnessError::InvariantViolation(
                    "semanticProcessed requires non-empty keyPhrases".into(),
                ));
            }
            if !(0.0..=100.0).contains(&e.readability_score) {
                return Err(HarnessError::InvariantViolation(format!(
                    "readabilityScore {} out of [0,100]",
                    e.readability_score
                )));
            }
        }
        for c in chunks {
            if c.start_offset < 0 || c.start_offset > c.end_offset {
                return Err(HarnessError::InvariantViolation(
                    "chunk offsets must satisfy 0 <= start <= end".into(),
                ));
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;

        sqlx::query(
            "DELETE FROM chunk_embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)",
        )
        .bind(document_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| HarnessError::Transient(e.to_string()))?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;

        let now = Utc::now().timestamp();
        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, enrichment) in chunks.iter().zip(enrichments.iter()) {
            let key_phrases_json = serde_json::to_string(&enrichment.key_phrases)
                .map_err(|e| HarnessError::InvariantViolation(e.to_string()))?;
            let result = sqlx::query(
                "INSERT INTO chunks (document_id, chunk_index, content, start_offset, end_offset, token_count, key_phrases, readability_score, semantic_processed, semantic_timestamp) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
            )
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.start_offset)
            .bind(chunk.end_offset)
            .bind(chunk.token_count)
            .bind(key_phrases_json)
            .bind(enrichment.readability_score)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit()
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;

        Ok(ids)
    }

    pub async fn insert_chunk_embedding(&self, chunk_id: i64, vec: &[f32]) -> Result<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM chunks WHERE id = ?")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
        if exists.is_none() {
            return Err(HarnessError::InvariantViolation(format!(
                "no chunk with id {chunk_id}"
            )));
        }
        let blob = vec_to_blob(vec);
        sqlx::query(
            "INSERT OR REPLACE INTO chunk_embeddings (chunk_id, document_id, vec) SELECT ?, document_id, ? FROM chunks WHERE id = ?",
        )
        .bind(chunk_id)
        .bind(blob)
        .bind(chunk_id)
        .execute(&self.pool)
        .await
        .map_err(|e| HarnessError::Transient(e.to_string()))?;
        Ok(())
    }

    pub async fn insert_document_embedding(&self, document_id: i64, vec: &[f32]) -> Result<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
        if exists.is_none() {
            return Err(HarnessError::InvariantViolation(format!(
                "no document with id {document_id}"
            )));
        }
        let blob = vec_to_blob(vec);
        sqlx::query("INSERT OR REPLACE INTO document_embeddings (document_id, vec) VALUES (?, ?)")
            .bind(document_id)
            .bind(blob)
            .execute(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
        Ok(())
    }

    /// Sets document-level keywords after all of its chunks have been
    /// stored (computed once per document).
    pub async fn set_document_keywords(&self, document_id: i64, keywords: &[KeyPhrase]) -> Result<()> {
        let json = serde_json::to_string(keywords)
            .map_err(|e| HarnessError::InvariantViolation(e.to_string()))?;
        sqlx::query("UPDATE documents SET document_keywords = ?, keywords_extracted = 1 WHERE id = ?")
            .bind(json)
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_document(&self, file_path: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;

        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE file_path = ?")
            .bind(file_path)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;

        if let Some(id) = id {
            sqlx::query("DELETE FROM document_embeddings WHERE document_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| HarnessError::Transient(e.to_string()))?;
            sqlx::query(
                "DELETE FROM chunk_embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)",
            )
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
            sqlx::query("DELETE FROM chunks WHERE document_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| HarnessError::Transient(e.to_string()))?;
            sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| HarnessError::Transient(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
        Ok(())
    }

    pub async fn get_document_fingerprints(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT file_path, fingerprint FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("file_path"), r.get("fingerprint")))
            .collect())
    }

    pub async fn get_all_document_paths(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query_scalar::<_, String>("SELECT file_path FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
        Ok(rows.into_iter().collect())
    }

    pub async fn get_document_by_id(&self, document_id: i64) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, file_path, fingerprint, file_size, mime_type, last_modified, last_indexed, needs_reindex, document_keywords, keywords_extracted FROM documents WHERE id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HarnessError::Transient(e.to_string()))?;

        Ok(row.map(row_to_document))
    }

    /// Metadata-only chunk search; content is lazy-loaded separately via
    /// [`EmbeddingStore::get_chunks_content`].
    pub async fn search_chunks(&self, query_vec: &[f32], k: usize) -> Result<Vec<ChunkSearchRow>> {
        let rows = sqlx::query(
            "SELECT c.id as chunk_id, c.document_id, d.file_path, c.start_offset, c.end_offset, c.key_phrases, c.readability_score, ce.vec \
             FROM chunk_embeddings ce \
             JOIN chunks c ON c.id = ce.chunk_id \
             JOIN documents d ON d.id = c.document_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HarnessError::Transient(e.to_string()))?;

        let mut scored: Vec<ChunkSearchRow> = rows
            .into_iter()
            .map(|r| {
                let vec_blob: Vec<u8> = r.get("vec");
                let vec = blob_to_vec(&vec_blob);
                let distance = 1.0 - cosine_similarity(query_vec, &vec);
                let key_phrases: String = r.get("key_phrases");
                ChunkSearchRow {
                    chunk_id: r.get("chunk_id"),
                    document_id: r.get("document_id"),
                    file_path: r.get("file_path"),
                    start_offset: r.get("start_offset"),
                    end_offset: r.get("end_offset"),
                    key_phrases: serde_json::from_str(&key_phrases).unwrap_or_default(),
                    readability_score: r.get("readability_score"),
                    distance,
                }
            })
            .collect();

        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Every chunk's content and key phrases, for exact-term-only search
    /// where there is no query vector to rank against.
    pub async fn all_chunks_for_term_search(&self) -> Result<Vec<ChunkTermRow>> {
        let rows = sqlx::query(
            "SELECT c.id as chunk_id, c.document_id, d.file_path, c.start_offset, c.end_offset, \
             c.chunk_index, c.content, c.key_phrases \
             FROM chunks c JOIN documents d ON d.id = c.document_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HarnessError::Transient(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let key_phrases: String = r.get("key_phrases");
                ChunkTermRow {
                    chunk_id: r.get("chunk_id"),
                    document_id: r.get("document_id"),
                    file_path: r.get("file_path"),
                    start_offset: r.get("start_offset"),
                    end_offset: r.get("end_offset"),
                    chunk_index: r.get("chunk_index"),
                    content: r.get("content"),
                    key_phrases: serde_json::from_str(&key_phrases).unwrap_or_default(),
                }
            })
            .collect())
    }

    pub async fn get_chunks_content(
        &self,
        chunk_ids: &[i64],
    ) -> Result<HashMap<i64, ChunkContent>> {
        if chunk_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = chunk_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT c.id as chunk_id, c.content, d.file_path, c.chunk_index, c.key_phrases \
             FROM chunks c JOIN documents d ON d.id = c.document_id WHERE c.id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql);
        for id in chunk_ids {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let key_phrases: String = r.get("key_phrases");
                (
                    r.get("chunk_id"),
                    ChunkContent {
                        content: r.get("content"),
                        file_path: r.get("file_path"),
                        chunk_index: r.get("chunk_index"),
                        key_phrases: serde_json::from_str(&key_phrases).unwrap_or_default(),
                    },
                )
            })
            .collect())
    }

    pub async fn find_documents(&self, query_vec: &[f32], k: usize) -> Result<Vec<DocumentSearchRow>> {
        let rows = sqlx::query(
            "SELECT d.id as document_id, d.file_path, d.document_keywords, de.vec \
             FROM document_embeddings de JOIN documents d ON d.id = de.document_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HarnessError::Transient(e.to_string()))?;

        let mut scored: Vec<DocumentSearchRow> = rows
            .into_iter()
            .map(|r| {
                let vec_blob: Vec<u8> = r.get("vec");
                let vec = blob_to_vec(&vec_blob);
                let distance = 1.0 - cosine_similarity(query_vec, &vec);
                let keywords: String = r.get("document_keywords");
                DocumentSearchRow {
                    document_id: r.get("document_id"),
                    file_path: r.get("file_path"),
                    document_keywords: serde_json::from_str(&keywords).unwrap_or_default(),
                    distance,
                }
            })
            .collect();

        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Deletes chunk embeddings whose chunk no longer exists. Returns the
    /// number of rows purged.
    pub async fn purge_chunk_embeddings_without_chunk(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM chunk_embeddings WHERE chunk_id NOT IN (SELECT id FROM chunks)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HarnessError::Transient(e.to_string()))?;
        Ok(result.rows_affected())
    }

    pub async fn purge_document_embeddings_without_document(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM document_embeddings WHERE document_id NOT IN (SELECT id FROM documents)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HarnessError::Transient(e.to_string()))?;
        Ok(result.rows_affected())
    }

    pub async fn count_document_embeddings(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM document_embeddings")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))
    }

    pub async fn count_documents(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))
    }

    pub async fn count_chunk_embeddings(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chunk_embeddings")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))
    }

    pub async fn count_chunks(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))
    }

    /// Persists the in-flight task list for crash recovery (`file_states`).
    pub async fn save_file_states(&self, tasks_json: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query("DELETE FROM file_states").execute(&self.pool).await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
        sqlx::query("INSERT INTO file_states (tasks_json, updated_at) VALUES (?, ?)")
            .bind(tasks_json)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
        Ok(())
    }

    pub async fn load_file_states(&self) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT tasks_json FROM file_states ORDER BY updated_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))
    }

    pub async fn clear_file_states(&self) -> Result<()> {
        sqlx::query("DELETE FROM file_states")
            .execute(&self.pool)
            .await
            .map_err(|e| HarnessError::Transient(e.to_string()))?;
        Ok(())
    }
}

fn row_to_document(r: sqlx::sqlite::SqliteRow) -> Document {
    let keywords: String = r.get("document_keywords");
    Document {
        id: r.get("id"),
        file_path: r.get("file_path"),
        fingerprint: r.get("fingerprint"),
        file_size: r.get::<i64, _>("file_size") as u64,
        mime_type: r.get("mime_type"),
        last_modified: chrono::DateTime::from_timestamp(r.get("last_modified"), 0)
            .unwrap_or_default(),
        last_indexed: chrono::DateTime::from_timestamp(r.get("last_indexed"), 0)
            .unwrap_or_default(),
        needs_reindex: r.get::<i64, _>("needs_reindex") != 0,
        document_keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        keywords_extracted: r.get::<i64, _>("keywords_extracted") != 0,
    }
}

async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT NOT NULL UNIQUE,
            fingerprint TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            mime_type TEXT NOT NULL,
            last_modified INTEGER NOT NULL,
            last_indexed INTEGER NOT NULL,
            needs_reindex INTEGER NOT NULL DEFAULT 0,
            document_keywords TEXT NOT NULL DEFAULT '[]',
            keywords_extracted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            token_count INTEGER NOT NULL,
            key_phrases TEXT NOT NULL DEFAULT '[]',
            readability_score REAL NOT NULL DEFAULT 0,
            semantic_processed INTEGER NOT NULL DEFAULT 0,
            semantic_timestamp INTEGER,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_embeddings (
            chunk_id INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL,
            vec BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_embeddings (
            document_id INTEGER PRIMARY KEY,
            vec BLOB NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embedding_config (
            model_name TEXT NOT NULL,
            model_dimension INTEGER NOT NULL,
            document_embedding_policy TEXT NOT NULL DEFAULT 'mean_pool_chunks',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_states (
            tasks_json TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_file_path ON documents(file_path)")
        .execute(pool)
        .await
        .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_fingerprint ON documents(fingerprint)")
        .execute(pool)
        .await
        .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await
        .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_semantic_processed ON chunks(semantic_processed)",
    )
    .execute(pool)
    .await
    .map_err(|e| HarnessError::StoreCorrupt(e.to_string()))?;

    Ok(())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Mean-pool a set of vectors into one (used for document embeddings and
/// multi-concept semantic search).
pub fn mean_pool(vecs: &[Vec<f32>]) -> Vec<f32> {
    if vecs.is_empty() {
        return Vec::new();
    }
    let dim = vecs[0].len();
    let mut out = vec![0.0f32; dim];
    for v in vecs {
        for (i, x) in v.iter().enumerate() {
            if i < dim {
                out[i] += x;
            }
        }
    }
    let n = vecs.len() as f32;
    for x in &mut out {
        *x /= n;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> EmbeddingStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = EmbeddingStore::new(pool);
        store.initialize("test-model", 3).await.unwrap();
        store
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let store = memory_store().await;
        store.initialize("test-model", 3).await.unwrap();
    }

    #[tokio::test]
    async fn initialize_rejects_dimension_change() {
        let store = memory_store().await;
        let err = store.initialize("test-model", 4).await.unwrap_err();
        assert_eq!(err.kind(), "SchemaMismatch");
    }

    #[tokio::test]
    async fn upsert_document_is_idempotent_by_path() {
        let store = memory_store().await;
        let now = Utc::now();
        let id1 = store
            .upsert_document("a.txt", "hash1", 10, "text/plain", now)
            .await
            .unwrap();
        let id2 = store
            .upsert_document("a.txt", "hash2", 11, "text/plain", now)
            .await
            .unwrap();
        assert_eq!(id1, id2);
        let fps = store.get_document_fingerprints().await.unwrap();
        assert_eq!(fps.get("a.txt").unwrap(), "hash2");
    }

    #[tokio::test]
    async fn replace_chunks_rejects_missing_keyphrases() {
        let store = memory_store().await;
        let doc_id = store
            .upsert_document("a.txt", "h", 5, "text/plain", Utc::now())
            .await
            .unwrap();
        let chunks = vec![NewChunk {
            chunk_index: 0,
            content: "hello".into(),
            start_offset: 0,
            end_offset: 5,
            token_count: 1,
        }];
        let enrichments = vec![SemanticEnrichment {
            key_phrases: vec![],
            readability_score: 50.0,
        }];
        let err = store
            .replace_chunks(doc_id, &chunks, &enrichments)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvariantViolation");
    }

    #[tokio::test]
    async fn full_write_then_search_roundtrip() {
        let store = memory_store().await;
        let doc_id = store
            .upsert_document("a.txt", "h", 5, "text/plain", Utc::now())
            .await
            .unwrap();
        let chunks = vec![NewChunk {
            chunk_index: 0,
            content: "hello world".into(),
            start_offset: 0,
            end_offset: 11,
            token_count: 2,
        }];
        let enrichments = vec![SemanticEnrichment {
            key_phrases: vec![KeyPhrase {
                text: "hello".into(),
                score: 0.9,
            }],
            readability_score: 60.0,
        }];
        let ids = store
            .replace_chunks(doc_id, &chunks, &enrichments)
            .await
            .unwrap();
        store
            .insert_chunk_embedding(ids[0], &[1.0, 0.0, 0.0])
            .await
            .unwrap();
        store
            .insert_document_embedding(doc_id, &[1.0, 0.0, 0.0])
            .await
            .unwrap();

        let hits = store.search_chunks(&[1.0, 0.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].distance).abs() < 1e-6);

        let orphans = store.purge_chunk_embeddings_without_chunk().await.unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn delete_document_cascades() {
        let store = memory_store().await;
        let doc_id = store
            .upsert_document("a.txt", "h", 5, "text/plain", Utc::now())
            .await
            .unwrap();
        let chunks = vec![NewChunk {
            chunk_index: 0,
            content: "hi".into(),
            start_offset: 0,
            end_offset: 2,
            token_count: 1,
        }];
        let enrichments = vec![SemanticEnrichment {
            key_phrases: vec![KeyPhrase {
                text: "hi".into(),
                score: 0.5,
            }],
            readability_score: 50.0,
        }];
        let ids = store.replace_chunks(doc_id, &chunks, &enrichments).await.unwrap();
        store.insert_chunk_embedding(ids[0], &[1.0, 0.0, 0.0]).await.unwrap();
        store.insert_document_embedding(doc_id, &[1.0, 0.0, 0.0]).await.unwrap();

        store.delete_document("a.txt").await.unwrap();

        assert_eq!(store.count_documents().await.unwrap(), 0);
        assert_eq!(store.count_chunks().await.unwrap(), 0);
        assert_eq!(store.count_chunk_embeddings().await.unwrap(), 0);
        assert_eq!(store.count_document_embeddings().await.unwrap(), 0);
    }

    #[test]
    fn vec_blob_roundtrip() {
        let v = vec![1.0f32, -2.5, 3.125];
        let blob = vec_to_blob(&v);
        assert_eq!(blob_to_vec(&blob), v);
    }

    #[test]
    fn mean_pool_averages() {
        let pooled = mean_pool(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(pooled, vec![0.5, 0.5]);
    }
}
