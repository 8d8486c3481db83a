//! Daemon REST Facade (C10): the HTTP surface the MCP bridge (and any
//! other local client) talks to.
//!
//! Router wiring, CORS, and the uniform JSON error body are grounded in
//! the teacher crate's `server.rs` (`AppError` converting into an Axum
//! response, `Any`-origin CORS for local tool integration); the route set
//! itself is new, matching this daemon's resource model instead of the
//! teacher's `/tools/*` surface.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::HarnessError;
use crate::model_host::ModelHost;
use crate::orchestrator::FolderOrchestrator;
use crate::search::{find_documents, search_content};

#[derive(Clone)]
pub struct AppState {
    pub orchestrators: Arc<HashMap<String, Arc<FolderOrchestrator>>>,
    pub model_host: Arc<ModelHost>,
    pub version: &'static str,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/server-info", get(handle_server_info))
        .route("/folders", get(handle_list_folders))
        .route("/folders/{id}/scan", post(handle_scan_folder))
        .route("/folders/{id}/documents", get(handle_list_documents))
        .route("/documents/{folder_id}/{doc_id}/metadata", get(handle_document_metadata))
        .route("/documents/{folder_id}/{doc_id}/chunks", post(handle_document_chunks))
        .route("/documents/{folder_id}/{doc_id}/text", get(handle_document_text))
        .route("/search/content", post(handle_search_content))
        .route("/search/documents", post(handle_search_documents))
        .route("/explore", get(handle_explore))
        .layer(cors)
        .with_state(state)
}

// ============ error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    inner: HarnessError,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.inner.kind(),
                message: self.inner.to_string(),
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<HarnessError> for AppError {
    fn from(inner: HarnessError) -> Self {
        let status = match &inner {
            HarnessError::NotFound(_) => StatusCode::NOT_FOUND,
            HarnessError::SchemaMismatch(_) | HarnessError::StoreCorrupt(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            HarnessError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            HarnessError::PermanentTaskFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
            HarnessError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            HarnessError::Cancelled(_) => StatusCode::CONFLICT,
            HarnessError::ProtocolViolation(_) => StatusCode::BAD_REQUEST,
            HarnessError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError { status, inner }
    }
}

fn folder_not_found(id: &str) -> AppError {
    HarnessError::NotFound(format!("no folder with id {id}")).into()
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ============ GET /server-info ============

#[derive(Serialize)]
struct ServerInfoResponse {
    version: &'static str,
    folder_count: usize,
}

async fn handle_server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        version: state.version,
        folder_count: state.orchestrators.len(),
    })
}

// ============ GET /folders ============

async fn handle_list_folders(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::models::FolderStateSnapshot>>, AppError> {
    let mut snapshots = Vec::with_capacity(state.orchestrators.len());
    for orchestrator in state.orchestrators.values() {
        snapshots.push(orchestrator.snapshot().await);
    }
    Ok(Json(snapshots))
}

// ============ POST /folders/{id}/scan ============

async fn handle_scan_folder(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::models::FolderStateSnapshot>, AppError> {
    let orchestrator = state.orchestrators.get(&id).ok_or_else(|| folder_not_found(&id))?;
    orchestrator.rescan().await?;
    Ok(Json(orchestrator.snapshot().await))
}

// ============ GET /folders/{id}/documents ============

#[derive(Serialize)]
struct DocumentSummary {
    file_path: String,
}

async fn handle_list_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DocumentSummary>>, AppError> {
    let orchestrator = state.orchestrators.get(&id).ok_or_else(|| folder_not_found(&id))?;
    let paths = orchestrator.store().get_all_document_paths().await?;
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();
    Ok(Json(paths.into_iter().map(|file_path| DocumentSummary { file_path }).collect()))
}

// ============ GET /documents/{folder_id}/{doc_id}/metadata ============

async fn handle_document_metadata(
    State(state): State<AppState>,
    Path((folder_id, doc_id)): Path<(String, i64)>,
) -> Result<Json<crate::models::Document>, AppError> {
    let orchestrator = state.orchestrators.get(&folder_id).ok_or_else(|| folder_not_found(&folder_id))?;
    let document = orchestrator
        .store()
        .get_document_by_id(doc_id)
        .await?
        .ok_or_else(|| AppError::from(HarnessError::NotFound(format!("no document {doc_id}"))))?;
    Ok(Json(document))
}

// ============ POST /documents/{folder_id}/{doc_id}/chunks ============

#[derive(Deserialize)]
struct ChunksRequest {
    chunk_ids: Vec<i64>,
}

#[derive(Serialize)]
struct ChunkContentResponse {
    chunk_id: i64,
    content: String,
    chunk_index: i64,
}

async fn handle_document_chunks(
    State(state): State<AppState>,
    Path((folder_id, _doc_id)): Path<(String, i64)>,
    Json(request): Json<ChunksRequest>,
) -> Result<Json<Vec<ChunkContentResponse>>, AppError> {
    let orchestrator = state.orchestrators.get(&folder_id).ok_or_else(|| folder_not_found(&folder_id))?;
    let contents = orchestrator.store().get_chunks_content(&request.chunk_ids).await?;
    let mut out: Vec<ChunkContentResponse> = contents
        .into_iter()
        .map(|(chunk_id, content)| ChunkContentResponse {
            chunk_id,
            content: content.content,
            chunk_index: content.chunk_index,
        })
        .collect();
    out.sort_by_key(|c| c.chunk_index);
    Ok(Json(out))
}

// ============ GET /documents/{folder_id}/{doc_id}/text ============

#[derive(Serialize)]
struct DocumentTextResponse {
    text: String,
}

async fn handle_document_text(
    State(state): State<AppState>,
    Path((folder_id, doc_id)): Path<(String, i64)>,
) -> Result<Json<DocumentTextResponse>, AppError> {
    let orchestrator = state.orchestrators.get(&folder_id).ok_or_else(|| folder_not_found(&folder_id))?;
    let document = orchestrator
        .store()
        .get_document_by_id(doc_id)
        .await?
        .ok_or_else(|| AppError::from(HarnessError::NotFound(format!("no document {doc_id}"))))?;

    let full_path = orchestrator.folder_path().join(&document.file_path);
    let text = std::fs::read_to_string(&full_path)
        .map_err(|e| AppError::from(HarnessError::Transient(e.to_string())))?;
    Ok(Json(DocumentTextResponse { text }))
}

// ============ POST /search/content ============

#[derive(Deserialize)]
struct ContentSearchRequest {
    folder_id: String,
    #[serde(default)]
    semantic_concepts: Vec<String>,
    #[serde(default)]
    exact_terms: Vec<String>,
    #[serde(default = "default_max_results")]
    max_results: usize,
    #[serde(default)]
    continuation_token: Option<String>,
}

fn default_max_results() -> usize {
    20
}

async fn handle_search_content(
    State(state): State<AppState>,
    Json(request): Json<ContentSearchRequest>,
) -> Result<Json<crate::search::SearchPage<crate::search::ContentSearchHit>>, AppError> {
    if request.semantic_concepts.is_empty() && request.exact_terms.is_empty() {
        return Err(HarnessError::ProtocolViolation(
            "at least one of semantic_concepts or exact_terms is required".into(),
        )
        .into());
    }
    let orchestrator = state
        .orchestrators
        .get(&request.folder_id)
        .ok_or_else(|| folder_not_found(&request.folder_id))?;
    let page = search_content(
        orchestrator.store(),
        &state.model_host,
        &request.semantic_concepts,
        &request.exact_terms,
        request.max_results,
        request.continuation_token.as_deref(),
    )
    .await?;
    Ok(Json(page))
}

// ============ POST /search/documents ============

#[derive(Deserialize)]
struct DocumentSearchRequest {
    folder_id: String,
    concepts: Vec<String>,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

async fn handle_search_documents(
    State(state): State<AppState>,
    Json(request): Json<DocumentSearchRequest>,
) -> Result<Json<Vec<crate::search::DocumentSearchHit>>, AppError> {
    if request.concepts.is_empty() {
        return Err(HarnessError::ProtocolViolation("concepts must not be empty".into()).into());
    }
    let orchestrator = state
        .orchestrators
        .get(&request.folder_id)
        .ok_or_else(|| folder_not_found(&request.folder_id))?;
    let hits = find_documents(
        orchestrator.store(),
        &state.model_host,
        &request.concepts,
        request.max_results,
    )
    .await?;
    Ok(Json(hits))
}

// ============ GET /explore ============

#[derive(Deserialize)]
struct ExploreQuery {
    folder_id: String,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Serialize)]
struct ExploreEntry {
    name: String,
    is_dir: bool,
}

async fn handle_explore(
    State(state): State<AppState>,
    Query(query): Query<ExploreQuery>,
) -> Result<Json<Vec<ExploreEntry>>, AppError> {
    let orchestrator = state
        .orchestrators
        .get(&query.folder_id)
        .ok_or_else(|| folder_not_found(&query.folder_id))?;

    let mut target = orchestrator.folder_path().to_path_buf();
    if let Some(path) = &query.path {
        if std::path::Path::new(path).components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(HarnessError::ProtocolViolation("path must not contain '..'".into()).into());
        }
        target = target.join(path);
    }

    let read_dir = std::fs::read_dir(&target)
        .map_err(|e| AppError::from(HarnessError::NotFound(format!("cannot explore {}: {e}", target.display()))))?;

    let mut entries = Vec::new();
    for entry in read_dir.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        entries.push(ExploreEntry { name, is_dir });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(entries))
}
