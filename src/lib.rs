//! # folder-mcp
//!
//! **A local-first folder indexing and semantic search daemon for MCP
//! clients.**
//!
//! folder-mcp watches a set of configured folders, extracts and chunks their
//! documents, generates embeddings through a subprocess model host, and
//! exposes the resulting index over a REST facade consumed by a thin MCP
//! bridge process. Everything runs on the machine the folders live on; no
//! document content leaves the host.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌─────────────┐
//! │  Folders   │──▶│ Orchestrator │──▶│  SQLite      │
//! │ (watched)  │   │ + task queue │   │ (per folder) │
//! └───────────┘   └──────┬───────┘   └──────┬──────┘
//!                        │                  │
//!                        ▼                  ▼
//!                 ┌─────────────┐     ┌────────────┐
//!                 │ model host  │     │ REST facade │
//!                 │ (subprocess)│     │   (axum)    │
//!                 └─────────────┘     └──────┬─────┘
//!                                            │
//!                                     ┌──────▼──────┐
//!                                     │ MCP bridge   │
//!                                     │ (stdio JSON-RPC) │
//!                                     └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: folders, tasks, documents, chunks |
//! | [`error`] | Shared error taxonomy (`HarnessError`) |
//! | [`db`] | Per-folder SQLite connection management (WAL mode) |
//! | [`store`] | Embedding store: schema, CRUD, vector search primitives |
//! | [`extract`] | Plain-text extraction and overlapping chunking |
//! | [`change_detector`] | Folder scanning and fingerprint-based change detection |
//! | [`task_queue`] | Bounded retrying FIFO of per-file embedding tasks |
//! | [`folder_state`] | Folder lifecycle state machine |
//! | [`resource_manager`] | Priority-queued concurrency gate for model host calls |
//! | [`model_host`] | Embedding model subprocess supervisor (JSON-RPC over stdio) |
//! | [`orchestrator`] | Per-folder coordinator tying scanning, queueing, and embedding together |
//! | [`search`] | Concept-pooled semantic content and document search |
//! | [`sync_service`] | Periodic rescan and orphan-vector repair sweep |
//! | [`cache`] | Checksummed, TTL'd on-disk cache envelope |
//! | [`watcher`] | Filesystem change-event contract |
//! | [`rest`] | MCP-compatible HTTP facade (Axum) with CORS |
//! | [`mcp_bridge`] | stdio JSON-RPC bridge proxying to the REST facade |
//!
//! ## Configuration
//!
//! folder-mcp is configured via a TOML file (default:
//! `./config/folder-mcp.toml`). See [`config`] for all available options and
//! [`config::load_config`] for validation rules.

pub mod cache;
pub mod change_detector;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod folder_state;
pub mod mcp_bridge;
pub mod model_host;
pub mod models;
pub mod orchestrator;
pub mod resource_manager;
pub mod rest;
pub mod search;
pub mod store;
pub mod sync_service;
pub mod task_queue;
pub mod watcher;
