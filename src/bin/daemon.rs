//! `folder-mcp-daemon` — long-running process owning C1–C10: one
//! orchestrator per configured folder, the shared resource manager and
//! model host, the periodic sync sweep, and the REST facade.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use folder_mcp::config::load_config;
use folder_mcp::db;
use folder_mcp::model_host::ModelHost;
use folder_mcp::orchestrator::FolderOrchestrator;
use folder_mcp::resource_manager::ResourceManager;
use folder_mcp::rest::{router, AppState};
use folder_mcp::store::EmbeddingStore;
use folder_mcp::sync_service::PeriodicSyncService;

/// Local-first folder indexing daemon.
#[derive(Parser, Debug)]
#[command(name = "folder-mcp-daemon")]
struct Cli {
    /// Path to the daemon's TOML configuration file.
    #[arg(long, default_value = "./config/folder-mcp.toml")]
    config: std::path::PathBuf,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let model_host = Arc::new(
        ModelHost::spawn(config.model_host.clone())
            .await
            .context("failed to start embedding model host")?,
    );
    let resource_manager = Arc::new(ResourceManager::new(
        config.resource_manager.max_concurrent_operations,
        config.resource_manager.max_queue_size,
    ));

    let mut orchestrators = HashMap::new();
    for folder in &config.folders {
        let folder_id = uuid::Uuid::new_v4().to_string();
        let pool = db::connect(&folder.path)
            .await
            .with_context(|| format!("failed to open store for {}", folder.path.display()))?;
        let store = Arc::new(EmbeddingStore::new(pool));

        let orchestrator = Arc::new(FolderOrchestrator::new(
            folder_id.clone(),
            folder.path.clone(),
            folder.exclude_patterns.clone(),
            folder.model.clone(),
            folder_mcp::config::model_dimension(&folder.model),
            store,
            resource_manager.clone(),
            model_host.clone(),
            folder.consecutive_error_threshold.unwrap_or(
                folder_mcp::orchestrator::DEFAULT_CONSECUTIVE_ERROR_THRESHOLD,
            ),
            config.task_queue.max_retries,
            config.task_queue.retry_delay_ms,
            config.resource_manager.max_queue_size,
        ));

        orchestrator.start_scanning().await.with_context(|| {
            format!("initial scan failed for folder {}", folder.path.display())
        })?;
        orchestrators.insert(folder_id, orchestrator);
    }
    let orchestrators = Arc::new(orchestrators);

    spawn_task_runners(orchestrators.clone(), config.task_queue.max_concurrent_tasks);

    let sync_service = Arc::new(PeriodicSyncService::new(
        orchestrators.values().cloned().collect(),
        config.periodic_sync.interval_ms,
        config.periodic_sync.vec0_cleanup_enabled,
    ));
    sync_service.start();

    let state = AppState {
        orchestrators,
        model_host,
        version: env!("CARGO_PKG_VERSION"),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(bind = %config.server.bind, "daemon REST facade listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawns `concurrency` background loops per folder that pull tasks off
/// the orchestrator's queue and process them until it drains.
fn spawn_task_runners(
    orchestrators: Arc<HashMap<String, Arc<FolderOrchestrator>>>,
    concurrency: usize,
) {
    for orchestrator in orchestrators.values().cloned() {
        for _ in 0..concurrency.max(1) {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                loop {
                    match orchestrator.get_next_task().await {
                        Some(task) => {
                            if let Err(e) = orchestrator.process_task(&task).await {
                                tracing::warn!(
                                    folder = %orchestrator.folder_id(),
                                    file = %task.file.display(),
                                    error = %e,
                                    "task processing failed"
                                );
                            }
                        }
                        None => tokio::time::sleep(std::time::Duration::from_millis(200)).await,
                    }
                }
            });
        }
    }
}
