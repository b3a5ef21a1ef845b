//! Database, queue and service wiring

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use fileflow_core::{Config, QueueBackendKind};
use fileflow_db::PgFileRecordStore;
use fileflow_services::{FileService, IngestSettings};
use fileflow_storage::LocalBlobStore;
use fileflow_worker::{MemoryQueueBackend, PgQueueBackend, QueueBackend, TaskQueue};

/// Everything a command needs.
pub struct AppContext {
    pub config: Config,
    pub pool: PgPool,
    pub queue: TaskQueue,
    pub service: FileService,
}

impl AppContext {
    pub async fn new(config: Config) -> Result<Self> {
        let pool = setup_database(&config).await?;
        let queue = build_queue(&config, &pool).await?;

        let blobs = LocalBlobStore::new(&config.ingest.storage_root)
            .await
            .with_context(|| {
                format!(
                    "Failed to open storage root {}",
                    config.ingest.storage_root.display()
                )
            })?;
        tokio::fs::create_dir_all(&config.ingest.upload_temp_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create upload directory {}",
                    config.ingest.upload_temp_dir.display()
                )
            })?;

        let service = FileService::new(
            Arc::new(blobs),
            Arc::new(PgFileRecordStore::new(pool.clone())),
            queue.clone(),
            IngestSettings::from_config(&config),
        );

        Ok(Self {
            config,
            pool,
            queue,
            service,
        })
    }
}

/// Setup database connection pool and run migrations
pub async fn setup_database(config: &Config) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.base.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.base.db_timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.base.db_max_connections,
        "Database connected successfully"
    );

    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// Task queue over the configured backend.
pub async fn build_queue(config: &Config, pool: &PgPool) -> Result<TaskQueue> {
    let backend: Arc<dyn QueueBackend> = match config.queue.backend {
        QueueBackendKind::Memory => {
            tracing::warn!("Using in-memory task queue; tasks are not shared between processes");
            Arc::new(MemoryQueueBackend::new())
        }
        QueueBackendKind::Postgres => Arc::new(PgQueueBackend::new(pool.clone())),
        QueueBackendKind::Redis => redis_backend(config).await?,
    };

    backend
        .health_check()
        .await
        .context("Task queue health check failed")?;

    tracing::info!(
        backend = backend.backend_name(),
        queue = %config.queue.queue_name,
        "Task queue ready"
    );

    Ok(TaskQueue::new(backend, config.queue.task_retention()))
}

#[cfg(feature = "redis-queue")]
async fn redis_backend(config: &Config) -> Result<Arc<dyn QueueBackend>> {
    let url = config
        .queue
        .redis_url
        .as_deref()
        .context("REDIS_URL must be set when QUEUE_BACKEND=redis")?;
    let backend = fileflow_worker::RedisQueueBackend::new(url).await?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "redis-queue"))]
async fn redis_backend(_config: &Config) -> Result<Arc<dyn QueueBackend>> {
    anyhow::bail!("QUEUE_BACKEND=redis requires building with the `redis-queue` feature")
}
