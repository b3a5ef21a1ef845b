//! Fileflow CLI: run the upload worker and operate on stored files.
//!
//! Configuration is read from the environment (and `.env`). Results are printed as
//! JSON on stdout; logs and error reports go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use fileflow_cli::{init_tracing, print_json, report_error, AppContext};
use fileflow_core::constants::DEFAULT_MIME_TYPE;
use fileflow_core::{
    Config, FileFilters, PageRequest, Permission, SortField, SortOrder, Visibility,
};
use fileflow_services::temp_upload_path;
use fileflow_worker::{WorkerLoop, WorkerLoopConfig};

#[derive(Parser, Debug)]
#[command(name = "fileflow", about = "File ingestion, sharing and background processing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the background worker until interrupted
    Worker {
        /// Number of concurrent polling loops (defaults to WORKER_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Upload a file; large files are queued for the worker
    Ingest {
        /// Path to the file to upload
        file: PathBuf,
        /// Owning principal UUID
        #[arg(long)]
        owner: Uuid,
        /// Original name to record (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        /// Content type
        #[arg(long, default_value = DEFAULT_MIME_TYPE)]
        mime: String,
    },
    /// Show progress and state of a queued upload
    Progress {
        /// Task UUID returned by `ingest`
        task_id: Uuid,
    },
    /// List files visible to a principal
    List {
        #[arg(long)]
        principal: Uuid,
        /// Case-insensitive name substring
        #[arg(long)]
        name: Option<String>,
        /// Exact content type
        #[arg(long)]
        mime: Option<String>,
        /// created_at, updated_at, original_name, size_bytes or mime_type
        #[arg(long, default_value = "created_at")]
        sort_by: SortField,
        /// asc or desc
        #[arg(long, default_value = "desc")]
        order: SortOrder,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "10")]
        page_size: u32,
    },
    /// Show a single file record
    Get {
        #[arg(long)]
        principal: Uuid,
        id: Uuid,
    },
    /// Write a file's content to disk
    Download {
        #[arg(long)]
        principal: Uuid,
        id: Uuid,
        /// Destination path (defaults to the original name in the current directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Grant or revoke a principal's access (permission: read, write or none)
    Share {
        #[arg(long)]
        principal: Uuid,
        id: Uuid,
        #[arg(long)]
        target: Uuid,
        #[arg(long, default_value = "read")]
        permission: Permission,
        #[arg(long)]
        expected_version: Option<i32>,
    },
    /// Make a file public or private
    Visibility {
        #[arg(long)]
        principal: Uuid,
        id: Uuid,
        visibility: Visibility,
        #[arg(long)]
        expected_version: Option<i32>,
    },
    /// Delete a file and its content
    Delete {
        #[arg(long)]
        principal: Uuid,
        id: Uuid,
        #[arg(long)]
        expected_version: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => return report_error(&e.context("Failed to load configuration"), true),
    };
    init_tracing(&config.base.log_format);
    let show_details = !config.is_production();

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e, show_details),
    }
}

async fn run(command: Commands, config: Config) -> anyhow::Result<()> {
    config.validate()?;
    let app = AppContext::new(config).await?;

    match command {
        Commands::Worker { concurrency } => run_worker(&app, concurrency).await?,
        Commands::Ingest {
            file,
            owner,
            name,
            mime,
        } => {
            let original_name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("Cannot derive a name from the file path, pass --name")?,
            };
            let temp = temp_upload_path(&app.config.ingest.upload_temp_dir);
            let size = tokio::fs::copy(&file, &temp)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            match app
                .service
                .ingest(owner, &original_name, &mime, &temp, size)
                .await
            {
                Ok(outcome) => print_json(&outcome)?,
                Err(e) => {
                    remove_quietly(&temp).await;
                    return Err(e.into());
                }
            }
        }
        Commands::Progress { task_id } => {
            print_json(&app.service.task_status(task_id).await)?;
        }
        Commands::List {
            principal,
            name,
            mime,
            sort_by,
            order,
            page,
            page_size,
        } => {
            let filters = FileFilters {
                name_contains: name,
                mime_type: mime,
                sort_by,
                sort_order: order,
                ..FileFilters::default()
            };
            let page = PageRequest::new(page, page_size)?;
            let response = app
                .service
                .list_accessible(principal, &filters, page)
                .await?;
            print_json(&response)?;
        }
        Commands::Get { principal, id } => {
            print_json(&app.service.get_record(principal, id).await?)?;
        }
        Commands::Download {
            principal,
            id,
            output,
        } => {
            let (record, stream) = app.service.read_content(principal, id).await?;
            let output = match output {
                Some(path) => path,
                None => Path::new(&record.original_name)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(&record.stored_name)),
            };
            let written = write_stream(&output, stream).await?;
            print_json(&serde_json::json!({
                "id": record.id,
                "path": output,
                "size_bytes": written,
            }))?;
        }
        Commands::Share {
            principal,
            id,
            target,
            permission,
            expected_version,
        } => {
            let response = app
                .service
                .share_record(principal, id, target, permission, expected_version)
                .await?;
            print_json(&response)?;
        }
        Commands::Visibility {
            principal,
            id,
            visibility,
            expected_version,
        } => {
            let response = app
                .service
                .set_visibility(principal, id, visibility, expected_version)
                .await?;
            print_json(&response)?;
        }
        Commands::Delete {
            principal,
            id,
            expected_version,
        } => {
            app.service
                .delete_record(principal, id, expected_version)
                .await?;
            print_json(
                &serde_json::json!({ "success": true, "message": format!("File {} deleted", id) }),
            )?;
        }
    }

    Ok(())
}

async fn run_worker(app: &AppContext, concurrency: Option<usize>) -> anyhow::Result<()> {
    let mut loop_config = WorkerLoopConfig::from_config(&app.config.queue, &app.config.worker);
    if let Some(concurrency) = concurrency {
        loop_config.concurrency = concurrency.max(1);
    }

    let worker = WorkerLoop::new(
        app.queue.clone(),
        Arc::new(app.service.pipeline().clone()),
        loop_config,
    );
    let handle = worker.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received, stopping worker");
    handle.shutdown().await;
    app.pool.close().await;

    Ok(())
}

async fn write_stream(path: &Path, stream: fileflow_storage::ByteStream) -> anyhow::Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut stream = stream;
    let mut written = 0u64;
    while let Some(chunk) = stream.try_next().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(error = %e, path = %path.display(), "Temporary upload already gone");
    }
}
