//! Upload ingestion pipeline
//!
//! Uploads at or below the large-file threshold are written inline: blob, then
//! metadata. Larger uploads are described by an [`UploadTaskPayload`] and queued; a
//! worker later runs the same steps while reporting progress 10/30/60/90/100.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use fileflow_core::constants::{progress, DEFAULT_QUEUE_NAME};
use fileflow_core::validation::{
    validate_content_type_allowed, validate_mime_type, validate_original_name,
    validate_upload_size,
};
use fileflow_core::{
    AppError, Config, FileRecord, IngestConfig, NewFileRecord, PrincipalId, QueuedUpload,
    TaskError, TaskState, TaskStatus, UploadTaskPayload,
};
use fileflow_db::FileRecordStore;
use fileflow_storage::{BlobHandle, BlobStore};
use fileflow_worker::{TaskHandler, TaskOutcome, TaskQueue};

/// Routing and validation parameters for uploads.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub large_file_threshold_bytes: u64,
    pub max_upload_bytes: u64,
    /// Empty accepts every content type.
    pub allowed_content_types: Vec<String>,
    pub queue_name: String,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self::from_parts(&config.ingest, &config.queue.queue_name)
    }

    pub fn from_parts(ingest: &IngestConfig, queue_name: &str) -> Self {
        Self {
            large_file_threshold_bytes: ingest.large_file_threshold_bytes,
            max_upload_bytes: ingest.max_upload_bytes,
            allowed_content_types: ingest.allowed_content_types.clone(),
            queue_name: queue_name.to_string(),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from_parts(&IngestConfig::default(), DEFAULT_QUEUE_NAME)
    }
}

/// Result of a size-routed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Stored(FileRecord),
    Queued(QueuedUpload),
}

#[derive(Clone)]
pub struct IngestionPipeline {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn FileRecordStore>,
    queue: TaskQueue,
    settings: IngestSettings,
}

impl IngestionPipeline {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn FileRecordStore>,
        queue: TaskQueue,
        settings: IngestSettings,
    ) -> Self {
        Self {
            blobs,
            records,
            queue,
            settings,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Whether an upload of `size` bytes goes through the task queue.
    pub fn is_large(&self, size: u64) -> bool {
        size > self.settings.large_file_threshold_bytes
    }

    /// Checks applied to every upload before any byte is written.
    pub fn validate_upload(
        &self,
        principal: PrincipalId,
        original_name: &str,
        mime_type: &str,
        size: u64,
    ) -> Result<(), AppError> {
        if principal.is_nil() {
            return Err(AppError::Validation("principal is required".to_string()));
        }
        validate_original_name(original_name)?;
        validate_mime_type(mime_type)?;
        validate_upload_size(size, self.settings.max_upload_bytes)?;
        validate_content_type_allowed(mime_type, &self.settings.allowed_content_types)?;
        Ok(())
    }

    /// Write a small upload inline and return its record.
    #[tracing::instrument(skip(self, data), fields(size = data.len()))]
    pub async fn ingest_small(
        &self,
        principal: PrincipalId,
        original_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<FileRecord, AppError> {
        self.validate_upload(principal, original_name, mime_type, data.len() as u64)?;

        let handle = self.blobs.put(original_name, data).await.map_err(|e| {
            tracing::error!(error = %e, original_name = %original_name, "Failed to write blob");
            AppError::UploadFailed(format!("Failed to store file: {}", e))
        })?;

        let record = self
            .persist_record(Uuid::new_v4(), principal, original_name, mime_type, &handle)
            .await?;

        tracing::info!(
            file_id = %record.id,
            stored_name = %record.stored_name,
            size_bytes = record.size_bytes,
            "File stored"
        );

        Ok(record)
    }

    /// Queue a large upload whose bytes sit at `temp_path`.
    #[tracing::instrument(skip(self))]
    pub async fn ingest_large(
        &self,
        principal: PrincipalId,
        original_name: &str,
        mime_type: &str,
        temp_path: &Path,
        declared_size: u64,
    ) -> Result<QueuedUpload, AppError> {
        self.validate_upload(principal, original_name, mime_type, declared_size)?;

        let payload = UploadTaskPayload {
            task_id: Uuid::new_v4(),
            temp_path: temp_path.to_path_buf(),
            owner_id: principal,
            original_name: original_name.to_string(),
            mime_type: mime_type.to_string(),
            declared_size,
        };
        payload.validate()?;
        let task_id = payload.task_id;

        // Recorded before the push so a fast worker's Running cannot be overwritten.
        self.queue.set_state(task_id, &TaskState::Queued).await;

        if !self.queue.enqueue(&self.settings.queue_name, &payload).await {
            self.queue
                .set_state(
                    task_id,
                    &TaskState::Failed {
                        error: "queue unavailable".to_string(),
                    },
                )
                .await;
            return Err(AppError::QueueUnavailable(
                "Upload could not be queued, try again later".to_string(),
            ));
        }

        tracing::info!(
            task_id = %task_id,
            original_name = %original_name,
            declared_size,
            "Large upload queued"
        );

        Ok(QueuedUpload {
            task_id,
            status: TaskStatus::Queued,
        })
    }

    /// Route an upload held in a temporary file by its size.
    ///
    /// The small branch reads the file, stores it and removes the temporary file. The
    /// large branch leaves the file for the worker.
    pub async fn ingest(
        &self,
        principal: PrincipalId,
        original_name: &str,
        mime_type: &str,
        temp_path: &Path,
        size: u64,
    ) -> Result<IngestOutcome, AppError> {
        if self.is_large(size) {
            return self
                .ingest_large(principal, original_name, mime_type, temp_path, size)
                .await
                .map(IngestOutcome::Queued);
        }

        self.validate_upload(principal, original_name, mime_type, size)?;
        let data = tokio::fs::read(temp_path)
            .await
            .map_err(|e| source_error(temp_path, e))?;
        let record = self
            .ingest_small(principal, original_name, mime_type, Bytes::from(data))
            .await?;
        remove_temp_source(temp_path).await;
        Ok(IngestOutcome::Stored(record))
    }

    /// Run the queued branch for one task and record its terminal state.
    ///
    /// Task failures are returned as a `Failed` outcome. `Err` is either a payload that
    /// fails validation (rejected, state `Failed`) or a terminal state that could not
    /// be written to the queue store (transient).
    pub async fn process_task(&self, payload: UploadTaskPayload) -> Result<TaskOutcome, TaskError> {
        let task_id = payload.task_id;
        if let Err(e) = payload.validate() {
            tracing::error!(task_id = %task_id, error = %e, "Rejected invalid task payload");
            self.queue
                .set_state(
                    task_id,
                    &TaskState::Failed {
                        error: e.to_string(),
                    },
                )
                .await;
            return Err(TaskError::rejected(task_id, e.to_string()));
        }

        tracing::info!(
            task_id = %task_id,
            original_name = %payload.original_name,
            declared_size = payload.declared_size,
            "processing file"
        );

        self.queue.set_state(task_id, &TaskState::Running).await;
        self.queue.set_progress(task_id, progress::STARTED).await;

        let state = match self.run_queued_branch(&payload).await {
            Ok(record) => {
                self.queue.set_progress(task_id, progress::DONE).await;
                tracing::info!(task_id = %task_id, file_id = %record.id, "Queued upload completed");
                TaskState::Completed {
                    record_id: record.id,
                }
            }
            Err(e) => {
                tracing::error!(
                    task_id = %task_id,
                    error = %e,
                    temp_path = %payload.temp_path.display(),
                    "Queued upload failed"
                );
                TaskState::Failed {
                    error: e.to_string(),
                }
            }
        };

        if !self.queue.set_state(task_id, &state).await {
            return Err(TaskError::transient(
                task_id,
                "final state could not be written to the queue store",
            ));
        }

        Ok(TaskOutcome { task_id, state })
    }

    async fn run_queued_branch(&self, payload: &UploadTaskPayload) -> Result<FileRecord, AppError> {
        let task_id = payload.task_id;
        validate_content_type_allowed(&payload.mime_type, &self.settings.allowed_content_types)?;

        let file = tokio::fs::File::open(&payload.temp_path)
            .await
            .map_err(|e| source_error(&payload.temp_path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| source_error(&payload.temp_path, e))?;
        validate_upload_size(metadata.len(), self.settings.max_upload_bytes)?;
        self.queue.set_progress(task_id, progress::SOURCE_READ).await;

        let handle = self
            .blobs
            .put_stream(&payload.original_name, Box::pin(file))
            .await?;
        self.queue.set_progress(task_id, progress::BLOB_WRITTEN).await;

        let record = self
            .persist_record(
                task_id,
                payload.owner_id,
                &payload.original_name,
                &payload.mime_type,
                &handle,
            )
            .await?;
        self.queue
            .set_progress(task_id, progress::METADATA_PERSISTED)
            .await;

        remove_temp_source(&payload.temp_path).await;
        Ok(record)
    }

    /// Insert the record for a written blob. On failure the blob is removed again and
    /// the error is reported as `UploadFailed`, whatever the store returned.
    async fn persist_record(
        &self,
        id: Uuid,
        owner: PrincipalId,
        original_name: &str,
        mime_type: &str,
        handle: &BlobHandle,
    ) -> Result<FileRecord, AppError> {
        let inserted = match i64::try_from(handle.size_bytes) {
            Ok(size_bytes) => {
                self.records
                    .insert(NewFileRecord {
                        id,
                        stored_name: handle.stored_name.clone(),
                        original_name: original_name.to_string(),
                        blob_path: handle.blob_path.clone(),
                        size_bytes,
                        mime_type: mime_type.to_string(),
                        owner_id: owner,
                    })
                    .await
            }
            Err(_) => Err(AppError::PayloadTooLarge(
                "File size out of range".to_string(),
            )),
        };

        match inserted {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    blob_path = %handle.blob_path,
                    "Metadata insert failed, removing orphaned blob"
                );
                if let Err(remove_err) = self.blobs.remove(&handle.blob_path).await {
                    tracing::error!(
                        error = %remove_err,
                        blob_path = %handle.blob_path,
                        "Failed to remove orphaned blob"
                    );
                }
                Err(AppError::UploadFailed(format!(
                    "Failed to save file metadata: {}",
                    e
                )))
            }
        }
    }
}

#[async_trait]
impl TaskHandler for IngestionPipeline {
    type Payload = UploadTaskPayload;

    async fn handle(&self, payload: UploadTaskPayload) -> Result<TaskOutcome, TaskError> {
        self.process_task(payload).await
    }
}

fn source_error(path: &Path, err: std::io::Error) -> AppError {
    if err.kind() == std::io::ErrorKind::NotFound {
        AppError::NotFound(format!("Temporary source {} not found", path.display()))
    } else {
        AppError::Storage(format!(
            "Failed to read temporary source {}: {}",
            path.display(),
            err
        ))
    }
}

async fn remove_temp_source(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(error = %e, temp_path = %path.display(), "Failed to remove temporary source");
    }
}

/// Temporary path for an incoming upload under `dir`.
pub fn temp_upload_path(dir: &Path) -> PathBuf {
    dir.join(format!("upload-{}", Uuid::new_v4()))
}
