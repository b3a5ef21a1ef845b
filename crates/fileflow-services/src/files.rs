//! File service facade
//!
//! Every principal-facing operation: uploads, task polling, listing, reads, sharing,
//! visibility and deletion, with access control applied before any store is touched.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use fileflow_core::{
    AppError, FileFilters, FileRecord, Page, PageRequest, Permission, PrincipalId, QueuedUpload,
    TaskStatusView, Visibility,
};
use fileflow_db::FileRecordStore;
use fileflow_storage::{BlobStore, ByteStream};
use fileflow_worker::TaskQueue;

use crate::access::{authorize, membership_change, AccessMode};
use crate::ingest::{IngestOutcome, IngestSettings, IngestionPipeline};

#[derive(Clone)]
pub struct FileService {
    pipeline: IngestionPipeline,
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn FileRecordStore>,
    queue: TaskQueue,
}

impl FileService {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn FileRecordStore>,
        queue: TaskQueue,
        settings: IngestSettings,
    ) -> Self {
        let pipeline = IngestionPipeline::new(
            Arc::clone(&blobs),
            Arc::clone(&records),
            queue.clone(),
            settings,
        );
        Self {
            pipeline,
            blobs,
            records,
            queue,
        }
    }

    /// Pipeline to hand to a worker loop.
    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    pub async fn ingest_small(
        &self,
        principal: PrincipalId,
        original_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<FileRecord, AppError> {
        self.pipeline
            .ingest_small(principal, original_name, mime_type, data)
            .await
    }

    pub async fn ingest_large(
        &self,
        principal: PrincipalId,
        original_name: &str,
        mime_type: &str,
        temp_path: &Path,
        declared_size: u64,
    ) -> Result<QueuedUpload, AppError> {
        self.pipeline
            .ingest_large(principal, original_name, mime_type, temp_path, declared_size)
            .await
    }

    pub async fn ingest(
        &self,
        principal: PrincipalId,
        original_name: &str,
        mime_type: &str,
        temp_path: &Path,
        size: u64,
    ) -> Result<IngestOutcome, AppError> {
        self.pipeline
            .ingest(principal, original_name, mime_type, temp_path, size)
            .await
    }

    /// 0..=100; 0 for unknown or expired tasks.
    pub async fn poll_progress(&self, task_id: Uuid) -> u8 {
        self.queue.get_progress(task_id).await
    }

    pub async fn task_status(&self, task_id: Uuid) -> TaskStatusView {
        TaskStatusView {
            task_id,
            progress: self.queue.get_progress(task_id).await,
            state: self.queue.get_state(task_id).await,
        }
    }

    #[tracing::instrument(skip(self, filters))]
    pub async fn list_accessible(
        &self,
        principal: PrincipalId,
        filters: &FileFilters,
        page: PageRequest,
    ) -> Result<Page<FileRecord>, AppError> {
        filters.validate()?;
        self.records.find_accessible(principal, filters, page).await
    }

    pub async fn get_record(&self, principal: PrincipalId, id: Uuid) -> Result<FileRecord, AppError> {
        let record = self.load(id).await?;
        authorize(principal, &record, AccessMode::Read)?;
        Ok(record)
    }

    #[tracing::instrument(skip(self))]
    pub async fn share_record(
        &self,
        principal: PrincipalId,
        id: Uuid,
        target: PrincipalId,
        permission: Permission,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError> {
        let record = self.load(id).await?;
        authorize(principal, &record, AccessMode::Share)?;
        let change = membership_change(&record, target, permission)?;

        let updated = self
            .records
            .update_membership(id, change, expected_version)
            .await?;

        tracing::info!(
            file_id = %id,
            target = %target,
            permission = %permission,
            version = updated.version,
            "File sharing updated"
        );
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_visibility(
        &self,
        principal: PrincipalId,
        id: Uuid,
        visibility: Visibility,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError> {
        let record = self.load(id).await?;
        authorize(principal, &record, AccessMode::Share)?;
        self.records
            .update_visibility(id, visibility, expected_version)
            .await
    }

    /// Record plus its content as a chunk stream.
    pub async fn read_content(
        &self,
        principal: PrincipalId,
        id: Uuid,
    ) -> Result<(FileRecord, ByteStream), AppError> {
        let record = self.get_record(principal, id).await?;
        let stream = self.blobs.read_stream(&record.blob_path).await?;
        Ok((record, stream))
    }

    /// Delete the metadata, then the blob. A blob that cannot be removed is logged and
    /// left behind; the record is gone either way.
    #[tracing::instrument(skip(self))]
    pub async fn delete_record(
        &self,
        principal: PrincipalId,
        id: Uuid,
        expected_version: Option<i32>,
    ) -> Result<(), AppError> {
        let record = self.load(id).await?;
        authorize(principal, &record, AccessMode::Delete)?;

        let deleted = self.records.delete(id, expected_version).await?;

        if let Err(e) = self.blobs.remove(&deleted.blob_path).await {
            tracing::error!(
                error = %e,
                file_id = %id,
                blob_path = %deleted.blob_path,
                "Failed to delete blob of removed record"
            );
        }

        tracing::info!(file_id = %id, "File deleted");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<FileRecord, AppError> {
        self.records
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))
    }
}
