#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use fileflow_core::{
    AppError, FileFilters, FileRecord, NewFileRecord, Page, PageRequest, PrincipalId, Visibility,
};
use fileflow_db::{FileRecordStore, InMemoryFileRecordStore, MembershipChange};
use fileflow_services::{temp_upload_path, FileService, IngestSettings, IngestionPipeline};
use fileflow_storage::LocalBlobStore;
use fileflow_worker::{
    MemoryQueueBackend, QueueBackend, QueueError, TaskQueue, Tick, WorkerLoop, WorkerLoopConfig,
};

pub const MIB: usize = 1024 * 1024;

/// Service wired to in-memory stores and a temporary blob root.
pub struct TestApp {
    pub service: FileService,
    pub records: InMemoryFileRecordStore,
    pub queue_backend: Arc<MemoryQueueBackend>,
    pub queue: TaskQueue,
    pub settings: IngestSettings,
    pub blob_dir: TempDir,
    pub upload_dir: TempDir,
}

impl TestApp {
    pub fn worker(&self) -> WorkerLoop<IngestionPipeline> {
        WorkerLoop::new(
            self.queue.clone(),
            Arc::new(self.service.pipeline().clone()),
            WorkerLoopConfig {
                queue_name: self.settings.queue_name.clone(),
                poll_interval: Duration::from_millis(10),
                error_backoff: Duration::from_millis(10),
                concurrency: 1,
                purge_interval: Duration::ZERO,
            },
        )
    }

    /// Process queued tasks until the queue is empty.
    pub async fn drain(&self) {
        let worker = self.worker();
        while worker.run_once().await != Tick::Idle {}
    }

    /// Write `size` bytes into a fresh temporary upload file.
    pub async fn temp_upload(&self, size: usize) -> PathBuf {
        write_upload(self.upload_dir.path(), size).await
    }

    pub async fn blob_count(&self) -> usize {
        count_files(self.blob_dir.path()).await
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_with(any_content_type(), None).await
}

/// Default routing with the content-type allow-list switched off.
pub fn any_content_type() -> IngestSettings {
    IngestSettings {
        allowed_content_types: Vec::new(),
        ..IngestSettings::default()
    }
}

/// Build a [`TestApp`]. `records_override` replaces the metadata store handed to the service.
pub async fn setup_with(
    settings: IngestSettings,
    records_override: Option<Arc<dyn FileRecordStore>>,
) -> TestApp {
    setup_with_queue(settings, records_override, None).await
}

pub async fn setup_with_queue(
    settings: IngestSettings,
    records_override: Option<Arc<dyn FileRecordStore>>,
    queue_override: Option<Arc<dyn QueueBackend>>,
) -> TestApp {
    let blob_dir = TempDir::new().unwrap();
    let upload_dir = TempDir::new().unwrap();

    let blobs = Arc::new(LocalBlobStore::new(blob_dir.path()).await.unwrap());
    let records = InMemoryFileRecordStore::new();
    let queue_backend = Arc::new(MemoryQueueBackend::new());
    let backend: Arc<dyn QueueBackend> = match queue_override {
        Some(backend) => backend,
        None => queue_backend.clone(),
    };
    let queue = TaskQueue::new(backend, Duration::from_secs(3600));

    let store: Arc<dyn FileRecordStore> = match records_override {
        Some(store) => store,
        None => Arc::new(records.clone()),
    };
    let service = FileService::new(blobs, store, queue.clone(), settings.clone());

    TestApp {
        service,
        records,
        queue_backend,
        queue,
        settings,
        blob_dir,
        upload_dir,
    }
}

pub async fn write_upload(dir: &Path, size: usize) -> PathBuf {
    let path = temp_upload_path(dir);
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    tokio::fs::write(&path, data).await.unwrap();
    path
}

pub async fn count_files(dir: &Path) -> usize {
    let mut entries = tokio::fs::read_dir(dir).await.unwrap();
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await.unwrap() {
        if entry.file_type().await.unwrap().is_file() {
            count += 1;
        }
    }
    count
}

pub fn principal() -> PrincipalId {
    Uuid::new_v4()
}

pub fn failing_store() -> Arc<dyn FileRecordStore> {
    Arc::new(FailingInsertStore::new(|| {
        AppError::Internal("metadata store unavailable".to_string())
    }))
}

/// Store that refuses every record as invalid.
pub fn rejecting_store() -> Arc<dyn FileRecordStore> {
    Arc::new(FailingInsertStore::new(|| {
        AppError::Validation("record rejected".to_string())
    }))
}

/// Record store whose inserts always fail with the error built by `error`.
pub struct FailingInsertStore {
    inner: InMemoryFileRecordStore,
    error: fn() -> AppError,
}

impl FailingInsertStore {
    pub fn new(error: fn() -> AppError) -> Self {
        Self {
            inner: InMemoryFileRecordStore::new(),
            error,
        }
    }
}

#[async_trait]
impl FileRecordStore for FailingInsertStore {
    async fn insert(&self, _record: NewFileRecord) -> Result<FileRecord, AppError> {
        Err((self.error)())
    }

    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        self.inner.get(id).await
    }

    async fn find_owned(&self, owner: PrincipalId, id: Uuid) -> Result<FileRecord, AppError> {
        self.inner.find_owned(owner, id).await
    }

    async fn find_accessible(
        &self,
        principal: PrincipalId,
        filters: &FileFilters,
        page: PageRequest,
    ) -> Result<Page<FileRecord>, AppError> {
        self.inner.find_accessible(principal, filters, page).await
    }

    async fn update_membership(
        &self,
        id: Uuid,
        change: MembershipChange,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError> {
        self.inner
            .update_membership(id, change, expected_version)
            .await
    }

    async fn update_visibility(
        &self,
        id: Uuid,
        visibility: Visibility,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError> {
        self.inner
            .update_visibility(id, visibility, expected_version)
            .await
    }

    async fn delete(
        &self,
        id: Uuid,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError> {
        self.inner.delete(id, expected_version).await
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Queue backend that remembers every value written under `progress:`.
pub struct RecordingQueueBackend {
    inner: MemoryQueueBackend,
    progress_writes: Mutex<Vec<(String, String)>>,
}

impl RecordingQueueBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryQueueBackend::new(),
            progress_writes: Mutex::new(Vec::new()),
        }
    }

    pub fn progress_history(&self, task_id: Uuid) -> Vec<u8> {
        let key = format!("progress:{task_id}");
        self.progress_writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.parse().unwrap())
            .collect()
    }
}

#[async_trait]
impl QueueBackend for RecordingQueueBackend {
    async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError> {
        self.inner.push(queue, payload).await
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>, QueueError> {
        self.inner.pop(queue).await
    }

    async fn set_value(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), QueueError> {
        if key.starts_with("progress:") {
            self.progress_writes
                .lock()
                .unwrap()
                .push((key.to_string(), value.clone()));
        }
        self.inner.set_value(key, value, ttl).await
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, QueueError> {
        self.inner.get_value(key).await
    }

    async fn len(&self, queue: &str) -> Result<u64, QueueError> {
        self.inner.len(queue).await
    }

    async fn purge_expired(&self) -> Result<u64, QueueError> {
        self.inner.purge_expired().await
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}
