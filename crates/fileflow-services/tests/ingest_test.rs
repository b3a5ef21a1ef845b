mod helpers;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use uuid::Uuid;

use fileflow_core::{AppError, ErrorMetadata, TaskState, TaskStatus, UploadTaskPayload};
use fileflow_services::{IngestOutcome, IngestSettings};
use fileflow_worker::{QueueBackend, Tick};

use helpers::{
    failing_store, principal, rejecting_store, setup_test_app, setup_with, setup_with_queue,
    RecordingQueueBackend, MIB,
};

fn small_settings() -> IngestSettings {
    IngestSettings {
        large_file_threshold_bytes: 1024,
        max_upload_bytes: 4096,
        allowed_content_types: Vec::new(),
        ..IngestSettings::default()
    }
}

#[tokio::test]
async fn test_small_upload_round_trip() {
    let app = setup_test_app().await;
    let owner = principal();

    let record = app
        .service
        .ingest_small(owner, "hello.txt", "text/plain", Bytes::from_static(b"hello"))
        .await
        .unwrap();

    assert_eq!(record.owner_id, owner);
    assert_eq!(record.original_name, "hello.txt");
    assert_eq!(record.size_bytes, 5);
    assert_eq!(record.version, 1);
    assert!(record.shared_with.is_empty());
    assert_ne!(record.stored_name, record.original_name);
    assert!(record.stored_name.ends_with(".txt"));

    let fetched = app.service.get_record(owner, record.id).await.unwrap();
    assert_eq!(fetched, record);

    let (_, stream) = app.service.read_content(owner, record.id).await.unwrap();
    let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
    assert_eq!(chunks.concat(), b"hello".to_vec());
    assert_eq!(app.blob_count().await, 1);
}

#[tokio::test]
async fn test_threshold_routing() {
    let app = setup_with(small_settings(), None).await;
    let owner = principal();

    let at_threshold = app.temp_upload(1024).await;
    let outcome = app
        .service
        .ingest(owner, "edge.bin", "application/octet-stream", &at_threshold, 1024)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Stored(ref r) if r.size_bytes == 1024));
    assert!(!at_threshold.exists());

    let above = app.temp_upload(1025).await;
    let outcome = app
        .service
        .ingest(owner, "big.bin", "application/octet-stream", &above, 1025)
        .await
        .unwrap();
    match outcome {
        IngestOutcome::Queued(queued) => assert_eq!(queued.status, TaskStatus::Queued),
        other => panic!("expected queued upload, got {:?}", other),
    }
    assert!(above.exists());
}

#[tokio::test]
async fn test_zero_byte_upload_takes_small_path() {
    let app = setup_with(small_settings(), None).await;
    let owner = principal();
    let empty = app.temp_upload(0).await;

    let outcome = app
        .service
        .ingest(owner, "empty.txt", "text/plain", &empty, 0)
        .await
        .unwrap();

    match outcome {
        IngestOutcome::Stored(record) => assert_eq!(record.size_bytes, 0),
        other => panic!("expected stored record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_large_upload_completes_through_worker() {
    let app = setup_test_app().await;
    let owner = principal();
    let temp = app.temp_upload(6 * MIB).await;

    let queued = app
        .service
        .ingest_large(owner, "video.mp4", "video/mp4", &temp, (6 * MIB) as u64)
        .await
        .unwrap();
    assert_eq!(queued.status, TaskStatus::Queued);
    assert_eq!(app.service.poll_progress(queued.task_id).await, 0);
    assert_eq!(
        app.service.task_status(queued.task_id).await.state,
        Some(TaskState::Queued)
    );

    app.drain().await;

    assert_eq!(app.service.poll_progress(queued.task_id).await, 100);
    let status = app.service.task_status(queued.task_id).await;
    assert_eq!(
        status.state,
        Some(TaskState::Completed {
            record_id: queued.task_id
        })
    );

    let record = app.service.get_record(owner, queued.task_id).await.unwrap();
    assert_eq!(record.size_bytes, (6 * MIB) as i64);
    assert_eq!(record.mime_type, "video/mp4");
    assert!(!temp.exists());
    assert_eq!(app.blob_count().await, 1);
}

#[tokio::test]
async fn test_progress_checkpoints_are_monotonic() {
    let recorder = Arc::new(RecordingQueueBackend::new());
    let app = setup_with_queue(
        small_settings(),
        None,
        Some(recorder.clone() as Arc<dyn QueueBackend>),
    )
    .await;
    let temp = app.temp_upload(2048).await;

    let queued = app
        .service
        .ingest_large(principal(), "data.bin", "application/octet-stream", &temp, 2048)
        .await
        .unwrap();
    app.drain().await;

    assert_eq!(
        recorder.progress_history(queued.task_id),
        vec![10, 30, 60, 90, 100]
    );
}

#[tokio::test]
async fn test_vanished_source_fails_task() {
    let app = setup_with(small_settings(), None).await;
    let owner = principal();
    let missing = app.upload_dir.path().join("never-written");

    let queued = app
        .service
        .ingest_large(owner, "gone.bin", "application/octet-stream", &missing, 2048)
        .await
        .unwrap();
    app.drain().await;

    let status = app.service.task_status(queued.task_id).await;
    match status.state {
        Some(TaskState::Failed { error }) => assert!(error.contains("not found"), "{error}"),
        other => panic!("expected failed task, got {:?}", other),
    }
    assert_eq!(status.progress, 10);
    assert!(matches!(
        app.service.get_record(owner, queued.task_id).await,
        Err(AppError::NotFound(_))
    ));
    assert_eq!(app.blob_count().await, 0);
}

#[tokio::test]
async fn test_small_path_metadata_failure_removes_blob() {
    let app = setup_with(small_settings(), Some(failing_store())).await;

    let err = app
        .service
        .ingest_small(principal(), "a.txt", "text/plain", Bytes::from_static(b"abc"))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "UPLOAD_FAILED");
    assert!(err.is_recoverable());
    assert_eq!(app.blob_count().await, 0);
}

#[tokio::test]
async fn test_rejected_metadata_after_blob_write_is_upload_failed() {
    let app = setup_with(small_settings(), Some(rejecting_store())).await;

    let err = app
        .service
        .ingest_small(principal(), "a.txt", "text/plain", Bytes::from_static(b"abc"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::UploadFailed(_)), "{err:?}");
    assert_eq!(app.blob_count().await, 0);

    let temp = app.temp_upload(2048).await;
    let queued = app
        .service
        .ingest_large(principal(), "b.bin", "application/octet-stream", &temp, 2048)
        .await
        .unwrap();
    app.drain().await;

    match app.service.task_status(queued.task_id).await.state {
        Some(TaskState::Failed { error }) => {
            assert!(error.contains("Failed to save file metadata"), "{error}")
        }
        other => panic!("expected failed task, got {:?}", other),
    }
    assert_eq!(app.blob_count().await, 0);
}

#[tokio::test]
async fn test_queued_metadata_failure_keeps_source_and_drops_blob() {
    let app = setup_with(small_settings(), Some(failing_store())).await;
    let temp = app.temp_upload(2048).await;

    let queued = app
        .service
        .ingest_large(principal(), "b.bin", "application/octet-stream", &temp, 2048)
        .await
        .unwrap();
    app.drain().await;

    let status = app.service.task_status(queued.task_id).await;
    assert!(matches!(status.state, Some(TaskState::Failed { .. })));
    assert_eq!(status.progress, 60);
    assert!(temp.exists());
    assert_eq!(app.blob_count().await, 0);
}

#[tokio::test]
async fn test_size_cap_and_allow_list() {
    let settings = IngestSettings {
        allowed_content_types: vec!["image/png".to_string()],
        ..small_settings()
    };
    let app = setup_with(settings, None).await;
    let owner = principal();

    let err = app
        .service
        .ingest(owner, "huge.png", "image/png", &app.temp_upload(8).await, 4097)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PayloadTooLarge(_)));

    let err = app
        .service
        .ingest_small(owner, "notes.txt", "text/plain", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert!(app
        .service
        .ingest_small(owner, "pic.png", "IMAGE/PNG", Bytes::from_static(b"png"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_default_allow_list() {
    let app = setup_with(IngestSettings::default(), None).await;
    let owner = principal();

    for mime in ["image/jpeg", "image/png", "application/pdf", "text/plain"] {
        assert!(app
            .service
            .ingest_small(owner, "ok.bin", mime, Bytes::from_static(b"ok"))
            .await
            .is_ok());
    }
    assert!(matches!(
        app.service
            .ingest_small(owner, "a.zip", "application/zip", Bytes::from_static(b"zip"))
            .await,
        Err(AppError::Validation(_))
    ));
    assert_eq!(app.blob_count().await, 4);
}

#[tokio::test]
async fn test_invalid_uploads_rejected_before_write() {
    let app = setup_test_app().await;

    assert!(matches!(
        app.service
            .ingest_small(Uuid::nil(), "a.txt", "text/plain", Bytes::from_static(b"a"))
            .await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        app.service
            .ingest_small(principal(), "", "text/plain", Bytes::from_static(b"a"))
            .await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        app.service
            .ingest_small(principal(), "a.txt", "", Bytes::from_static(b"a"))
            .await,
        Err(AppError::Validation(_))
    ));
    assert_eq!(app.blob_count().await, 0);
}

#[tokio::test]
async fn test_enqueue_failure_is_queue_unavailable() {
    let app = setup_with(small_settings(), None).await;
    let temp = app.temp_upload(2048).await;
    app.queue_backend.set_unavailable(true);

    let err = app
        .service
        .ingest_large(principal(), "c.bin", "application/octet-stream", &temp, 2048)
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "QUEUE_UNAVAILABLE");
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_invalid_payload_is_rejected_without_backoff() {
    let app = setup_with(small_settings(), None).await;
    let payload = UploadTaskPayload {
        task_id: Uuid::new_v4(),
        temp_path: app.temp_upload(16).await,
        owner_id: principal(),
        original_name: String::new(),
        mime_type: "text/plain".to_string(),
        declared_size: 16,
    };
    assert!(app.queue.enqueue(&app.settings.queue_name, &payload).await);

    assert_eq!(app.worker().run_once().await, Tick::Processed);

    let status = app.service.task_status(payload.task_id).await;
    assert!(matches!(status.state, Some(TaskState::Failed { .. })));
    assert_eq!(status.progress, 0);
    assert_eq!(app.blob_count().await, 0);
}

#[tokio::test]
async fn test_worker_loop_reports_completion() {
    let app = setup_with(small_settings(), None).await;
    let owner = principal();
    let worker = app.worker();
    let mut events = worker.subscribe();
    let handle = worker.start();

    let temp = app.temp_upload(3000).await;
    let queued = app
        .service
        .ingest_large(owner, "d.bin", "application/octet-stream", &temp, 3000)
        .await
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("worker did not finish the task")
        .unwrap();
    assert_eq!(outcome.task_id, queued.task_id);
    assert!(matches!(outcome.state, TaskState::Completed { .. }));

    handle.shutdown().await;
    assert_eq!(app.service.poll_progress(queued.task_id).await, 100);
}
