use super::*;
use crate::archive::{Archive, ArchiveKey, ArchiveRecord, MemoryArchive};
use crate::camera::{CaptureSource, SyntheticCaptureDevice};
use crate::chunk::FinalizedRecording;
use crate::config::RecorderConfig;
use crate::error::{DeviceError, RecorderError, SessionError, StorageError};
use crate::events::{EventBus, RecorderEvent};
use crate::recording::SessionState;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

fn test_config(root: &TempDir) -> RecorderConfig {
    let mut config = RecorderConfig::default();
    config.recording.timeslice_ms = 20;
    config.archive.path = root.path().join("archive").to_string_lossy().into_owned();
    config.export.directory = root.path().join("downloads").to_string_lossy().into_owned();
    config
}

fn recorder_with(
    config: RecorderConfig,
    device: SyntheticCaptureDevice,
    archive: Arc<dyn Archive>,
) -> (Recorder, broadcast::Receiver<RecorderEvent>) {
    let event_bus = Arc::new(EventBus::new(64));
    let events = event_bus.subscribe();
    let source = CaptureSource::new(config.camera.clone(), Arc::new(device));
    (
        Recorder::new(config, source, archive, event_bus).unwrap(),
        events,
    )
}

fn memory_recorder(root: &TempDir) -> (Recorder, broadcast::Receiver<RecorderEvent>) {
    recorder_with(
        test_config(root),
        SyntheticCaptureDevice::new(),
        Arc::new(MemoryArchive::new()),
    )
}

fn drain(events: &mut broadcast::Receiver<RecorderEvent>) -> Vec<&'static str> {
    let mut types = Vec::new();
    while let Ok(event) = events.try_recv() {
        types.push(event.event_type());
    }
    types
}

/// Archive whose writes always fail
struct FailingArchive;

#[async_trait]
impl Archive for FailingArchive {
    async fn put(&self, _recording: &FinalizedRecording) -> Result<ArchiveKey, StorageError> {
        Err(StorageError::KeyExhausted { attempts: 0 })
    }

    async fn list(&self) -> Result<Vec<ArchiveRecord>, StorageError> {
        Ok(Vec::new())
    }

    async fn get(&self, _key: ArchiveKey) -> Result<Option<ArchiveRecord>, StorageError> {
        Ok(None)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(0)
    }

    async fn delete_all(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_start_stop_persists_recording() {
    let root = TempDir::new().unwrap();
    let (recorder, mut events) = memory_recorder(&root);

    recorder.start_recording().await.unwrap();
    assert!(recorder.is_recording().await);
    tokio::time::sleep(Duration::from_millis(60)).await;

    let saved = recorder.stop_recording().await.unwrap();
    assert!(saved.bytes > 0);
    assert!(!recorder.is_recording().await);

    let record = recorder.get(saved.key).await.unwrap().unwrap();
    assert_eq!(record.size(), saved.bytes);
    assert_eq!(record.mime_type(), "video/webm");

    assert_eq!(
        drain(&mut events),
        vec![
            "stream_acquired",
            "recording_started",
            "recording_stopped",
            "recording_saved"
        ]
    );
}

#[tokio::test]
async fn test_start_while_recording_is_refused() {
    let root = TempDir::new().unwrap();
    let (recorder, _events) = memory_recorder(&root);

    let first = recorder.start_recording().await.unwrap();
    let result = recorder.start_recording().await;
    assert!(matches!(
        result,
        Err(RecorderError::Session(SessionError::AlreadyRecording))
    ));

    let status = recorder.status().await;
    assert_eq!(status.session_id.as_deref(), Some(first.as_str()));
    recorder.stop_recording().await.unwrap();
}

#[tokio::test]
async fn test_stop_while_idle_is_refused() {
    let root = TempDir::new().unwrap();
    let (recorder, _events) = memory_recorder(&root);

    assert!(matches!(
        recorder.stop_recording().await,
        Err(RecorderError::Session(SessionError::NotRecording))
    ));

    recorder.start_recording().await.unwrap();
    recorder.stop_recording().await.unwrap();
    assert!(matches!(
        recorder.stop_recording().await,
        Err(RecorderError::Session(SessionError::NotRecording))
    ));
    assert_eq!(recorder.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_set_profile_while_idle() {
    let root = TempDir::new().unwrap();
    let (recorder, mut events) = memory_recorder(&root);
    assert_eq!(recorder.profile().await.label, "720p");

    let saved = recorder.set_profile("480p").await.unwrap();
    assert!(saved.is_none());
    assert_eq!(recorder.profile().await.label, "480p");
    assert_eq!(drain(&mut events), vec!["profile_changed"]);
    assert!(recorder.list().await.unwrap().is_empty());

    // same profile again is a no-op
    recorder.set_profile("480P").await.unwrap();
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_set_profile_while_recording_saves_and_restarts() {
    let root = TempDir::new().unwrap();
    let (recorder, _events) = memory_recorder(&root);

    let first_session = recorder.start_recording().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let saved = recorder.set_profile("1080p").await.unwrap().unwrap();
    assert!(saved.bytes > 0);

    let status = recorder.status().await;
    assert_eq!(status.state, SessionState::Recording);
    assert_eq!(status.profile.label, "1080p");
    assert_ne!(status.session_id.as_deref(), Some(first_session.as_str()));

    recorder.stop_recording().await.unwrap();
    assert_eq!(recorder.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_restart_reports_saved_key() {
    let root = TempDir::new().unwrap();
    let (recorder, _events) = recorder_with(
        test_config(&root),
        SyntheticCaptureDevice::new().with_resolutions(vec![(1280, 720)]),
        Arc::new(MemoryArchive::new()),
    );

    recorder.start_recording().await.unwrap();
    let result = recorder.set_profile("480p").await;

    let saved = match result {
        Err(RecorderError::RestartFailed { saved, source }) => {
            assert!(matches!(
                *source,
                RecorderError::Device(DeviceError::UnsatisfiableConstraints { .. })
            ));
            saved
        }
        other => panic!("unexpected result {:?}", other),
    };

    let records = recorder.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, saved);
    assert!(!recorder.is_recording().await);
    assert_eq!(recorder.profile().await.label, "480p");
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let root = TempDir::new().unwrap();
    let source = || {
        CaptureSource::new(
            RecorderConfig::default().camera,
            Arc::new(SyntheticCaptureDevice::new()),
        )
    };

    let mut config = test_config(&root);
    config.recording.channel_capacity = 0;
    let result = Recorder::new(
        config,
        source(),
        Arc::new(MemoryArchive::new()),
        Arc::new(EventBus::default()),
    );
    assert!(matches!(result, Err(RecorderError::Config(_))));

    let mut config = test_config(&root);
    config.recording.timeslice_ms = 0;
    let result = Recorder::open(config, Arc::new(EventBus::default())).await;
    assert!(matches!(result, Err(RecorderError::Config(_))));
}

#[tokio::test]
async fn test_inspect_camera_reports_preferred_settings() {
    let root = TempDir::new().unwrap();
    let device = Arc::new(SyntheticCaptureDevice::new().with_resolutions(vec![(640, 480), (1280, 720)]));
    let config = test_config(&root);
    let source = CaptureSource::new(config.camera.clone(), device.clone());
    let recorder = Recorder::new(
        config,
        source,
        Arc::new(MemoryArchive::new()),
        Arc::new(EventBus::default()),
    )
    .unwrap();

    let settings = recorder.inspect_camera().await.unwrap();
    assert_eq!(settings.dimensions(), (640, 480));
    assert_eq!(device.streams_opened(), 1);
    assert!(!recorder.is_recording().await);

    recorder.set_profile("720p").await.unwrap();
    recorder.start_recording().await.unwrap();
    assert!(matches!(
        recorder.inspect_camera().await,
        Err(RecorderError::Session(SessionError::AlreadyRecording))
    ));
    recorder.stop_recording().await.unwrap();
}

#[tokio::test]
async fn test_set_unknown_profile() {
    let root = TempDir::new().unwrap();
    let (recorder, _events) = memory_recorder(&root);

    let result = recorder.set_profile("4k").await;
    assert!(matches!(result, Err(RecorderError::Component { .. })));
    assert_eq!(recorder.profile().await.label, "720p");
}

#[tokio::test]
async fn test_unsupported_resolution_fails_start() {
    let root = TempDir::new().unwrap();
    let (recorder, mut events) = recorder_with(
        test_config(&root),
        SyntheticCaptureDevice::new().with_resolutions(vec![(640, 480)]),
        Arc::new(MemoryArchive::new()),
    );

    let result = recorder.start_recording().await;
    assert!(matches!(
        result,
        Err(RecorderError::Device(
            DeviceError::UnsatisfiableConstraints { .. }
        ))
    ));
    assert!(!recorder.is_recording().await);
    assert_eq!(drain(&mut events), vec!["device_failed"]);

    recorder.set_profile("480p").await.unwrap();
    recorder.start_recording().await.unwrap();
    recorder.stop_recording().await.unwrap();
}

#[tokio::test]
async fn test_permission_denied() {
    let root = TempDir::new().unwrap();
    let (recorder, _events) = recorder_with(
        test_config(&root),
        SyntheticCaptureDevice::new().with_permission(false),
        Arc::new(MemoryArchive::new()),
    );

    assert!(matches!(
        recorder.start_recording().await,
        Err(RecorderError::Device(DeviceError::PermissionDenied))
    ));
}

#[tokio::test]
async fn test_storage_failure_is_reported() {
    let root = TempDir::new().unwrap();
    let (recorder, mut events) = recorder_with(
        test_config(&root),
        SyntheticCaptureDevice::new(),
        Arc::new(FailingArchive),
    );

    recorder.start_recording().await.unwrap();
    let result = recorder.stop_recording().await;
    assert!(matches!(result, Err(RecorderError::Storage(_))));
    assert!(!recorder.is_recording().await);

    let types = drain(&mut events);
    assert_eq!(types.last(), Some(&"storage_failed"));
    assert!(!types.contains(&"recording_saved"));
}

#[tokio::test]
async fn test_export_all_to_configured_directory() {
    let root = TempDir::new().unwrap();
    let (recorder, mut events) = memory_recorder(&root);

    for _ in 0..2 {
        recorder.start_recording().await.unwrap();
        recorder.stop_recording().await.unwrap();
    }
    drain(&mut events);

    let written = recorder.export_all(None).await.unwrap();
    let downloads = root.path().join("downloads");
    assert_eq!(
        written,
        vec![
            downloads.join("downloaded-video-1.webm"),
            downloads.join("downloaded-video-2.webm"),
        ]
    );
    assert_eq!(drain(&mut events), vec!["recordings_exported"]);

    let key = recorder.list().await.unwrap()[0].key;
    let out = root.path().join("one.webm");
    assert_eq!(
        recorder.export_one(key, &out).await.unwrap(),
        Some(out.clone())
    );
    assert!(recorder
        .export_one(ArchiveKey(1), &root.path().join("none.webm"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_clear_then_record_again() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let archive = crate::archive::FileArchive::open(&config.archive)
        .await
        .unwrap();
    let (recorder, mut events) =
        recorder_with(config, SyntheticCaptureDevice::new(), Arc::new(archive));

    recorder.start_recording().await.unwrap();
    recorder.stop_recording().await.unwrap();
    drain(&mut events);

    recorder.clear().await.unwrap();
    assert!(recorder.list().await.unwrap().is_empty());
    assert_eq!(drain(&mut events), vec!["archive_cleared"]);

    recorder.start_recording().await.unwrap();
    let saved = recorder.stop_recording().await.unwrap();
    let records = recorder.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, saved.key);
}

#[tokio::test]
async fn test_record_for_duration() {
    let root = TempDir::new().unwrap();
    let (recorder, _events) = memory_recorder(&root);

    let saved = recorder
        .record_for(Some(Duration::from_millis(80)))
        .await
        .unwrap();
    assert!(saved.bytes > 0);
    assert!(!recorder.is_recording().await);
    assert_eq!(recorder.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_shutdown_saves_in_progress_recording() {
    let root = TempDir::new().unwrap();
    let (recorder, _events) = memory_recorder(&root);

    assert!(recorder.shutdown().await.unwrap().is_none());

    recorder.start_recording().await.unwrap();
    let saved = recorder.shutdown().await.unwrap();
    assert!(saved.is_some());
    assert!(!recorder.is_recording().await);
}

#[tokio::test]
async fn test_keyboard_commands_drive_recorder() {
    let root = TempDir::new().unwrap();
    let (recorder, _events) = memory_recorder(&root);

    recorder
        .handle_command(KeyCommand::ToggleRecording)
        .await
        .unwrap();
    assert!(recorder.is_recording().await);

    let profile = crate::profile::ResolutionProfile::find("360p").unwrap();
    recorder
        .handle_command(KeyCommand::SetProfile(profile))
        .await
        .unwrap();
    assert_eq!(recorder.profile().await, profile);
    assert!(recorder.is_recording().await);

    recorder
        .handle_command(KeyCommand::ToggleRecording)
        .await
        .unwrap();
    assert!(!recorder.is_recording().await);
    assert_eq!(recorder.list().await.unwrap().len(), 2);

    recorder.handle_command(KeyCommand::ExportAll).await.unwrap();
    assert!(root.path().join("downloads/downloaded-video-2.webm").exists());

    recorder.handle_command(KeyCommand::Clear).await.unwrap();
    assert!(recorder.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_open_from_config() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let recorder = Recorder::open(config.clone(), Arc::new(EventBus::default()))
        .await
        .unwrap();

    assert!(config.database_path().join("schema.json").exists());
    recorder.start_recording().await.unwrap();
    recorder.stop_recording().await.unwrap();
    assert_eq!(recorder.archive().count().await.unwrap(), 1);
}
