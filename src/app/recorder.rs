use super::types::{RecorderStatus, SavedRecording};
use crate::archive::{Archive, FileArchive};
use crate::camera::{device_for_backend, CaptureSource, CaptureSourceBuilder, StreamSettings};
use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result, SessionError};
use crate::events::{EventBus, RecorderEvent};
use crate::profile::ResolutionProfile;
use crate::recording::{RecordingSession, SessionOptions, SessionState};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Wires a capture source, recording sessions and an archive together
pub struct Recorder {
    pub(super) config: RecorderConfig,
    pub(super) source: CaptureSource,
    pub(super) archive: Arc<dyn Archive>,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) inner: Mutex<RecorderInner>,
}

pub(super) struct RecorderInner {
    pub(super) profile: ResolutionProfile,
    pub(super) audio: bool,
    pub(super) session: Option<RecordingSession>,
}

impl RecorderInner {
    fn is_recording(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.state().is_recording())
            .unwrap_or(false)
    }
}

impl Recorder {
    /// Fails with `RecorderError::Config` when `config` does not validate
    pub fn new(
        config: RecorderConfig,
        source: CaptureSource,
        archive: Arc<dyn Archive>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        config.validate()?;

        let inner = RecorderInner {
            profile: config.profile(),
            audio: config.camera.audio,
            session: None,
        };

        Ok(Self {
            config,
            source,
            archive,
            event_bus,
            inner: Mutex::new(inner),
        })
    }

    /// Build the configured capture backend and open the file archive
    pub async fn open(config: RecorderConfig, event_bus: Arc<EventBus>) -> Result<Self> {
        config.validate()?;

        let device = device_for_backend(config.camera.backend)?;
        let source = CaptureSourceBuilder::new()
            .config(config.camera.clone())
            .device(device)
            .build()?;

        let archive = FileArchive::open(&config.archive).await.map_err(|e| {
            error!("Failed to open archive: {}", e);
            e
        })?;

        Self::new(config, source, Arc::new(archive), event_bus)
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn archive(&self) -> Arc<dyn Archive> {
        Arc::clone(&self.archive)
    }

    /// Acquire a stream at the current profile and start a new session.
    /// Returns the session id.
    pub async fn start_recording(&self) -> Result<String> {
        let mut inner = self.inner.lock().await;
        self.begin_locked(&mut inner).await
    }

    /// Stop the current session and persist its recording
    pub async fn stop_recording(&self) -> Result<SavedRecording> {
        let mut inner = self.inner.lock().await;
        self.finish_locked(&mut inner).await
    }

    /// Switch resolution profile.
    ///
    /// While recording this stops and persists the current session, then
    /// starts a new one at the new profile; the saved part is returned. If the
    /// restart fails the error is `RestartFailed`, carrying the saved key.
    pub async fn set_profile(&self, label: &str) -> Result<Option<SavedRecording>> {
        let profile = ResolutionProfile::find(label).ok_or_else(|| {
            RecorderError::component("recorder", format!("Unknown resolution profile '{}'", label))
        })?;

        let mut inner = self.inner.lock().await;
        let previous = inner.profile;
        if previous == profile && !inner.is_recording() {
            return Ok(None);
        }

        let saved = if inner.is_recording() {
            info!("Changing resolution to {} while recording", profile);
            Some(self.finish_locked(&mut inner).await?)
        } else {
            None
        };

        inner.profile = profile;
        self.event_bus.emit(RecorderEvent::ProfileChanged {
            from: previous.label.to_string(),
            to: profile.label.to_string(),
        });

        if let Some(saved) = saved {
            info!("Partial recording saved as {}, restarting at {}", saved.key, profile);
            if let Err(e) = self.begin_locked(&mut inner).await {
                error!(
                    "Restart at {} failed after saving recording {}: {}",
                    profile, saved.key, e
                );
                return Err(RecorderError::RestartFailed {
                    saved: saved.key,
                    source: Box::new(e),
                });
            }
        }

        Ok(saved)
    }

    /// Open a stream at the device's preferred settings, report them and
    /// release it. Refused while recording.
    pub async fn inspect_camera(&self) -> Result<StreamSettings> {
        let inner = self.inner.lock().await;
        if inner.is_recording() {
            return Err(SessionError::AlreadyRecording.into());
        }

        let stream = self.source.acquire_any(inner.audio).await.map_err(|e| {
            self.event_bus.emit(RecorderEvent::DeviceFailed {
                error: e.to_string(),
            });
            e
        })?;
        let settings = stream.settings();
        stream.release().await;

        info!(
            "Camera {} ({}) delivers {} at {} fps",
            self.source.config().index,
            self.source.device_name(),
            settings,
            settings.fps
        );
        Ok(settings)
    }

    /// Enable or disable audio for sessions started from now on
    pub async fn set_audio(&self, audio: bool) {
        self.inner.lock().await.audio = audio;
    }

    pub async fn profile(&self) -> ResolutionProfile {
        self.inner.lock().await.profile
    }

    pub async fn is_recording(&self) -> bool {
        self.inner.lock().await.is_recording()
    }

    pub async fn status(&self) -> RecorderStatus {
        let inner = self.inner.lock().await;
        RecorderStatus {
            state: inner
                .session
                .as_ref()
                .map(RecordingSession::state)
                .unwrap_or(SessionState::Idle),
            profile: inner.profile,
            audio: inner.audio,
            session_id: inner.session.as_ref().map(|s| s.id().to_string()),
            session: inner.session.as_ref().map(RecordingSession::stats),
        }
    }

    /// Stop and persist an in-progress recording, if any
    pub async fn shutdown(&self) -> Result<Option<SavedRecording>> {
        let mut inner = self.inner.lock().await;
        if inner.is_recording() {
            info!("Saving in-progress recording before shutdown");
            Ok(Some(self.finish_locked(&mut inner).await?))
        } else {
            Ok(None)
        }
    }

    async fn begin_locked(&self, inner: &mut RecorderInner) -> Result<String> {
        if inner.is_recording() {
            warn!("Recording already in progress");
            return Err(SessionError::AlreadyRecording.into());
        }

        let stream = match self.source.acquire(inner.profile, inner.audio).await {
            Ok(stream) => stream,
            Err(e) => {
                self.event_bus.emit(RecorderEvent::DeviceFailed {
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let settings = stream.settings();
        self.event_bus.emit(RecorderEvent::StreamAcquired {
            stream_id: stream.id().to_string(),
            width: settings.width,
            height: settings.height,
            audio: settings.audio,
        });

        let options = SessionOptions::from(&self.config.recording);
        let session = RecordingSession::start(stream, options).await?;
        let session_id = session.id().to_string();

        info!("Recording started at {}", inner.profile);
        self.event_bus.emit(RecorderEvent::RecordingStarted {
            session_id: session_id.clone(),
            profile: inner.profile.label.to_string(),
            timestamp: SystemTime::now(),
        });

        inner.session = Some(session);
        Ok(session_id)
    }

    async fn finish_locked(&self, inner: &mut RecorderInner) -> Result<SavedRecording> {
        let mut session = match inner.session.take() {
            Some(session) if session.state().is_recording() => session,
            other => {
                inner.session = other;
                return Err(SessionError::NotRecording.into());
            }
        };

        let recording = session.stop().await?;
        self.event_bus.emit(RecorderEvent::RecordingStopped {
            session_id: session.id().to_string(),
            bytes: recording.len(),
            chunk_count: recording.chunk_count,
        });
        inner.session = Some(session);

        let key = match self.archive.put(&recording).await {
            Ok(key) => key,
            Err(e) => {
                error!("Error saving the video: {}", e);
                self.event_bus.emit(RecorderEvent::StorageFailed {
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        match self.archive.count().await {
            Ok(total) => info!("Total stored videos: {}", total),
            Err(e) => warn!("Failed to count stored videos: {}", e),
        }

        self.event_bus.emit(RecorderEvent::RecordingSaved {
            key: key.value(),
            bytes: recording.len(),
        });

        Ok(SavedRecording {
            key,
            bytes: recording.len(),
        })
    }
}
