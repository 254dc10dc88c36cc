use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },
}

/// Events emitted by the recorder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RecorderEvent {
    /// A camera stream was acquired
    StreamAcquired {
        stream_id: String,
        width: u32,
        height: u32,
        audio: bool,
    },
    /// Acquiring a stream failed
    DeviceFailed { error: String },
    /// A recording session began
    RecordingStarted {
        session_id: String,
        profile: String,
        timestamp: SystemTime,
    },
    /// A recording session stopped and was finalized
    RecordingStopped {
        session_id: String,
        bytes: usize,
        chunk_count: usize,
    },
    /// A finalized recording was persisted
    RecordingSaved { key: u64, bytes: usize },
    /// Persisting a finalized recording failed
    StorageFailed { error: String },
    /// The resolution profile changed
    ProfileChanged { from: String, to: String },
    /// Recordings were exported to disk
    RecordingsExported { count: usize },
    /// The whole archive database was deleted
    ArchiveCleared { timestamp: SystemTime },
    /// Shutdown requested
    ShutdownRequested { reason: String },
}

impl RecorderEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            RecorderEvent::StreamAcquired {
                stream_id,
                width,
                height,
                audio,
            } => format!(
                "Stream {} acquired ({}x{}, audio: {})",
                stream_id, width, height, audio
            ),
            RecorderEvent::DeviceFailed { error } => format!("Device failure: {}", error),
            RecorderEvent::RecordingStarted {
                session_id,
                profile,
                ..
            } => format!("Recording {} started at {}", session_id, profile),
            RecorderEvent::RecordingStopped {
                session_id,
                bytes,
                chunk_count,
            } => format!(
                "Recording {} stopped ({} bytes in {} chunks)",
                session_id, bytes, chunk_count
            ),
            RecorderEvent::RecordingSaved { key, bytes } => {
                format!("Recording saved under key {} ({} bytes)", key, bytes)
            }
            RecorderEvent::StorageFailed { error } => format!("Storage failure: {}", error),
            RecorderEvent::ProfileChanged { from, to } => {
                format!("Profile changed from {} to {}", from, to)
            }
            RecorderEvent::RecordingsExported { count } => {
                format!("Exported {} recordings", count)
            }
            RecorderEvent::ArchiveCleared { .. } => "Archive cleared".to_string(),
            RecorderEvent::ShutdownRequested { reason } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            RecorderEvent::StreamAcquired { .. } => "stream_acquired",
            RecorderEvent::DeviceFailed { .. } => "device_failed",
            RecorderEvent::RecordingStarted { .. } => "recording_started",
            RecorderEvent::RecordingStopped { .. } => "recording_stopped",
            RecorderEvent::RecordingSaved { .. } => "recording_saved",
            RecorderEvent::StorageFailed { .. } => "storage_failed",
            RecorderEvent::ProfileChanged { .. } => "profile_changed",
            RecorderEvent::RecordingsExported { .. } => "recordings_exported",
            RecorderEvent::ArchiveCleared { .. } => "archive_cleared",
            RecorderEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus using a broadcast channel
pub struct EventBus {
    sender: broadcast::Sender<RecorderEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers. Returns the number of receivers.
    pub fn publish(&self, event: RecorderEvent) -> Result<usize, EventBusError> {
        match &event {
            RecorderEvent::DeviceFailed { error } | RecorderEvent::StorageFailed { error } => {
                error!("{}: {}", event.event_type(), error);
            }
            RecorderEvent::ArchiveCleared { .. } => warn!("{}", event.description()),
            RecorderEvent::RecordingSaved { .. } | RecorderEvent::RecordingStarted { .. } => {
                info!("{}", event.description())
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish, ignoring the no-subscriber case
    pub fn emit(&self, event: RecorderEvent) {
        if self.publish(event).is_err() {
            debug!("Event dropped, no subscribers");
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
