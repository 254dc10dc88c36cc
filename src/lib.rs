pub mod app;
pub mod archive;
pub mod camera;
pub mod chunk;
pub mod config;
pub mod error;
pub mod events;
pub mod profile;
pub mod recording;

pub use app::{Recorder, RecorderStatus, SavedRecording, ShutdownReason};
pub use archive::{Archive, ArchiveKey, ArchiveRecord, FileArchive, MemoryArchive};
pub use camera::{CaptureDevice, CaptureSource, CaptureSourceBuilder, MediaStream};
pub use chunk::{Chunk, ContainerFormat, FinalizedRecording};
pub use config::RecorderConfig;
pub use error::{DeviceError, RecorderError, Result, SessionError, StorageError};
pub use events::{EventBus, RecorderEvent};
pub use profile::ResolutionProfile;
pub use recording::{RecordingSession, SessionOptions, SessionState};
