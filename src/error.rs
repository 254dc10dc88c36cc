use crate::archive::ArchiveKey;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Recording saved as {saved}, but restarting failed: {source}")]
    RestartFailed {
        saved: ArchiveKey,
        #[source]
        source: Box<RecorderError>,
    },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl RecorderError {
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures while acquiring or running a capture device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Permission to access the camera was denied")]
    PermissionDenied,

    #[error("No capture device found at index {index}")]
    NotFound { index: u32 },

    #[error("Device cannot deliver {requested}, got {actual}")]
    UnsatisfiableConstraints { requested: String, actual: String },

    #[error("Capture backend failure: {details}")]
    Backend { details: String },
}

/// Failures of the recording archive
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to open archive at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt archive entry {path}: {details}")]
    Corrupt { path: PathBuf, details: String },

    #[error("Archive schema version {found} is newer than supported version {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Could not allocate a unique archive key after {attempts} attempts")]
    KeyExhausted { attempts: u32 },
}

impl StorageError {
    pub(crate) fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Recording session state-guard violations and producer failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("No recording is in progress")]
    NotRecording,

    #[error("Recording session has already been stopped")]
    AlreadyStopped,

    #[error("Recording session has ended and cannot be restarted")]
    SessionEnded,

    #[error("Chunk producer failed: {details}")]
    Producer { details: String },

    #[error("Invalid session options: {details}")]
    InvalidOptions { details: String },
}

pub type Result<T> = std::result::Result<T, RecorderError>;
