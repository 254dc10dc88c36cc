use crate::archive::ArchiveKey;
use crate::profile::ResolutionProfile;
use crate::recording::{SessionState, SessionStats};

/// Outcome of persisting a finished recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedRecording {
    pub key: ArchiveKey,
    pub bytes: usize,
}

/// Snapshot of the recorder for status displays
#[derive(Debug, Clone)]
pub struct RecorderStatus {
    pub state: SessionState,
    pub profile: ResolutionProfile,
    pub audio: bool,
    pub session_id: Option<String>,
    pub session: Option<SessionStats>,
}

/// Why a run loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    DurationElapsed,
    UserRequest,
}
