use crate::chunk::{ContainerFormat, FinalizedRecording};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Archive key: wall-clock milliseconds at insertion, unique per collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveKey(pub u64);

impl ArchiveKey {
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Insertion time encoded in the key
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.0 as i64)
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ArchiveKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ArchiveKey)
    }
}

impl From<u64> for ArchiveKey {
    fn from(value: u64) -> Self {
        ArchiveKey(value)
    }
}

/// A stored recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub key: ArchiveKey,
    pub created_at: DateTime<Utc>,
    pub format: ContainerFormat,
    /// Absent when the payload went missing from the store
    pub payload: Option<Bytes>,
}

impl ArchiveRecord {
    pub fn new(key: ArchiveKey, recording: &FinalizedRecording) -> Self {
        Self {
            key,
            created_at: Utc::now(),
            format: recording.format,
            payload: Some(recording.data.clone()),
        }
    }

    pub fn size(&self) -> usize {
        self.payload.as_ref().map(Bytes::len).unwrap_or(0)
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// On-disk sidecar describing a stored payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RecordMetadata {
    pub key: ArchiveKey,
    pub created_at: DateTime<Utc>,
    pub media_type: String,
    pub size: u64,
    pub payload_file: String,
}
