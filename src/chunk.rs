use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Container format produced by the encoder. Fixed per configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// WebM (VP8 video, Vorbis audio)
    #[default]
    Webm,
    /// Matroska with the same codecs
    Matroska,
}

impl ContainerFormat {
    /// Media type tag attached to finalized recordings
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::Webm => "video/webm",
            ContainerFormat::Matroska => "video/x-matroska",
        }
    }

    /// File extension used for payloads and exports
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Webm => "webm",
            ContainerFormat::Matroska => "mkv",
        }
    }

    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "video/webm" => Some(ContainerFormat::Webm),
            "video/x-matroska" => Some(ContainerFormat::Matroska),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ContainerFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webm" => Ok(ContainerFormat::Webm),
            "mkv" | "matroska" => Ok(ContainerFormat::Matroska),
            other => Err(format!("unsupported container format '{}'", other)),
        }
    }
}

/// Encoded media fragment emitted while recording
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Emission order within the producing stream
    pub sequence: u64,
    /// Time the encoder handed the chunk over
    pub timestamp: SystemTime,
    pub data: Bytes,
}

impl Chunk {
    pub fn new(sequence: u64, data: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            timestamp: SystemTime::now(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Complete media object assembled from one session's chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedRecording {
    pub format: ContainerFormat,
    pub data: Bytes,
    pub chunk_count: usize,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
}

impl FinalizedRecording {
    /// Concatenate chunks in the order given
    pub fn assemble(
        format: ContainerFormat,
        chunks: &[Chunk],
        started_at: SystemTime,
        finished_at: SystemTime,
    ) -> Self {
        let total: usize = chunks.iter().map(Chunk::size).sum();
        let mut buf = BytesMut::with_capacity(total);
        for chunk in chunks {
            buf.extend_from_slice(&chunk.data);
        }

        Self {
            format,
            data: buf.freeze(),
            chunk_count: chunks.len(),
            started_at,
            finished_at,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.finished_at
            .duration_since(self.started_at)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_tags() {
        assert_eq!(ContainerFormat::Webm.mime_type(), "video/webm");
        assert_eq!(ContainerFormat::Webm.extension(), "webm");
        assert_eq!(ContainerFormat::Matroska.extension(), "mkv");
        assert_eq!(
            ContainerFormat::from_mime_type("video/x-matroska"),
            Some(ContainerFormat::Matroska)
        );
        assert_eq!(ContainerFormat::from_mime_type("video/mp4"), None);
    }

    #[test]
    fn test_container_parse() {
        assert_eq!("WebM".parse::<ContainerFormat>(), Ok(ContainerFormat::Webm));
        assert_eq!("mkv".parse::<ContainerFormat>(), Ok(ContainerFormat::Matroska));
        assert!("mp4".parse::<ContainerFormat>().is_err());
    }

    #[test]
    fn test_assemble_preserves_order() {
        let chunks = vec![
            Chunk::new(0, &b"abc"[..]),
            Chunk::new(1, &b"de"[..]),
            Chunk::new(2, &b"f"[..]),
        ];
        let now = SystemTime::now();
        let recording = FinalizedRecording::assemble(ContainerFormat::Webm, &chunks, now, now);

        assert_eq!(&recording.data[..], b"abcdef");
        assert_eq!(recording.chunk_count, 3);
        assert_eq!(recording.mime_type(), "video/webm");
    }

    #[test]
    fn test_assemble_empty() {
        let now = SystemTime::now();
        let recording = FinalizedRecording::assemble(ContainerFormat::Webm, &[], now, now);
        assert!(recording.is_empty());
        assert_eq!(recording.chunk_count, 0);
    }
}
