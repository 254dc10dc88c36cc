use super::device::{
    CaptureDevice, EncoderOptions, MediaStream, StreamRequest, StreamSettings, VideoConstraint,
};
use crate::chunk::{Chunk, ContainerFormat};
use crate::error::DeviceError;
use crate::profile::ResolutionProfile;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// EBML magic that opens every WebM/Matroska file
const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];
/// Matroska cluster element id
const CLUSTER_ID: [u8; 4] = [0x1F, 0x43, 0xB6, 0x75];

/// Capture device that generates a deterministic test pattern
pub struct SyntheticCaptureDevice {
    device_count: u32,
    permission_granted: bool,
    resolutions: Vec<(u32, u32)>,
    streams_opened: Arc<AtomicU64>,
}

impl SyntheticCaptureDevice {
    /// One device supporting every built-in profile
    pub fn new() -> Self {
        Self {
            device_count: 1,
            permission_granted: true,
            resolutions: ResolutionProfile::all()
                .iter()
                .map(|p| p.dimensions())
                .collect(),
            streams_opened: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_resolutions(mut self, resolutions: Vec<(u32, u32)>) -> Self {
        self.resolutions = resolutions;
        self
    }

    pub fn with_permission(mut self, granted: bool) -> Self {
        self.permission_granted = granted;
        self
    }

    pub fn with_device_count(mut self, count: u32) -> Self {
        self.device_count = count;
        self
    }

    pub fn streams_opened(&self) -> u64 {
        self.streams_opened.load(Ordering::Relaxed)
    }
}

impl Default for SyntheticCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCaptureDevice {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn MediaStream>, DeviceError> {
        if !self.permission_granted {
            return Err(DeviceError::PermissionDenied);
        }

        if request.device_index >= self.device_count {
            return Err(DeviceError::NotFound {
                index: request.device_index,
            });
        }

        let (width, height) = match request.video {
            VideoConstraint::Exact { width, height } => {
                if !self.resolutions.contains(&(width, height)) {
                    return Err(DeviceError::UnsatisfiableConstraints {
                        requested: request.video.to_string(),
                        actual: "unsupported by synthetic device".to_string(),
                    });
                }
                (width, height)
            }
            VideoConstraint::Any => self.resolutions.first().copied().ok_or_else(|| {
                DeviceError::Backend {
                    details: "synthetic device has no resolutions".to_string(),
                }
            })?,
        };

        self.streams_opened.fetch_add(1, Ordering::Relaxed);

        let stream = SyntheticStream {
            id: Uuid::new_v4().to_string(),
            settings: StreamSettings {
                width,
                height,
                audio: request.audio,
                fps: request.fps,
            },
            released: AtomicBool::new(false),
        };

        info!(
            "Opened synthetic stream {} ({}x{}, audio: {})",
            stream.id, width, height, request.audio
        );

        Ok(Box::new(stream))
    }
}

struct SyntheticStream {
    id: String,
    settings: StreamSettings,
    released: AtomicBool,
}

impl SyntheticStream {
    fn header(format: ContainerFormat) -> Bytes {
        let doc_type: &[u8] = match format {
            ContainerFormat::Webm => b"webm",
            ContainerFormat::Matroska => b"matroska",
        };
        let mut buf = BytesMut::with_capacity(16 + doc_type.len());
        buf.put_slice(&EBML_MAGIC);
        buf.put_u8(0x42);
        buf.put_u8(0x82);
        buf.put_u8(0x80 | doc_type.len() as u8);
        buf.put_slice(doc_type);
        buf.freeze()
    }

    /// One cluster of pattern bytes; size scales with resolution
    fn cluster(&self, sequence: u64) -> Bytes {
        let payload_len =
            (self.settings.width as usize * self.settings.height as usize / 2048).max(64)
                + (sequence % 16) as usize;
        let mut buf = BytesMut::with_capacity(CLUSTER_ID.len() + 8 + payload_len);
        buf.put_slice(&CLUSTER_ID);
        buf.put_u64(sequence);
        buf.put_bytes((sequence % 251) as u8, payload_len);
        buf.freeze()
    }
}

#[async_trait]
impl MediaStream for SyntheticStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn settings(&self) -> StreamSettings {
        self.settings
    }

    async fn encode(
        &self,
        options: EncoderOptions,
        sink: mpsc::Sender<Chunk>,
        stop: CancellationToken,
    ) -> Result<(), DeviceError> {
        if self.released.load(Ordering::Relaxed) {
            return Err(DeviceError::Backend {
                details: format!("stream {} already released", self.id),
            });
        }

        let mut sequence = 0u64;
        let mut ticker = tokio::time::interval(options.timeslice);
        // first tick completes immediately
        ticker.tick().await;

        let mut pending = BytesMut::new();
        pending.extend_from_slice(&Self::header(options.format));

        debug!("Synthetic encoder started for stream {}", self.id);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    pending.extend_from_slice(&self.cluster(sequence));
                    let chunk = Chunk::new(sequence, pending.split().freeze());
                    trace!("Synthetic chunk {} ({} bytes)", sequence, chunk.size());
                    if sink.send(chunk).await.is_err() {
                        warn!("Chunk consumer for stream {} went away", self.id);
                        return Ok(());
                    }
                    sequence += 1;
                }
                _ = stop.cancelled() => {
                    // flush whatever was encoded since the last timeslice
                    pending.extend_from_slice(&self.cluster(sequence));
                    let chunk = Chunk::new(sequence, pending.split().freeze());
                    if sink.send(chunk).await.is_err() {
                        warn!("Chunk consumer for stream {} went away", self.id);
                    }
                    break;
                }
            }
        }

        debug!(
            "Synthetic encoder for stream {} stopped after {} chunks",
            self.id,
            sequence + 1
        );
        Ok(())
    }

    async fn release(&self) {
        if !self.released.swap(true, Ordering::Relaxed) {
            debug!("Released synthetic stream {}", self.id);
        }
    }
}
