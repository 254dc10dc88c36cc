use crate::chunk::{Chunk, ContainerFormat};
use crate::error::DeviceError;
use crate::profile::ResolutionProfile;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Video part of a stream request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoConstraint {
    /// Exactly this resolution or fail
    Exact { width: u32, height: u32 },
    /// Whatever the device prefers
    Any,
}

impl fmt::Display for VideoConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoConstraint::Exact { width, height } => write!(f, "{}x{}", width, height),
            VideoConstraint::Any => f.write_str("any resolution"),
        }
    }
}

/// What the caller asks the device for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub device_index: u32,
    pub video: VideoConstraint,
    pub audio: bool,
    pub fps: u32,
}

impl StreamRequest {
    pub fn exact(device_index: u32, profile: ResolutionProfile, audio: bool, fps: u32) -> Self {
        Self {
            device_index,
            video: VideoConstraint::Exact {
                width: profile.width,
                height: profile.height,
            },
            audio,
            fps,
        }
    }
}

/// Settings a live stream actually delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub width: u32,
    pub height: u32,
    pub audio: bool,
    pub fps: u32,
}

impl StreamSettings {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for StreamSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Options handed to a stream's encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderOptions {
    pub format: ContainerFormat,
    /// How often the encoder hands over a chunk
    pub timeslice: Duration,
}

/// Host capability that opens live audio/video streams
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Open a live stream, prompting for permission if needed
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn MediaStream>, DeviceError>;
}

/// Live audio/video source owned by a single recording session
#[async_trait]
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    fn settings(&self) -> StreamSettings;

    /// Encode the stream into `sink` until `stop` is cancelled.
    ///
    /// Chunks must be sent in emission order. Returning drops `sink`, which is
    /// the consumer's signal that no further chunks will arrive.
    async fn encode(
        &self,
        options: EncoderOptions,
        sink: mpsc::Sender<Chunk>,
        stop: CancellationToken,
    ) -> Result<(), DeviceError>;

    /// Release the underlying device
    async fn release(&self);
}
