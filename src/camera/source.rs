use super::device::{CaptureDevice, MediaStream, StreamRequest, VideoConstraint};
use crate::config::CameraConfig;
use crate::error::DeviceError;
use crate::profile::ResolutionProfile;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Acquires live camera streams from an injected capture device
#[derive(Clone)]
pub struct CaptureSource {
    config: CameraConfig,
    device: Arc<dyn CaptureDevice>,
}

impl CaptureSource {
    pub fn new(config: CameraConfig, device: Arc<dyn CaptureDevice>) -> Self {
        Self { config, device }
    }

    /// Acquire a stream at exactly the profile's resolution.
    ///
    /// A stream that reports any other resolution is released and reported as
    /// `UnsatisfiableConstraints`.
    pub async fn acquire(
        &self,
        profile: ResolutionProfile,
        audio: bool,
    ) -> Result<Box<dyn MediaStream>, DeviceError> {
        let request = StreamRequest::exact(self.config.index, profile, audio, self.config.fps);

        info!(
            "Requesting {} stream from device {} ({})",
            profile,
            self.config.index,
            self.device.name()
        );

        let stream = self.open(&request).await?;
        let settings = stream.settings();

        if settings.dimensions() != profile.dimensions() {
            warn!(
                "Device delivered {} instead of requested {}; releasing stream {}",
                settings,
                request.video,
                stream.id()
            );
            stream.release().await;
            return Err(DeviceError::UnsatisfiableConstraints {
                requested: request.video.to_string(),
                actual: settings.to_string(),
            });
        }

        info!("Acquired stream {} at {}", stream.id(), settings);
        Ok(stream)
    }

    /// Acquire a stream at whatever resolution the device prefers
    pub async fn acquire_any(&self, audio: bool) -> Result<Box<dyn MediaStream>, DeviceError> {
        let request = StreamRequest {
            device_index: self.config.index,
            video: VideoConstraint::Any,
            audio,
            fps: self.config.fps,
        };

        let stream = self.open(&request).await?;
        info!("Acquired stream {} at {}", stream.id(), stream.settings());
        Ok(stream)
    }

    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn MediaStream>, DeviceError> {
        self.device.open(request).await.map_err(|e| {
            error!("Error accessing the camera: {}", e);
            e
        })
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn device_name(&self) -> &'static str {
        self.device.name()
    }
}
