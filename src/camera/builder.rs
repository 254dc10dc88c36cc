use super::device::CaptureDevice;
use super::source::CaptureSource;
use super::synthetic::SyntheticCaptureDevice;
use crate::config::{CameraBackend, CameraConfig};
use crate::error::{RecorderError, Result};
use std::sync::Arc;

/// Builder for a capture source
pub struct CaptureSourceBuilder {
    config: Option<CameraConfig>,
    device: Option<Arc<dyn CaptureDevice>>,
}

impl CaptureSourceBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            device: None,
        }
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this device instead of the configured backend
    pub fn device(mut self, device: Arc<dyn CaptureDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn build(self) -> Result<CaptureSource> {
        let config = self
            .config
            .ok_or_else(|| RecorderError::system("Camera configuration must be specified"))?;

        let device = match self.device {
            Some(device) => device,
            None => device_for_backend(config.backend)?,
        };

        Ok(CaptureSource::new(config, device))
    }
}

impl Default for CaptureSourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Instantiate the device for a configured backend
pub fn device_for_backend(backend: CameraBackend) -> Result<Arc<dyn CaptureDevice>> {
    match backend {
        CameraBackend::Synthetic => Ok(Arc::new(SyntheticCaptureDevice::new())),
        #[cfg(all(feature = "gstreamer", target_os = "linux"))]
        CameraBackend::Gstreamer => Ok(Arc::new(super::gst::GstCaptureDevice::new()?)),
        #[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
        CameraBackend::Gstreamer => Err(RecorderError::component(
            "camera",
            "GStreamer backend requires the `gstreamer` feature on Linux",
        )),
    }
}
