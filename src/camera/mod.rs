mod builder;
mod device;
#[cfg(all(feature = "gstreamer", target_os = "linux"))]
mod gst;
mod source;
mod synthetic;

pub use builder::{device_for_backend, CaptureSourceBuilder};
pub use device::{
    CaptureDevice, EncoderOptions, MediaStream, StreamRequest, StreamSettings, VideoConstraint,
};
#[cfg(all(feature = "gstreamer", target_os = "linux"))]
pub use gst::GstCaptureDevice;
pub use source::CaptureSource;
pub use synthetic::SyntheticCaptureDevice;
