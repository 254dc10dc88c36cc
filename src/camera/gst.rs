use super::device::{
    CaptureDevice, EncoderOptions, MediaStream, StreamRequest, StreamSettings, VideoConstraint,
};
use crate::chunk::{Chunk, ContainerFormat};
use crate::error::{DeviceError, RecorderError};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::{ClockTime, MessageType, MessageView, Pipeline};
use gstreamer_app::AppSink;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

const PROBE_TIMEOUT_SECS: u64 = 5;
const EOS_TIMEOUT: Duration = Duration::from_secs(3);

/// V4L2 camera encoded through a GStreamer pipeline
pub struct GstCaptureDevice;

impl GstCaptureDevice {
    pub fn new() -> Result<Self, RecorderError> {
        gstreamer::init().map_err(|e| {
            RecorderError::Device(DeviceError::Backend {
                details: format!("Failed to initialize GStreamer: {}", e),
            })
        })?;
        Ok(Self)
    }

    fn device_path(index: u32) -> String {
        format!("/dev/video{}", index)
    }

    fn check_device(index: u32) -> Result<(), DeviceError> {
        let path = Self::device_path(index);
        if !Path::new(&path).exists() {
            return Err(DeviceError::NotFound { index });
        }

        match std::fs::OpenOptions::new().read(true).open(&path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(DeviceError::PermissionDenied)
            }
            Err(e) => Err(DeviceError::Backend {
                details: format!("Failed to open {}: {}", path, e),
            }),
        }
    }

    fn caps_filter(video: VideoConstraint, fps: u32) -> String {
        match video {
            VideoConstraint::Exact { width, height } => format!(
                "video/x-raw,width={},height={},framerate={}/1",
                width, height, fps
            ),
            VideoConstraint::Any => "video/x-raw".to_string(),
        }
    }

    /// Negotiate one buffer to learn what the camera really delivers
    fn probe(request: &StreamRequest) -> Result<(u32, u32), DeviceError> {
        let desc = format!(
            "v4l2src device={} num-buffers=1 ! {} ! fakesink name=probe sync=false",
            Self::device_path(request.device_index),
            Self::caps_filter(request.video, request.fps)
        );

        let pipeline = launch(&desc)?;
        let bus = pipeline.bus().ok_or_else(|| DeviceError::Backend {
            details: "Probe pipeline has no bus".to_string(),
        })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| DeviceError::Backend {
                details: format!("Failed to start probe pipeline: {}", e),
            })?;

        let message = bus.timed_pop_filtered(
            Some(ClockTime::from_seconds(PROBE_TIMEOUT_SECS)),
            &[MessageType::AsyncDone, MessageType::Eos, MessageType::Error],
        );

        let result = match message.as_ref().map(|m| m.view()) {
            Some(MessageView::Error(err)) => Err(DeviceError::UnsatisfiableConstraints {
                requested: request.video.to_string(),
                actual: err.error().to_string(),
            }),
            Some(_) => pipeline
                .by_name("probe")
                .and_then(|sink| sink.static_pad("sink"))
                .and_then(|pad| pad.current_caps())
                .and_then(|caps| {
                    let s = caps.structure(0)?;
                    let width = s.get::<i32>("width").ok()?;
                    let height = s.get::<i32>("height").ok()?;
                    Some((width as u32, height as u32))
                })
                .ok_or_else(|| DeviceError::Backend {
                    details: "Camera did not negotiate video caps".to_string(),
                }),
            None => Err(DeviceError::Backend {
                details: format!("Camera probe timed out after {}s", PROBE_TIMEOUT_SECS),
            }),
        };

        let _ = pipeline.set_state(gstreamer::State::Null);
        result
    }
}

fn launch(desc: &str) -> Result<Pipeline, DeviceError> {
    debug!("Creating GStreamer pipeline: {}", desc);
    gstreamer::parse::launch(desc)
        .map_err(|e| DeviceError::Backend {
            details: format!("Failed to create pipeline: {}", e),
        })?
        .downcast::<Pipeline>()
        .map_err(|_| DeviceError::Backend {
            details: "Failed to downcast to Pipeline".to_string(),
        })
}

#[async_trait]
impl CaptureDevice for GstCaptureDevice {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn MediaStream>, DeviceError> {
        Self::check_device(request.device_index)?;

        let probe_request = request.clone();
        let (width, height) = tokio::task::spawn_blocking(move || Self::probe(&probe_request))
            .await
            .map_err(|e| DeviceError::Backend {
                details: format!("Probe task failed: {}", e),
            })??;

        let stream = GstStream {
            id: Uuid::new_v4().to_string(),
            device_path: Self::device_path(request.device_index),
            settings: StreamSettings {
                width,
                height,
                audio: request.audio,
                fps: request.fps,
            },
            released: AtomicBool::new(false),
        };

        info!(
            "Opened camera {} as stream {} ({}x{})",
            stream.device_path, stream.id, width, height
        );
        Ok(Box::new(stream))
    }
}

struct GstStream {
    id: String,
    device_path: String,
    settings: StreamSettings,
    released: AtomicBool,
}

impl GstStream {
    fn pipeline_string(&self, format: ContainerFormat) -> String {
        let muxer = match format {
            ContainerFormat::Webm => "webmmux",
            ContainerFormat::Matroska => "matroskamux",
        };

        let mut desc = format!(
            "v4l2src device={} do-timestamp=true ! \
             video/x-raw,width={},height={},framerate={}/1 ! \
             videoconvert ! vp8enc deadline=1 ! queue ! mux. ",
            self.device_path, self.settings.width, self.settings.height, self.settings.fps
        );

        if self.settings.audio {
            desc.push_str(
                "autoaudiosrc ! audioconvert ! audioresample ! vorbisenc ! queue ! mux. ",
            );
        }

        desc.push_str(&format!(
            "{} name=mux streamable=true ! \
             appsink name=sink sync=false max-buffers=0 drop=false emit-signals=false",
            muxer
        ));
        desc
    }
}

#[async_trait]
impl MediaStream for GstStream {
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

        let pipeline = launch(&self.pipeline_string(options.format))?;
        let appsink = pipeline
            .by_name("sink")
            .and_then(|e| e.downcast::<AppSink>().ok())
            .ok_or_else(|| DeviceError::Backend {
                details: "Pipeline has no appsink".to_string(),
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
                    let map = buffer
                        .map_readable()
                        .map_err(|_| gstreamer::FlowError::Error)?;
                    let _ = tx.send(map.as_slice().to_vec());
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| DeviceError::Backend {
                details: format!("Failed to start GStreamer pipeline: {}", e),
            })?;
        info!("GStreamer encoder started for stream {}", self.id);

        let bus = pipeline.bus().ok_or_else(|| DeviceError::Backend {
            details: "Pipeline has no bus".to_string(),
        })?;

        // mux output is coalesced into one chunk per timeslice
        let mut ticker = tokio::time::interval(options.timeslice);
        ticker.tick().await;
        let mut pending: Vec<u8> = Vec::new();
        let mut sequence = 0u64;
        let mut result = Ok(());

        loop {
            tokio::select! {
                data = rx.recv() => match data {
                    Some(data) => pending.extend_from_slice(&data),
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Some(msg) = bus.pop_filtered(&[MessageType::Error]) {
                        if let MessageView::Error(err) = msg.view() {
                            error!("GStreamer error on stream {}: {}", self.id, err.error());
                            result = Err(DeviceError::Backend {
                                details: err.error().to_string(),
                            });
                            break;
                        }
                    }
                    let chunk = Chunk::new(sequence, std::mem::take(&mut pending));
                    trace!("GStreamer chunk {} ({} bytes)", sequence, chunk.size());
                    if sink.send(chunk).await.is_err() {
                        warn!("Chunk consumer for stream {} went away", self.id);
                        break;
                    }
                    sequence += 1;
                }
                _ = stop.cancelled() => break,
            }
        }

        // let the muxer write its trailer before tearing down
        pipeline.send_event(gstreamer::event::Eos::new());
        let eos_bus = bus.clone();
        let _ = tokio::task::spawn_blocking(move || {
            eos_bus.timed_pop_filtered(
                Some(ClockTime::from_mseconds(EOS_TIMEOUT.as_millis() as u64)),
                &[MessageType::Eos, MessageType::Error],
            )
        })
        .await;

        while let Ok(data) = rx.try_recv() {
            pending.extend_from_slice(&data);
        }
        if !pending.is_empty() {
            let _ = sink.send(Chunk::new(sequence, pending)).await;
        }

        let _ = pipeline.set_state(gstreamer::State::Null);
        debug!("GStreamer encoder for stream {} stopped", self.id);
        result
    }

    async fn release(&self) {
        if !self.released.swap(true, Ordering::Relaxed) {
            debug!("Released camera stream {}", self.id);
        }
    }
}
