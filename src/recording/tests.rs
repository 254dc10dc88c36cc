use super::*;
use crate::camera::{
    CaptureDevice, EncoderOptions, MediaStream, StreamRequest, StreamSettings,
    SyntheticCaptureDevice,
};
use crate::chunk::{Chunk, ContainerFormat};
use crate::error::{DeviceError, SessionError};
use crate::profile::ResolutionProfile;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Stream that replays a fixed list of chunks, then waits for stop
struct ScriptedStream {
    script: Vec<Bytes>,
    final_chunk: Option<(Duration, Bytes)>,
    fail: bool,
    released: Arc<AtomicBool>,
}

impl ScriptedStream {
    fn new(script: &[&'static str]) -> Self {
        Self {
            script: script
                .iter()
                .map(|s| Bytes::from_static(s.as_bytes()))
                .collect(),
            final_chunk: None,
            fail: false,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    fn with_final_chunk(mut self, delay: Duration, data: &'static str) -> Self {
        self.final_chunk = Some((delay, Bytes::from_static(data.as_bytes())));
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

#[async_trait]
impl MediaStream for ScriptedStream {
    fn id(&self) -> &str {
        "scripted"
    }

    fn settings(&self) -> StreamSettings {
        StreamSettings {
            width: 640,
            height: 480,
            audio: false,
            fps: 30,
        }
    }

    async fn encode(
        &self,
        _options: EncoderOptions,
        sink: mpsc::Sender<Chunk>,
        stop: CancellationToken,
    ) -> Result<(), DeviceError> {
        for (i, data) in self.script.iter().enumerate() {
            if sink.send(Chunk::new(i as u64, data.clone())).await.is_err() {
                return Ok(());
            }
        }

        if self.fail {
            return Err(DeviceError::Backend {
                details: "scripted failure".to_string(),
            });
        }

        stop.cancelled().await;

        if let Some((delay, data)) = &self.final_chunk {
            tokio::time::sleep(*delay).await;
            let _ = sink
                .send(Chunk::new(self.script.len() as u64, data.clone()))
                .await;
        }
        Ok(())
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

fn options() -> SessionOptions {
    SessionOptions {
        format: ContainerFormat::Webm,
        timeslice: Duration::from_millis(10),
        channel_capacity: 4,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_finalized_length_is_sum_of_non_empty_chunks() {
    let stream = ScriptedStream::new(&["abc", "", "defgh", "", "ij"]);
    let mut session = RecordingSession::start(Box::new(stream), options())
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Recording);

    settle().await;
    let recording = session.stop().await.unwrap();

    assert_eq!(recording.len(), 10);
    assert_eq!(&recording.data[..], b"abcdefghij");
    assert_eq!(recording.chunk_count, 3);
    assert_eq!(recording.mime_type(), "video/webm");

    let stats = session.stats();
    assert_eq!(stats.state, SessionState::Stopped);
    assert_eq!(stats.chunks_received, 3);
    assert_eq!(stats.chunks_discarded, 2);
    assert_eq!(stats.bytes_received, 10);
}

#[tokio::test]
async fn test_order_preserved_through_small_channel() {
    // more chunks than the channel holds, so the producer is back-pressured
    let script = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];
    let stream = ScriptedStream::new(&script);
    let mut session = RecordingSession::start(Box::new(stream), options())
        .await
        .unwrap();

    settle().await;
    let recording = session.stop().await.unwrap();
    assert_eq!(&recording.data[..], b"0123456789");
}

#[tokio::test]
async fn test_chunk_emitted_after_stop_request_is_kept() {
    let stream =
        ScriptedStream::new(&["head"]).with_final_chunk(Duration::from_millis(50), "-tail");
    let mut session = RecordingSession::start(Box::new(stream), options())
        .await
        .unwrap();

    settle().await;
    let recording = session.stop().await.unwrap();
    assert_eq!(&recording.data[..], b"head-tail");
}

#[tokio::test]
async fn test_stop_before_any_chunk_yields_empty_recording() {
    let stream = ScriptedStream::new(&[]);
    let mut session = RecordingSession::start(Box::new(stream), options())
        .await
        .unwrap();

    let recording = session.stop().await.unwrap();
    assert!(recording.is_empty());
    assert_eq!(recording.chunk_count, 0);
}

#[tokio::test]
async fn test_stop_twice_keeps_first_result() {
    let stream = ScriptedStream::new(&["data"]);
    let released = stream.released_flag();
    let mut session = RecordingSession::start(Box::new(stream), options())
        .await
        .unwrap();

    settle().await;
    let first = session.stop().await.unwrap();
    assert!(released.load(Ordering::SeqCst));

    let err = session.stop().await.unwrap_err();
    assert_eq!(err, SessionError::AlreadyStopped);
    assert_eq!(session.finalized(), Some(&first));
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_stop_while_idle() {
    let mut session = RecordingSession::new(options());
    assert_eq!(session.stop().await.unwrap_err(), SessionError::NotRecording);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.finalized().is_none());
}

#[tokio::test]
async fn test_begin_while_recording_is_refused() {
    let mut session = RecordingSession::start(Box::new(ScriptedStream::new(&["a"])), options())
        .await
        .unwrap();

    let second = ScriptedStream::new(&["b"]);
    let second_released = second.released_flag();
    let err = session.begin(Box::new(second)).await.unwrap_err();

    assert_eq!(err, SessionError::AlreadyRecording);
    assert!(second_released.load(Ordering::SeqCst));

    settle().await;
    let recording = session.stop().await.unwrap();
    assert_eq!(&recording.data[..], b"a");
}

#[tokio::test]
async fn test_zero_capacity_or_timeslice_is_refused() {
    let mut zero_capacity = options();
    zero_capacity.channel_capacity = 0;
    let mut session = RecordingSession::new(zero_capacity);
    let stream = ScriptedStream::new(&["a"]);
    let released = stream.released_flag();

    let err = session.begin(Box::new(stream)).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidOptions { .. }));
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(session.state(), SessionState::Idle);

    let mut zero_timeslice = options();
    zero_timeslice.timeslice = Duration::ZERO;
    let mut session = RecordingSession::new(zero_timeslice);
    let err = session
        .begin(Box::new(ScriptedStream::new(&["a"])))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidOptions { .. }));
}

#[tokio::test]
async fn test_stopped_session_cannot_restart() {
    let mut session = RecordingSession::start(Box::new(ScriptedStream::new(&[])), options())
        .await
        .unwrap();
    session.stop().await.unwrap();

    let err = session
        .begin(Box::new(ScriptedStream::new(&["x"])))
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::SessionEnded);
}

#[tokio::test]
async fn test_encoder_failure_keeps_collected_chunks() {
    let stream = ScriptedStream::new(&["partial"]).failing();
    let mut session = RecordingSession::start(Box::new(stream), options())
        .await
        .unwrap();

    settle().await;
    let recording = session.stop().await.unwrap();
    assert_eq!(&recording.data[..], b"partial");
}

#[tokio::test]
async fn test_synthetic_recording_matches_chunk_totals() {
    let device = SyntheticCaptureDevice::new();
    let stream = device
        .open(&StreamRequest::exact(
            0,
            ResolutionProfile::find("480p").unwrap(),
            true,
            30,
        ))
        .await
        .unwrap();

    let mut session = RecordingSession::start(stream, options()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let recording = session.stop().await.unwrap();

    let stats = session.stats();
    assert!(recording.chunk_count >= 2);
    assert_eq!(recording.len() as u64, stats.bytes_received);
    assert_eq!(recording.chunk_count as u64, stats.chunks_received);
    assert_eq!(&recording.data[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
}

#[test]
fn test_options_from_config() {
    let config = crate::config::RecorderConfig::default();
    let options = SessionOptions::from(&config.recording);
    assert_eq!(options.timeslice, Duration::from_millis(1000));
    assert_eq!(options.channel_capacity, 64);
    assert_eq!(options.format, ContainerFormat::Webm);
}
