use super::state::{SessionState, SessionStats};
use crate::camera::{EncoderOptions, MediaStream};
use crate::chunk::{Chunk, ContainerFormat, FinalizedRecording};
use crate::config::RecordingConfig;
use crate::error::{DeviceError, SessionError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Encoder and channel settings for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub format: ContainerFormat,
    pub timeslice: Duration,
    pub channel_capacity: usize,
}

impl From<&RecordingConfig> for SessionOptions {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            format: config.container,
            timeslice: Duration::from_millis(config.timeslice_ms),
            channel_capacity: config.channel_capacity,
        }
    }
}

impl SessionOptions {
    /// Zero capacity or a zero timeslice cannot drive the chunk channel
    pub fn check(&self) -> Result<(), SessionError> {
        if self.channel_capacity == 0 {
            return Err(SessionError::InvalidOptions {
                details: "channel capacity must be greater than 0".to_string(),
            });
        }
        if self.timeslice.is_zero() {
            return Err(SessionError::InvalidOptions {
                details: "timeslice must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            format: ContainerFormat::Webm,
            timeslice: Duration::from_millis(1000),
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Default)]
struct ChunkCounters {
    received: AtomicU64,
    discarded: AtomicU64,
    bytes: AtomicU64,
}

/// Tasks and handles that exist only while recording
struct ActiveRecording {
    stream: Arc<dyn MediaStream>,
    stop: CancellationToken,
    producer: JoinHandle<Result<(), DeviceError>>,
    collector: JoinHandle<Vec<Chunk>>,
    started_at: SystemTime,
}

/// One recording: Idle -> Recording -> Stopped
pub struct RecordingSession {
    id: String,
    options: SessionOptions,
    state: SessionState,
    active: Option<ActiveRecording>,
    finalized: Option<FinalizedRecording>,
    counters: Arc<ChunkCounters>,
}

impl RecordingSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            options,
            state: SessionState::Idle,
            active: None,
            finalized: None,
            counters: Arc::new(ChunkCounters::default()),
        }
    }

    /// Create a session and immediately begin recording `stream`
    pub async fn start(
        stream: Box<dyn MediaStream>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let mut session = Self::new(options);
        session.begin(stream).await?;
        Ok(session)
    }

    /// Begin recording. The session takes ownership of the stream; a refused
    /// stream is released.
    pub async fn begin(&mut self, stream: Box<dyn MediaStream>) -> Result<(), SessionError> {
        let refusal = match self.state {
            SessionState::Idle => self.options.check().err(),
            SessionState::Recording => Some(SessionError::AlreadyRecording),
            SessionState::Stopped => Some(SessionError::SessionEnded),
        };
        if let Some(err) = refusal {
            warn!("Refusing to begin session {}: {}", self.id, err);
            stream.release().await;
            return Err(err);
        }

        let stream: Arc<dyn MediaStream> = Arc::from(stream);
        let (tx, rx) = mpsc::channel(self.options.channel_capacity);
        let stop = CancellationToken::new();
        let encoder_options = EncoderOptions {
            format: self.options.format,
            timeslice: self.options.timeslice,
        };

        let producer = {
            let stream = Arc::clone(&stream);
            let stop = stop.clone();
            let session_id = self.id.clone();
            tokio::spawn(async move {
                let result = stream.encode(encoder_options, tx, stop).await;
                if let Err(e) = &result {
                    error!("Encoder for session {} failed: {}", session_id, e);
                }
                result
            })
        };

        let collector = tokio::spawn(collect_chunks(
            self.id.clone(),
            rx,
            Arc::clone(&self.counters),
        ));

        info!(
            "Session {} recording stream {} ({}, {})",
            self.id,
            stream.id(),
            stream.settings(),
            self.options.format.mime_type()
        );

        self.active = Some(ActiveRecording {
            stream,
            stop,
            producer,
            collector,
            started_at: SystemTime::now(),
        });
        self.state = SessionState::Recording;
        Ok(())
    }

    /// Stop recording and assemble the finalized recording.
    ///
    /// Waits for the encoder to finish and for every chunk it emitted to be
    /// collected before concatenating. Calling this again fails without
    /// touching the already finalized recording.
    pub async fn stop(&mut self) -> Result<FinalizedRecording, SessionError> {
        match self.state {
            SessionState::Idle => return Err(SessionError::NotRecording),
            SessionState::Stopped => return Err(SessionError::AlreadyStopped),
            SessionState::Recording => {}
        }

        let active = self.active.take().ok_or(SessionError::NotRecording)?;
        self.state = SessionState::Stopped;

        active.stop.cancel();

        match active.producer.await {
            Ok(Ok(())) => debug!("Encoder for session {} finished", self.id),
            Ok(Err(e)) => warn!(
                "Session {} encoder ended with error, keeping collected chunks: {}",
                self.id, e
            ),
            Err(e) => warn!("Encoder task for session {} aborted: {}", self.id, e),
        }

        let chunks = active.collector.await;
        active.stream.release().await;

        let chunks = chunks.map_err(|e| {
            error!("Chunk collector for session {} failed: {}", self.id, e);
            SessionError::Producer {
                details: e.to_string(),
            }
        })?;

        let recording = FinalizedRecording::assemble(
            self.options.format,
            &chunks,
            active.started_at,
            SystemTime::now(),
        );

        info!(
            "Session {} finalized: {} bytes from {} chunks ({:?})",
            self.id,
            recording.len(),
            recording.chunk_count,
            recording.duration()
        );

        self.finalized = Some(recording.clone());
        Ok(recording)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// The recording produced by `stop`, if any
    pub fn finalized(&self) -> Option<&FinalizedRecording> {
        self.finalized.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state,
            chunks_received: self.counters.received.load(Ordering::Relaxed),
            chunks_discarded: self.counters.discarded.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes.load(Ordering::Relaxed),
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            warn!("Session {} dropped while recording; stopping encoder", self.id);
            active.stop.cancel();
        }
    }
}

/// Append chunks in arrival order until every sender is gone
async fn collect_chunks(
    session_id: String,
    mut rx: mpsc::Receiver<Chunk>,
    counters: Arc<ChunkCounters>,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    while let Some(chunk) = rx.recv().await {
        if chunk.is_empty() {
            counters.discarded.fetch_add(1, Ordering::Relaxed);
            trace!("Session {} discarded empty chunk {}", session_id, chunk.sequence);
            continue;
        }

        counters.received.fetch_add(1, Ordering::Relaxed);
        counters
            .bytes
            .fetch_add(chunk.size() as u64, Ordering::Relaxed);
        trace!(
            "Session {} chunk {} ({} bytes)",
            session_id,
            chunk.sequence,
            chunk.size()
        );
        chunks.push(chunk);
    }

    debug!(
        "Chunk channel for session {} closed after {} chunks",
        session_id,
        chunks.len()
    );
    chunks
}
