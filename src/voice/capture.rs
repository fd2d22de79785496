//! Audio capture session: one microphone recording from acquisition to payload

use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use uuid::Uuid;

use super::encode::{encode_wav, resample, AudioChunk, ChunkSink};
use super::input::{AudioInput, FormatRequest, InputTrack, SupportReport};

pub const WAV_MIME: &str = "audio/wav";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("{0}")]
    UnsupportedPlatform(String),
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("no audio input device available")]
    DeviceUnavailable,
    #[error("capture format rejected: {0}")]
    FormatRejected(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("a capture is already in progress")]
    AlreadyActive,
    #[error("not recording")]
    NotRecording,
    #[error("{0}")]
    Encode(String),
    #[error("capture cancelled")]
    Cancelled,
}

impl CaptureError {
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::UnsupportedPlatform(message) => message.clone(),
            CaptureError::PermissionDenied => {
                "Failed to start recording. Please check your microphone permissions.".to_string()
            }
            CaptureError::DeviceUnavailable => "No microphone was found.".to_string(),
            CaptureError::NotRecording => "Not recording.".to_string(),
            CaptureError::AlreadyActive => "Already recording.".to_string(),
            CaptureError::FormatRejected(_) | CaptureError::Stream(_) => {
                "Failed to start recording.".to_string()
            }
            CaptureError::Encode(_) => "Failed to stop recording.".to_string(),
            CaptureError::Cancelled => "Recording cancelled.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    RequestingPermission,
    Recording,
    Finalizing,
}

/// Finished recording, ready to hand to a transcriber exactly once
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPayload {
    bytes: Vec<u8>,
    mime: &'static str,
    duration: Duration,
}

impl AudioPayload {
    pub fn new(bytes: Vec<u8>, mime: &'static str, duration: Duration) -> Self {
        Self {
            bytes,
            mime,
            duration,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), WAV_MIME, Duration::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn file_name(&self) -> &'static str {
        match self.mime {
            WAV_MIME => "recording.wav",
            _ => "recording.bin",
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

struct ActiveCapture {
    id: Uuid,
    track: Box<dyn InputTrack>,
    sink: ChunkSink,
    chunks: mpsc::Receiver<AudioChunk>,
    started_at: Instant,
}

struct Shared {
    state: CaptureState,
    active: Option<ActiveCapture>,
    /// Bumped when an open begins or a pending one is cancelled
    attempt: u64,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns the microphone for the lifetime of one recording
pub struct AudioCaptureSession {
    input: Arc<dyn AudioInput>,
    shared: Arc<Mutex<Shared>>,
    chunk_interval: Duration,
    target_sample_rate: u32,
}

impl AudioCaptureSession {
    pub fn new(input: Box<dyn AudioInput>, chunk_interval: Duration, target_sample_rate: u32) -> Self {
        Self {
            input: Arc::from(input),
            shared: Arc::new(Mutex::new(Shared {
                state: CaptureState::Idle,
                active: None,
                attempt: 0,
            })),
            chunk_interval,
            target_sample_rate,
        }
    }

    pub fn state(&self) -> CaptureState {
        lock(&self.shared).state
    }

    pub fn check_support(&self) -> SupportReport {
        self.input.support()
    }

    /// Claim the session for a new recording. The returned attempt does the
    /// actual open and can run on another task; until it finishes the
    /// session sits in `RequestingPermission`.
    pub fn begin(&mut self) -> Result<OpenAttempt, CaptureError> {
        let mut shared = lock(&self.shared);
        if shared.state != CaptureState::Idle {
            return Err(CaptureError::AlreadyActive);
        }

        if let Some(message) = self.input.support().message() {
            return Err(CaptureError::UnsupportedPlatform(message));
        }

        shared.state = CaptureState::RequestingPermission;
        shared.attempt += 1;

        Ok(OpenAttempt {
            input: self.input.clone(),
            shared: self.shared.clone(),
            attempt: shared.attempt,
            chunk_interval: self.chunk_interval,
            target_sample_rate: self.target_sample_rate,
        })
    }

    /// Finalize the recording into a payload. The track is released before
    /// encoding starts, whatever the outcome.
    pub async fn stop(&mut self) -> Result<AudioPayload, CaptureError> {
        let active = {
            let mut shared = lock(&self.shared);
            if shared.state != CaptureState::Recording {
                return Err(CaptureError::NotRecording);
            }
            match shared.active.take() {
                Some(active) => {
                    shared.state = CaptureState::Finalizing;
                    active
                }
                None => {
                    shared.state = CaptureState::Idle;
                    return Err(CaptureError::NotRecording);
                }
            }
        };

        let ActiveCapture {
            id,
            track,
            sink,
            chunks,
            started_at,
        } = active;

        // No chunk can arrive once the track is released
        track.release();

        let target_rate = self.target_sample_rate;
        let result = tokio::task::spawn_blocking(move || {
            tracing::debug!(capture_id = %id, "Recorded for {:?}", started_at.elapsed());
            finalize(sink, chunks, target_rate)
        })
        .await
        .unwrap_or_else(|e| Err(CaptureError::Encode(e.to_string())));

        lock(&self.shared).state = CaptureState::Idle;
        result
    }

    /// Drop the recording, or a pending open, without producing a payload
    pub fn abandon(&mut self) -> bool {
        let mut shared = lock(&self.shared);
        if shared.state == CaptureState::RequestingPermission {
            // The open task sees the bumped attempt and releases what it got
            shared.state = CaptureState::Idle;
            shared.attempt += 1;
            tracing::info!("Microphone request cancelled");
            return true;
        }

        let active = shared.active.take();
        match active {
            Some(active) => {
                shared.state = CaptureState::Idle;
                drop(shared);
                tracing::info!(capture_id = %active.id, "Recording abandoned");
                active.track.release();
                true
            }
            None => false,
        }
    }
}

impl Drop for AudioCaptureSession {
    fn drop(&mut self) {
        self.abandon();
    }
}

/// A claimed but not yet opened recording
pub struct OpenAttempt {
    input: Arc<dyn AudioInput>,
    shared: Arc<Mutex<Shared>>,
    attempt: u64,
    chunk_interval: Duration,
    target_sample_rate: u32,
}

impl OpenAttempt {
    /// Open the device, retrying once with its default format. If the
    /// session was cancelled meanwhile, the track is released and
    /// `Cancelled` returned.
    pub async fn run(self) -> Result<(), CaptureError> {
        let (sink, chunks) = ChunkSink::new(self.chunk_interval);

        let preferred = FormatRequest::Preferred {
            sample_rate: self.target_sample_rate,
        };
        let opened = match self.input.open(preferred, sink.clone()).await {
            Err(CaptureError::FormatRejected(reason)) => {
                tracing::warn!(
                    "Preferred capture format rejected ({}), retrying with device default",
                    reason
                );
                self.input.open(FormatRequest::DeviceDefault, sink.clone()).await
            }
            other => other,
        };

        let mut shared = lock(&self.shared);
        let current =
            shared.attempt == self.attempt && shared.state == CaptureState::RequestingPermission;

        match opened {
            Ok(track) if current => {
                let id = Uuid::new_v4();
                tracing::info!(
                    capture_id = %id,
                    "Recording from {} at {} Hz",
                    self.input.name(),
                    track.sample_rate()
                );
                shared.active = Some(ActiveCapture {
                    id,
                    track,
                    sink,
                    chunks,
                    started_at: Instant::now(),
                });
                shared.state = CaptureState::Recording;
                Ok(())
            }
            Ok(track) => {
                drop(shared);
                tracing::debug!("Microphone opened after cancel, releasing");
                track.release();
                Err(CaptureError::Cancelled)
            }
            Err(e) if current => {
                shared.state = CaptureState::Idle;
                Err(e)
            }
            Err(_) => Err(CaptureError::Cancelled),
        }
    }
}

fn finalize(
    sink: ChunkSink,
    chunks: mpsc::Receiver<AudioChunk>,
    target_rate: u32,
) -> Result<AudioPayload, CaptureError> {
    sink.flush();

    let mut samples = Vec::new();
    let mut source_rate = target_rate;
    let mut chunk_count = 0;
    for chunk in chunks.try_iter() {
        debug_assert_eq!(chunk.index, chunk_count, "chunks arrive in order");
        source_rate = chunk.sample_rate;
        samples.extend_from_slice(&chunk.samples);
        chunk_count += 1;
    }

    tracing::debug!("Finalizing {} chunks, {} samples", chunk_count, samples.len());

    if samples.is_empty() {
        return Ok(AudioPayload::empty());
    }

    let samples = resample(&samples, source_rate, target_rate);
    let duration = Duration::from_secs_f64(samples.len() as f64 / target_rate as f64);
    let bytes = encode_wav(&samples, target_rate).map_err(|e| CaptureError::Encode(e.to_string()))?;

    Ok(AudioPayload::new(bytes, WAV_MIME, duration))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Acquire/release bookkeeping shared between a fake input and a test
    #[derive(Debug, Default)]
    pub struct TrackCounters {
        pub acquired: AtomicUsize,
        pub released: AtomicUsize,
        pub open_attempts: AtomicUsize,
    }

    impl TrackCounters {
        pub fn acquired(&self) -> usize {
            self.acquired.load(Ordering::SeqCst)
        }

        pub fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }

        pub fn open_attempts(&self) -> usize {
            self.open_attempts.load(Ordering::SeqCst)
        }
    }

    /// Scripted microphone: pushes `samples` into the sink when opened
    pub struct FakeInput {
        pub report: SupportReport,
        pub samples: Vec<f32>,
        pub sample_rate: u32,
        pub open_errors: Mutex<Vec<CaptureError>>,
        pub counters: Arc<TrackCounters>,
        pub requests: Arc<Mutex<Vec<FormatRequest>>>,
        pub devices: Vec<String>,
        /// When set, `open` waits for a notification before acquiring
        pub gate: Option<Arc<Notify>>,
    }

    impl FakeInput {
        pub fn new(samples: Vec<f32>) -> Self {
            Self {
                report: SupportReport::full(),
                samples,
                sample_rate: 16000,
                open_errors: Mutex::new(Vec::new()),
                counters: Arc::new(TrackCounters::default()),
                requests: Arc::new(Mutex::new(Vec::new())),
                devices: vec!["Fake Microphone".to_string()],
                gate: None,
            }
        }

        /// Errors are returned by successive `open` calls, first in first out
        pub fn failing_with(mut self, errors: Vec<CaptureError>) -> Self {
            self.open_errors = Mutex::new(errors);
            self
        }

        /// Hold every `open` until `gate` is notified, like a pending OS prompt
        pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }
    }

    struct FakeTrack {
        sample_rate: u32,
        counters: Arc<TrackCounters>,
    }

    impl InputTrack for FakeTrack {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn release(self: Box<Self>) {
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AudioInput for FakeInput {
        fn support(&self) -> SupportReport {
            self.report
        }

        fn devices(&self) -> Vec<String> {
            self.devices.clone()
        }

        async fn open(
            &self,
            request: FormatRequest,
            sink: ChunkSink,
        ) -> Result<Box<dyn InputTrack>, CaptureError> {
            self.counters.open_attempts.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            {
                let mut errors = self.open_errors.lock().unwrap();
                if !errors.is_empty() {
                    return Err(errors.remove(0));
                }
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            self.counters.acquired.fetch_add(1, Ordering::SeqCst);
            sink.set_sample_rate(self.sample_rate);
            sink.push(&self.samples);
            Ok(Box::new(FakeTrack {
                sample_rate: self.sample_rate,
                counters: self.counters.clone(),
            }))
        }

        fn name(&self) -> &str {
            "fake input"
        }
    }
}
