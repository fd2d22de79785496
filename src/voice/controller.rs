//! Voice input controller: coordinates capture and transcription for the UI

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use super::capture::{AudioCaptureSession, CaptureError, CaptureState};
use super::input::SupportReport;
use super::transcription::{Transcriber, TranscriptionError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    #[error("{0}")]
    Unsupported(String),
    #[error("not recording")]
    NotRecording,
    #[error("a transcription is still in progress")]
    Busy,
    #[error("recording was empty")]
    InvalidPayload,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
}

impl VoiceError {
    pub fn user_message(&self) -> String {
        match self {
            VoiceError::Unsupported(message) => message.clone(),
            VoiceError::NotRecording => "Not recording.".to_string(),
            VoiceError::Busy => "Still processing the last recording.".to_string(),
            VoiceError::InvalidPayload => "No audio recorded.".to_string(),
            VoiceError::Capture(e) => e.user_message(),
            VoiceError::Transcription(e) => e.user_message().to_string(),
        }
    }
}

/// Controller state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Unsupported,
    Idle,
    Capturing,
    Processing,
}

/// Read-only projection handed to the UI. Built on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    /// Waiting on the device or the OS permission prompt
    pub is_opening: bool,
    pub is_recording: bool,
    pub is_processing: bool,
    pub is_supported: bool,
    pub transcript: String,
    pub error: Option<VoiceError>,
}

/// Sent to the host when a microphone request or a transcription finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    Started,
    StartFailed(VoiceError),
    Transcribed(String),
    Failed(VoiceError),
}

#[derive(Debug, Default)]
struct Outcome {
    transcript: String,
    error: Option<VoiceError>,
    processing: bool,
}

pub struct VoiceInputController {
    capture: AudioCaptureSession,
    transcriber: Arc<dyn Transcriber>,
    outcome: Arc<Mutex<Outcome>>,
    events: mpsc::Sender<VoiceEvent>,
    support: SupportReport,
    timeout: Duration,
}

impl VoiceInputController {
    pub fn new(
        capture: AudioCaptureSession,
        transcriber: Arc<dyn Transcriber>,
        events: mpsc::Sender<VoiceEvent>,
        timeout: Duration,
    ) -> Self {
        let support = capture.check_support();
        let mut outcome = Outcome::default();
        if let Some(message) = support.message() {
            tracing::warn!("{}", message);
            outcome.error = Some(VoiceError::Unsupported(message));
        } else {
            tracing::info!("Voice input ready ({} transcription)", transcriber.name());
        }

        Self {
            capture,
            transcriber,
            outcome: Arc::new(Mutex::new(outcome)),
            events,
            support,
            timeout,
        }
    }

    fn outcome(&self) -> MutexGuard<'_, Outcome> {
        lock(&self.outcome)
    }

    pub fn state(&self) -> VoiceState {
        if !self.support.is_supported() {
            return VoiceState::Unsupported;
        }
        match self.capture.state() {
            CaptureState::RequestingPermission | CaptureState::Recording | CaptureState::Finalizing => {
                VoiceState::Capturing
            }
            CaptureState::Idle if self.outcome().processing => VoiceState::Processing,
            CaptureState::Idle => VoiceState::Idle,
        }
    }

    pub fn is_opening(&self) -> bool {
        self.capture.state() == CaptureState::RequestingPermission
    }

    pub fn is_supported(&self) -> bool {
        self.support.is_supported()
    }

    pub fn transcript(&self) -> String {
        self.outcome().transcript.clone()
    }

    pub fn error(&self) -> Option<VoiceError> {
        self.outcome().error.clone()
    }

    pub fn status(&self) -> ControllerStatus {
        let state = self.state();
        let is_opening = self.is_opening();
        let outcome = self.outcome();
        ControllerStatus {
            is_opening,
            is_recording: state == VoiceState::Capturing && !is_opening,
            is_processing: state == VoiceState::Processing,
            is_supported: state != VoiceState::Unsupported,
            transcript: outcome.transcript.clone(),
            error: outcome.error.clone(),
        }
    }

    fn fail(&self, err: VoiceError) -> VoiceError {
        self.outcome().error = Some(err.clone());
        err
    }

    /// Begin recording. Returns once the microphone request is under way;
    /// the outcome arrives later as [`VoiceEvent::Started`] or
    /// [`VoiceEvent::StartFailed`]. A second call while capturing is a no-op.
    pub fn start(&mut self) -> Result<(), VoiceError> {
        match self.state() {
            VoiceState::Unsupported => {
                let message = self.support.message().unwrap_or_default();
                return Err(self.fail(VoiceError::Unsupported(message)));
            }
            VoiceState::Capturing => {
                tracing::debug!("start() while capturing ignored");
                return Ok(());
            }
            VoiceState::Processing => return Err(VoiceError::Busy),
            VoiceState::Idle => {}
        }

        self.outcome().error = None;
        let attempt = match self.capture.begin() {
            Ok(attempt) => attempt,
            Err(e) => {
                tracing::warn!("Failed to start recording: {}", e);
                return Err(self.fail(e.into()));
            }
        };

        let outcome = self.outcome.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match attempt.run().await {
                Ok(()) => VoiceEvent::Started,
                // Cancelled by the host, which already knows
                Err(CaptureError::Cancelled) => return,
                Err(e) => {
                    tracing::warn!("Failed to start recording: {}", e);
                    let err = VoiceError::Capture(e);
                    lock(&outcome).error = Some(err.clone());
                    VoiceEvent::StartFailed(err)
                }
            };
            let _ = events.send(event).await;
        });

        Ok(())
    }

    /// Finish recording and hand the payload to the transcriber.
    ///
    /// Returns once the microphone is released; the transcript arrives later
    /// as a [`VoiceEvent`].
    pub async fn stop(&mut self) -> Result<(), VoiceError> {
        if self.capture.state() != CaptureState::Recording {
            return Err(VoiceError::NotRecording);
        }

        let payload = match self.capture.stop().await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Failed to stop recording: {}", e);
                return Err(self.fail(e.into()));
            }
        };

        if payload.is_empty() {
            tracing::info!("Discarding empty recording");
            return Err(self.fail(VoiceError::InvalidPayload));
        }

        self.outcome().processing = true;

        let transcriber = self.transcriber.clone();
        let outcome = self.outcome.clone();
        let events = self.events.clone();
        let timeout = self.timeout;
        let size = payload.len();
        let duration = payload.duration();

        tokio::spawn(async move {
            tracing::debug!(
                "Transcribing {} bytes ({:?} of audio) via {}",
                size,
                duration,
                transcriber.name()
            );
            let result = match tokio::time::timeout(timeout, transcriber.transcribe(payload)).await {
                Ok(result) => result,
                Err(_) => Err(TranscriptionError::Network(format!(
                    "transcription timed out after {}s",
                    timeout.as_secs()
                ))),
            };

            let event = {
                let mut outcome = lock(&outcome);
                outcome.processing = false;
                match result {
                    Ok(text) => {
                        outcome.transcript = text.clone();
                        outcome.error = None;
                        VoiceEvent::Transcribed(text)
                    }
                    Err(e) => {
                        tracing::warn!(retryable = e.is_retryable(), "Transcription failed: {}", e);
                        let err = VoiceError::Transcription(e);
                        outcome.error = Some(err.clone());
                        VoiceEvent::Failed(err)
                    }
                }
            };

            let _ = events.send(event).await;
        });

        Ok(())
    }

    /// Abandon a pending or in-progress recording without transcribing it
    pub fn cancel(&mut self) -> bool {
        self.capture.abandon()
    }

    /// Clear the transcript. Capture state and any in-flight transcription
    /// are untouched; a result that lands afterwards still overwrites it.
    pub fn reset(&self) {
        self.outcome().transcript.clear();
    }
}

fn lock(outcome: &Mutex<Outcome>) -> MutexGuard<'_, Outcome> {
    outcome.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
