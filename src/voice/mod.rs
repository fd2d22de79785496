//! Voice input: microphone capture, transcription, and the controller tying them together

mod capture;
mod controller;
mod diagnose;
mod encode;
mod input;
mod transcription;

pub use capture::AudioCaptureSession;
pub use controller::{ControllerStatus, VoiceError, VoiceEvent, VoiceInputController, VoiceState};
pub use diagnose::diagnose;
pub use input::CpalInput;
pub use transcription::{DirectTranscriber, Transcriber, UploadTranscriber};
