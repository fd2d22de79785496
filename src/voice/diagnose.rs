//! Microphone diagnostics: what the platform supports, and whether a trial
//! open actually gets through

use std::fmt;
use std::time::Duration;

use super::capture::CaptureError;
use super::encode::ChunkSink;
use super::input::{AudioInput, Capability, FormatRequest, SupportReport};

/// Outcome of the trial open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicrophoneAccess {
    Granted { sample_rate: u32 },
    Denied,
    Unavailable,
    Failed(String),
    /// No device to try
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub input: String,
    pub support: SupportReport,
    pub devices: Vec<String>,
    pub access: MicrophoneAccess,
}

impl DiagnosticReport {
    pub fn is_ready(&self) -> bool {
        self.support.is_supported() && matches!(self.access, MicrophoneAccess::Granted { .. })
    }
}

/// Check support, list devices and open the microphone once with its
/// default format, releasing it straight away
pub async fn diagnose(input: &dyn AudioInput) -> DiagnosticReport {
    let support = input.support();
    let devices = input.devices();

    let access = if support.media_devices {
        let (sink, _chunks) = ChunkSink::new(Duration::from_secs(1));
        match input.open(FormatRequest::DeviceDefault, sink).await {
            Ok(track) => {
                let sample_rate = track.sample_rate();
                track.release();
                MicrophoneAccess::Granted { sample_rate }
            }
            Err(CaptureError::PermissionDenied) => MicrophoneAccess::Denied,
            Err(CaptureError::DeviceUnavailable) => MicrophoneAccess::Unavailable,
            Err(e) => MicrophoneAccess::Failed(e.to_string()),
        }
    } else {
        MicrophoneAccess::Skipped
    };

    tracing::debug!(?support, ?access, "Diagnostics for {}", input.name());

    DiagnosticReport {
        input: input.name().to_string(),
        support,
        devices,
        access,
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Voice input diagnostics ({})", self.input)?;
        writeln!(f)?;

        for capability in Capability::ALL {
            if self.support.has(capability) {
                writeln!(f, "  {:<16} [ok]", capability.label())?;
            } else {
                writeln!(f, "  {:<16} [missing] {}", capability.label(), capability.describe())?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Input devices:")?;
        if self.devices.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for device in &self.devices {
            writeln!(f, "  - {}", device)?;
        }

        writeln!(f)?;
        let access = match &self.access {
            MicrophoneAccess::Granted { sample_rate } => format!("granted ({} Hz)", sample_rate),
            MicrophoneAccess::Denied => "denied, check the system microphone permissions".to_string(),
            MicrophoneAccess::Unavailable => "unavailable, the device could not be found".to_string(),
            MicrophoneAccess::Failed(reason) => format!("failed: {}", reason),
            MicrophoneAccess::Skipped => "not tested, no input device".to_string(),
        };
        writeln!(f, "Microphone access: {}", access)?;

        writeln!(f)?;
        match self.support.message() {
            Some(message) => write!(f, "Result: {}", message),
            None if self.is_ready() => write!(f, "Result: voice input ready"),
            None => write!(f, "Result: voice input unavailable, microphone could not be opened"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::capture::testing::FakeInput;

    #[tokio::test]
    async fn test_granted_microphone_is_released() {
        let mut input = FakeInput::new(vec![0.1; 160]);
        input.sample_rate = 48000;
        let counters = input.counters.clone();
        let requests = input.requests.clone();

        let report = diagnose(&input).await;

        assert_eq!(report.access, MicrophoneAccess::Granted { sample_rate: 48000 });
        assert!(report.is_ready());
        assert_eq!(counters.acquired(), 1);
        assert_eq!(counters.released(), 1);
        assert_eq!(*requests.lock().unwrap(), vec![FormatRequest::DeviceDefault]);

        let text = report.to_string();
        assert!(text.contains("input device     [ok]"));
        assert!(text.contains("  - Fake Microphone"));
        assert!(text.contains("Microphone access: granted (48000 Hz)"));
        assert!(text.ends_with("Result: voice input ready"));
    }

    #[tokio::test]
    async fn test_denied_permission_is_reported() {
        let input = FakeInput::new(vec![]).failing_with(vec![CaptureError::PermissionDenied]);

        let report = diagnose(&input).await;

        assert_eq!(report.access, MicrophoneAccess::Denied);
        assert!(!report.is_ready());
        let text = report.to_string();
        assert!(text.contains("Microphone access: denied"));
        assert!(text.contains("microphone could not be opened"));
    }

    #[tokio::test]
    async fn test_missing_encoder_names_the_capability() {
        let mut input = FakeInput::new(vec![]);
        input.report.encoder = false;

        let report = diagnose(&input).await;
        let text = report.to_string();

        assert!(text.contains(&format!(
            "sample encoder   [missing] {}",
            Capability::Encoder.describe()
        )));
        assert!(text.contains("stream capture   [ok]"));
        assert!(text.contains("Result: Voice input unavailable: "));
        assert!(!report.is_ready());
    }

    #[tokio::test]
    async fn test_no_device_skips_trial_open() {
        let mut input = FakeInput::new(vec![]);
        input.report.media_devices = false;
        input.devices.clear();
        let counters = input.counters.clone();

        let report = diagnose(&input).await;

        assert_eq!(report.access, MicrophoneAccess::Skipped);
        assert_eq!(counters.open_attempts(), 0);
        let text = report.to_string();
        assert!(text.contains("  (none)"));
        assert!(text.contains(Capability::MediaDevices.describe()));
    }
}
