//! Runtime configuration assembled from CLI flags and the environment

use std::time::Duration;

use clap::ValueEnum;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Environment variables checked for the LLM key, in priority order
const API_KEY_VARS: [&str; 2] = ["NEXT_PUBLIC_GEMINI_API_KEY", "GEMINI_API_KEY"];

/// Which transcription backend the voice controller talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Multipart upload to the relay server's `/api/speech`
    Upload,
    /// Inline audio sent straight to the LLM API
    Direct,
}

/// Hosted LLM settings. Constructed once and passed to whoever needs a client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Missing keys are tolerated here and reported on first use
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl LlmConfig {
    pub fn from_env(model: impl Into<String>) -> Self {
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());

        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; LLM requests will fail until it is");
        }

        Self {
            api_key,
            model: model.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Voice pipeline settings
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub backend: BackendKind,
    /// Base URL of the relay server (used by the upload backend)
    pub server_url: String,
    pub transcribe_timeout: Duration,
    /// How often the capture track hands a chunk to the session
    pub chunk_interval: Duration,
    /// Sample rate the payload is encoded at
    pub target_sample_rate: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Upload,
            server_url: DEFAULT_SERVER_URL.to_string(),
            transcribe_timeout: Duration::from_secs(15),
            chunk_interval: Duration::from_millis(1000),
            target_sample_rate: 16000,
        }
    }
}

impl VoiceConfig {
    pub fn speech_endpoint(&self) -> String {
        format!("{}/api/speech", self.server_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_defaults() {
        let config = VoiceConfig::default();
        assert_eq!(config.backend, BackendKind::Upload);
        assert_eq!(config.transcribe_timeout, Duration::from_secs(15));
        assert_eq!(config.chunk_interval, Duration::from_secs(1));
        assert_eq!(config.target_sample_rate, 16000);
    }

    #[test]
    fn test_speech_endpoint_trims_trailing_slash() {
        let config = VoiceConfig {
            server_url: "http://localhost:3000/".to_string(),
            ..VoiceConfig::default()
        };
        assert_eq!(config.speech_endpoint(), "http://localhost:3000/api/speech");
    }
}
