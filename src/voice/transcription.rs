//! Transcription backends: opaque audio in, text or a typed failure out

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::llm::{LanguageModel, LlmError};

use super::capture::AudioPayload;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptionError {
    /// Transport failure or timeout. Retryable.
    #[error("network error: {0}")]
    Network(String),
    /// Non-success status from the endpoint. Retryable when 5xx.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// 200 without the expected field
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("transcription service quota exceeded")]
    UpstreamQuotaExceeded,
    #[error("transcription service credentials rejected")]
    UpstreamCredentialExpired,
}

impl TranscriptionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TranscriptionError::Network(_) => true,
            TranscriptionError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            TranscriptionError::InvalidResponse(_) => "Could not transcribe audio.",
            TranscriptionError::UpstreamQuotaExceeded => {
                "Speech service is temporarily unavailable. Please try again later."
            }
            TranscriptionError::UpstreamCredentialExpired => {
                "Speech service is not configured correctly. Please contact the site operator."
            }
            TranscriptionError::Network(_) | TranscriptionError::Server { .. } => {
                "Failed to process speech. Please try again."
            }
        }
    }
}

impl From<LlmError> for TranscriptionError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MissingApiKey | LlmError::CredentialExpired(_) => {
                TranscriptionError::UpstreamCredentialExpired
            }
            LlmError::QuotaExceeded(_) => TranscriptionError::UpstreamQuotaExceeded,
            LlmError::Network(message) => TranscriptionError::Network(message),
            LlmError::EmptyResponse | LlmError::Blocked(_) => {
                TranscriptionError::InvalidResponse(err.to_string())
            }
            LlmError::ModelNotFound(message) => TranscriptionError::Server {
                status: 404,
                message,
            },
            LlmError::Upstream { status, message } => TranscriptionError::Server { status, message },
        }
    }
}

/// Anything that turns a finished recording into text.
///
/// No retries happen behind this trait; callers decide whether to re-upload.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, payload: AudioPayload) -> Result<String, TranscriptionError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpeechErrorResponse {
    error: Option<String>,
}

/// Uploads the payload as `multipart/form-data` to a speech endpoint
pub struct UploadTranscriber {
    client: reqwest::Client,
    endpoint: String,
}

impl UploadTranscriber {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Transcriber for UploadTranscriber {
    async fn transcribe(&self, payload: AudioPayload) -> Result<String, TranscriptionError> {
        let file_name = payload.file_name();
        let mime = payload.mime();
        let size = payload.len();

        let part = Part::bytes(payload.into_bytes())
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| TranscriptionError::Network(e.to_string()))?;
        let form = Form::new().part("audio", part);

        tracing::debug!("Uploading {} bytes of {} to {}", size, mime, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Network(e.to_string()))?;

        interpret_response(status, &body)
    }

    fn name(&self) -> &str {
        "upload"
    }
}

/// Map a speech endpoint reply onto text or the error taxonomy
fn interpret_response(status: StatusCode, body: &str) -> Result<String, TranscriptionError> {
    if status.is_success() {
        let parsed: SpeechResponse = serde_json::from_str(body)
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;
        return parsed
            .text
            .map(|text| text.trim().to_string())
            .ok_or_else(|| TranscriptionError::InvalidResponse("missing `text` field".into()));
    }

    let message = serde_json::from_str::<SpeechErrorResponse>(body)
        .ok()
        .and_then(|e| e.error)
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            Err(TranscriptionError::UpstreamQuotaExceeded)
        }
        StatusCode::UNAUTHORIZED => Err(TranscriptionError::UpstreamCredentialExpired),
        _ => Err(TranscriptionError::Server {
            status: status.as_u16(),
            message,
        }),
    }
}

/// Sends the audio inline to the LLM, skipping the relay
pub struct DirectTranscriber {
    model: Arc<dyn LanguageModel>,
}

impl DirectTranscriber {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Transcriber for DirectTranscriber {
    async fn transcribe(&self, payload: AudioPayload) -> Result<String, TranscriptionError> {
        let mime = payload.mime();
        let bytes = payload.into_bytes();
        let text = self.model.transcribe(&bytes, mime).await?;
        Ok(text.trim().to_string())
    }

    fn name(&self) -> &str {
        "direct"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Multipart, http::StatusCode as AxumStatus, routing::post, Json, Router};
    use std::time::Duration;

    async fn spawn_endpoint(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/speech", addr)
    }

    fn payload() -> AudioPayload {
        AudioPayload::new(vec![1, 2, 3, 4], "audio/wav", Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_upload_sends_audio_field() {
        let app = Router::new().route(
            "/api/speech",
            post(|mut multipart: Multipart| async move {
                let field = multipart.next_field().await.unwrap().unwrap();
                let name = field.name().unwrap().to_string();
                let file_name = field.file_name().unwrap().to_string();
                let data = field.bytes().await.unwrap();
                Json(serde_json::json!({
                    "text": format!("{} {} {}", name, file_name, data.len()),
                    "success": true
                }))
            }),
        );
        let endpoint = spawn_endpoint(app).await;

        let text = UploadTranscriber::new(endpoint).transcribe(payload()).await.unwrap();
        assert_eq!(text, "audio recording.wav 4");
    }

    #[tokio::test]
    async fn test_upload_maps_server_error() {
        let app = Router::new().route(
            "/api/speech",
            post(|| async {
                (
                    AxumStatus::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"error": "Failed to transcribe audio"})),
                )
            }),
        );
        let endpoint = spawn_endpoint(app).await;

        let err = UploadTranscriber::new(endpoint)
            .transcribe(payload())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TranscriptionError::Server {
                status: 500,
                message: "Failed to transcribe audio".into()
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_upload_unreachable_is_network_error() {
        // Bind then drop so the port is closed
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = UploadTranscriber::new(format!("http://{}/api/speech", addr))
            .transcribe(payload())
            .await
            .unwrap_err();
        assert!(matches!(err, TranscriptionError::Network(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_success_without_text_is_invalid() {
        let err = interpret_response(StatusCode::OK, r#"{"success":true}"#).unwrap_err();
        assert!(matches!(err, TranscriptionError::InvalidResponse(_)));
        assert!(!err.is_retryable());
        assert_eq!(err.user_message(), "Could not transcribe audio.");
    }

    #[test]
    fn test_success_with_garbage_body_is_invalid() {
        let err = interpret_response(StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, TranscriptionError::InvalidResponse(_)));
    }

    #[test]
    fn test_success_trims_text() {
        let text = interpret_response(StatusCode::OK, r#"{"text":"  hello \n","success":true}"#);
        assert_eq!(text, Ok("hello".to_string()));
    }

    #[test]
    fn test_quota_statuses() {
        for status in [StatusCode::TOO_MANY_REQUESTS, StatusCode::SERVICE_UNAVAILABLE] {
            assert_eq!(
                interpret_response(status, r#"{"error":"quota"}"#),
                Err(TranscriptionError::UpstreamQuotaExceeded)
            );
        }
    }

    #[test]
    fn test_client_error_is_not_retryable() {
        let err = interpret_response(StatusCode::BAD_REQUEST, r#"{"error":"Received empty audio blob"}"#)
            .unwrap_err();
        assert_eq!(
            err,
            TranscriptionError::Server {
                status: 400,
                message: "Received empty audio blob".into()
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_llm_error_mapping() {
        assert_eq!(
            TranscriptionError::from(LlmError::QuotaExceeded("429".into())),
            TranscriptionError::UpstreamQuotaExceeded
        );
        assert_eq!(
            TranscriptionError::from(LlmError::MissingApiKey),
            TranscriptionError::UpstreamCredentialExpired
        );
        assert!(matches!(
            TranscriptionError::from(LlmError::EmptyResponse),
            TranscriptionError::InvalidResponse(_)
        ));
    }
}
