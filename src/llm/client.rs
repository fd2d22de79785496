//! HTTP client for the hosted Gemini API

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::LlmConfig;

use super::error::{classify, LlmError};
use super::prompt::{chat_request, transcription_request};
use super::types::{GenerateContentRequest, GenerateContentResponse};
use super::LanguageModel;

/// Explicitly constructed Gemini client; one per process, shared by `Arc`
pub struct GeminiClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl GeminiClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn generate(&self, request: &GenerateContentRequest) -> Result<String, LlmError> {
        let api_key = self.config.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = classify(status.as_u16(), &body);
            tracing::warn!("Gemini request failed with {}: {}", status, err);
            return Err(err);
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::Upstream {
                status: status.as_u16(),
                message: format!("unparseable response: {}", e),
            }
        })?;

        if let Some(reason) = parsed.block_reason() {
            return Err(LlmError::Blocked(reason.to_string()));
        }
        parsed.text().ok_or_else(|| {
            let finish_reason = parsed
                .candidates
                .first()
                .and_then(|c| c.finish_reason.as_deref())
                .unwrap_or("none");
            tracing::warn!("Gemini returned no text (finish reason: {})", finish_reason);
            LlmError::EmptyResponse
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn answer(&self, question: &str) -> Result<String, LlmError> {
        tracing::debug!("Answering question ({} chars) with {}", question.len(), self.config.model);
        self.generate(&chat_request(question)).await
    }

    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, LlmError> {
        tracing::debug!("Transcribing {} bytes of {}", audio.len(), mime_type);
        let request = transcription_request(mime_type, STANDARD.encode(audio));
        let text = self.generate(&request).await?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use std::time::Duration;

    async fn spawn_upstream(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1beta", addr)
    }

    fn config(api_base: String, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            api_key: api_key.map(str::to_string),
            model: "gemini-test".to_string(),
            api_base,
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_missing_key_fails_on_first_use() {
        let client = GeminiClient::new(config("http://127.0.0.1:9".to_string(), None)).unwrap();
        assert_eq!(client.answer("hello").await, Err(LlmError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_answer_reads_first_candidate() {
        let app = Router::new().route(
            "/v1beta/models/:action",
            post(
                |Path(action): Path<String>, headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(action, "gemini-test:generateContent");
                    assert_eq!(headers["x-goog-api-key"], "secret");
                    let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap().to_string();
                    assert!(prompt.ends_with("User question: Where is the campus?"));
                    Json(serde_json::json!({
                        "candidates": [{
                            "content": {"role": "model", "parts": [{"text": "In Thoothukudi"}, {"text": " district."}]},
                            "finishReason": "STOP"
                        }]
                    }))
                },
            ),
        );
        let base = spawn_upstream(app).await;
        let client = GeminiClient::new(config(base, Some("secret"))).unwrap();

        let answer = client.answer("Where is the campus?").await.unwrap();
        assert_eq!(answer, "In Thoothukudi district.");
    }

    #[tokio::test]
    async fn test_transcribe_sends_inline_audio() {
        let app = Router::new().route(
            "/v1beta/models/:action",
            post(|Json(body): Json<serde_json::Value>| async move {
                let inline = &body["contents"][0]["parts"][1]["inlineData"];
                assert_eq!(inline["mimeType"], "audio/wav");
                assert_eq!(inline["data"], "AQID");
                Json(serde_json::json!({
                    "candidates": [{"content": {"parts": [{"text": " What is the GPA requirement? \n"}]}}]
                }))
            }),
        );
        let base = spawn_upstream(app).await;
        let client = GeminiClient::new(config(base, Some("secret"))).unwrap();

        let text = client.transcribe(&[1, 2, 3], "audio/wav").await.unwrap();
        assert_eq!(text, "What is the GPA requirement?");
    }

    #[tokio::test]
    async fn test_expired_key_is_classified() {
        let app = Router::new().route(
            "/v1beta/models/:action",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": {
                            "code": 400,
                            "message": "API key expired. Please renew the API key.",
                            "status": "INVALID_ARGUMENT",
                            "details": [{"reason": "API_KEY_INVALID"}]
                        }
                    })),
                )
            }),
        );
        let base = spawn_upstream(app).await;
        let client = GeminiClient::new(config(base, Some("old"))).unwrap();

        let err = client.answer("hi").await.unwrap_err();
        assert!(matches!(err, LlmError::CredentialExpired(_)));
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_reported() {
        let app = Router::new().route(
            "/v1beta/models/:action",
            post(|| async {
                Json(serde_json::json!({
                    "candidates": [],
                    "promptFeedback": {"blockReason": "SAFETY"}
                }))
            }),
        );
        let base = spawn_upstream(app).await;
        let client = GeminiClient::new(config(base, Some("secret"))).unwrap();

        assert_eq!(
            client.answer("hi").await,
            Err(LlmError::Blocked("SAFETY".to_string()))
        );
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_response() {
        let app = Router::new().route(
            "/v1beta/models/:action",
            post(|| async { Json(serde_json::json!({"candidates": []})) }),
        );
        let base = spawn_upstream(app).await;
        let client = GeminiClient::new(config(base, Some("secret"))).unwrap();

        assert_eq!(client.answer("hi").await, Err(LlmError::EmptyResponse));
    }
}
