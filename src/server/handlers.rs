use axum::{
    extract::{rejection::JsonRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::routes::{COEP_VALUE, COOP_VALUE};
use super::state::AppState;
use crate::llm::LlmError;

// ============================================================================
// Request/Response Types
// ============================================================================

pub const API_KEY_EXPIRED: &str = "API_KEY_EXPIRED";
pub const API_KEY_MISSING: &str = "API_KEY_MISSING";

const GENERIC_REPLY: &str = "I'm sorry, I encountered an error. Please try again later.";
const EXPIRED_KEY_REPLY: &str = "API key has expired. Please update the GEMINI_API_KEY in your \
     environment with a valid key from Google AI Studio.";
const MISSING_KEY_REPLY: &str =
    "The assistant is not configured yet. Please set GEMINI_API_KEY and restart the server.";
const UNAVAILABLE_REPLY: &str =
    "The assistant service is temporarily unavailable. Please try again in a few minutes.";
const MODEL_REPLY: &str = "The selected Gemini model is not available. Please configure a \
     currently available Gemini model.";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SpeechResponse {
    pub text: String,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

fn chat_reply(status: StatusCode, response: &str, error: Option<&'static str>) -> Response {
    (
        status,
        Json(ChatResponse {
            response: response.to_string(),
            error,
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

fn message_required() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(MessageResponse {
            message: "Message is required".to_string(),
        }),
    )
        .into_response()
}

/// POST /api/chat
/// Answer one visitor question
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!("Unreadable chat request: {}", rejection.body_text());
            return message_required();
        }
    };

    let message = req.message.as_deref().map(str::trim).unwrap_or_default();
    if message.is_empty() {
        return message_required();
    }

    info!("Chat request ({} chars)", message.len());

    match state.llm.answer(message).await {
        Ok(response) => chat_reply(StatusCode::OK, &response, None),
        Err(LlmError::CredentialExpired(detail)) => {
            error!("Upstream rejected the API key: {}", detail);
            chat_reply(StatusCode::UNAUTHORIZED, EXPIRED_KEY_REPLY, Some(API_KEY_EXPIRED))
        }
        Err(LlmError::MissingApiKey) => {
            error!("GEMINI_API_KEY is not set");
            chat_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                MISSING_KEY_REPLY,
                Some(API_KEY_MISSING),
            )
        }
        Err(LlmError::QuotaExceeded(detail)) => {
            warn!("Upstream quota exceeded: {}", detail);
            chat_reply(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_REPLY, None)
        }
        Err(LlmError::ModelNotFound(detail)) => {
            error!("Configured model unavailable: {}", detail);
            chat_reply(StatusCode::INTERNAL_SERVER_ERROR, MODEL_REPLY, None)
        }
        Err(e) => {
            error!("Chat request failed: {}", e);
            chat_reply(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_REPLY, None)
        }
    }
}

/// POST /api/speech
/// Transcribe the `audio` field of a multipart upload
pub async fn speech(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut audio = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("audio") => {
                let mime = field.content_type().unwrap_or("audio/wav").to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        audio = Some((bytes, mime));
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read audio field: {}", e);
                        return error_response(StatusCode::BAD_REQUEST, "Failed to read audio data");
                    }
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return error_response(StatusCode::BAD_REQUEST, "Malformed multipart body");
            }
        }
    }

    let Some((bytes, mime)) = audio else {
        error!("No audio data provided in request");
        return error_response(StatusCode::BAD_REQUEST, "No audio data provided");
    };

    info!("Received audio: {}, {} bytes", mime, bytes.len());

    if bytes.is_empty() {
        error!("Received empty audio blob");
        return error_response(StatusCode::BAD_REQUEST, "Received empty audio blob");
    }

    match state.llm.transcribe(&bytes, &mime).await {
        Ok(text) => {
            info!("Transcribed {} chars", text.len());
            (StatusCode::OK, Json(SpeechResponse { text, success: true })).into_response()
        }
        Err(LlmError::QuotaExceeded(detail)) => {
            warn!("Upstream quota exceeded: {}", detail);
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Speech service temporarily unavailable")
        }
        Err(e @ (LlmError::CredentialExpired(_) | LlmError::MissingApiKey)) => {
            error!("Transcription credentials problem: {}", e);
            error_response(StatusCode::UNAUTHORIZED, "Speech service credentials are invalid")
        }
        Err(e) => {
            error!("Error transcribing audio: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to transcribe audio")
        }
    }
}

/// GET /api/check-cors
/// Confirms the isolation headers the browser needs for audio capture
pub async fn check_cors() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "CORS headers check successful",
        "headers": {
            "Cross-Origin-Opener-Policy": COOP_VALUE,
            "Cross-Origin-Embedder-Policy": COEP_VALUE,
            "Permissions-Policy": "microphone=*, camera=*"
        }
    }))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
