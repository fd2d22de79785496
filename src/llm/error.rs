//! Upstream failure taxonomy and classification

use thiserror::Error;

use super::types::ApiErrorBody;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("API key for Gemini is missing. Please set GEMINI_API_KEY.")]
    MissingApiKey,
    #[error("API key rejected: {0}")]
    CredentialExpired(String),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("response blocked: {0}")]
    Blocked(String),
    #[error("empty response from model")]
    EmptyResponse,
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

/// Reasons Google attaches to `ErrorInfo` details for bad keys
const CREDENTIAL_REASONS: [&str; 3] = ["API_KEY_INVALID", "API_KEY_EXPIRED", "API_KEY_SERVICE_BLOCKED"];

/// Turn a non-success upstream reply into a typed error.
///
/// Structured fields win. The substring checks at the end only run when the
/// body isn't the documented error envelope, and will miss rephrased messages.
pub fn classify(status: u16, body: &str) -> LlmError {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorBody>(body) {
        let api = envelope.error;
        let message = api.message.clone();
        let has_reason = |wanted: &[&str]| {
            api.details
                .iter()
                .filter_map(|d| d.reason.as_deref())
                .any(|reason| wanted.contains(&reason))
        };

        if has_reason(&CREDENTIAL_REASONS) {
            return LlmError::CredentialExpired(message);
        }
        match api.status.as_deref() {
            Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED") => {
                return LlmError::CredentialExpired(message)
            }
            Some("RESOURCE_EXHAUSTED") => return LlmError::QuotaExceeded(message),
            Some("NOT_FOUND") => return LlmError::ModelNotFound(message),
            _ => {}
        }
        let code = if api.code != 0 { api.code } else { status };
        if let Some(err) = classify_status(code, &message) {
            return err;
        }
        return classify_text(code, message);
    }

    if let Some(err) = classify_status(status, body) {
        return err;
    }
    classify_text(status, body.trim().to_string())
}

fn classify_status(status: u16, message: &str) -> Option<LlmError> {
    match status {
        401 => Some(LlmError::CredentialExpired(message.to_string())),
        429 => Some(LlmError::QuotaExceeded(message.to_string())),
        _ => None,
    }
}

/// Last-resort substring matching on the error text
fn classify_text(status: u16, message: String) -> LlmError {
    let lower = message.to_lowercase();
    if message.contains("API_KEY_INVALID") || lower.contains("api key expired") || lower.contains("api key not valid") {
        LlmError::CredentialExpired(message)
    } else if lower.contains("quota") || lower.contains("rate limit") {
        LlmError::QuotaExceeded(message)
    } else if lower.contains("model not found") || lower.contains("is not found for api version") {
        LlmError::ModelNotFound(message)
    } else {
        LlmError::Upstream { status, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_reason_detects_bad_key() {
        let body = r#"{"error":{"code":400,"message":"API key expired. Please renew the API key.","status":"INVALID_ARGUMENT","details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID","domain":"googleapis.com"}]}}"#;
        assert!(matches!(classify(400, body), LlmError::CredentialExpired(m) if m.starts_with("API key expired")));
    }

    #[test]
    fn test_structured_status_resource_exhausted() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted (e.g. check quota).","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(classify(429, body), LlmError::QuotaExceeded(_)));
    }

    #[test]
    fn test_structured_not_found_is_model_error() {
        let body = r#"{"error":{"code":404,"message":"models/gemini-9 is not found for API version v1beta","status":"NOT_FOUND"}}"#;
        assert!(matches!(classify(404, body), LlmError::ModelNotFound(_)));
    }

    #[test]
    fn test_envelope_without_status_uses_code() {
        let body = r#"{"error":{"code":429,"message":"slow down"}}"#;
        assert!(matches!(classify(500, body), LlmError::QuotaExceeded(_)));
    }

    #[test]
    fn test_plain_text_fallback() {
        assert!(matches!(
            classify(400, "GoogleGenerativeAIError: API key expired"),
            LlmError::CredentialExpired(_)
        ));
        assert!(matches!(
            classify(500, "you exceeded your current quota"),
            LlmError::QuotaExceeded(_)
        ));
        assert!(matches!(classify(500, "Model not found"), LlmError::ModelNotFound(_)));
    }

    #[test]
    fn test_unrecognised_error_keeps_status() {
        assert_eq!(
            classify(502, "bad gateway"),
            LlmError::Upstream {
                status: 502,
                message: "bad gateway".to_string()
            }
        );
    }

    #[test]
    fn test_plain_401_is_credential_failure() {
        assert!(matches!(classify(401, ""), LlmError::CredentialExpired(_)));
    }
}
