//! Client for the relay's `/api/chat` endpoint

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONNECTION_TROUBLE: &str =
    "Sorry, I'm having trouble connecting right now. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("could not reach the assistant: {0}")]
    Connection(String),
    /// Relay reported a rejected upstream key; carries the operator message
    #[error("{0}")]
    CredentialExpired(String),
    #[error("assistant error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ChatError {
    /// Text shown in the transcript in place of an answer
    pub fn user_message(&self) -> String {
        match self {
            ChatError::CredentialExpired(message) => message.clone(),
            ChatError::Server { message, .. } if !message.is_empty() => message.clone(),
            _ => CONNECTION_TROUBLE.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    response: String,
    error: Option<String>,
}

/// Sends visitor text to the relay and returns the assistant's answer
#[derive(Clone)]
pub struct ChatSession {
    http: reqwest::Client,
    endpoint: String,
}

impl ChatSession {
    pub fn new(server_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/api/chat", server_url.trim_end_matches('/')),
        }
    }

    pub async fn send_user_text(&self, text: &str) -> Result<String, ChatError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&ChatRequest { message: text })
            .send()
            .await
            .map_err(|e| ChatError::Connection(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Connection(e.to_string()))?;

        let reply: ChatReply = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                ChatError::InvalidResponse(e.to_string())
            } else {
                ChatError::Server {
                    status: status.as_u16(),
                    message: String::new(),
                }
            }
        })?;

        if status.is_success() {
            return Ok(reply.response);
        }

        if status == StatusCode::UNAUTHORIZED && reply.error.as_deref() == Some("API_KEY_EXPIRED") {
            tracing::error!("Relay reports an expired LLM API key");
            return Err(ChatError::CredentialExpired(reply.response));
        }

        Err(ChatError::Server {
            status: status.as_u16(),
            message: reply.response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::post, Json, Router};

    async fn spawn_relay(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_send_user_text_returns_response() {
        let app = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<serde_json::Value>| async move {
                Json(serde_json::json!({
                    "response": format!("echo: {}", body["message"].as_str().unwrap())
                }))
            }),
        );
        let session = ChatSession::new(&spawn_relay(app).await);

        let reply = session.send_user_text("Can I get a scholarship?").await.unwrap();
        assert_eq!(reply, "echo: Can I get a scholarship?");
    }

    #[tokio::test]
    async fn test_expired_key_carries_operator_message() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async {
                (
                    AxumStatus::UNAUTHORIZED,
                    Json(serde_json::json!({
                        "response": "API key has expired. Please update the GEMINI_API_KEY.",
                        "error": "API_KEY_EXPIRED"
                    })),
                )
            }),
        );
        let session = ChatSession::new(&spawn_relay(app).await);

        let err = session.send_user_text("hi").await.unwrap_err();
        assert!(matches!(err, ChatError::CredentialExpired(_)));
        assert!(err.user_message().contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn test_server_error_shows_reply_text() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async {
                (
                    AxumStatus::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "response": "I'm sorry, I encountered an error. Please try again later."
                    })),
                )
            }),
        );
        let session = ChatSession::new(&spawn_relay(app).await);

        let err = session.send_user_text("hi").await.unwrap_err();
        assert_eq!(
            err,
            ChatError::Server {
                status: 500,
                message: "I'm sorry, I encountered an error. Please try again later.".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_connection_trouble() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let session = ChatSession::new(&format!("http://{}/", addr));
        let err = session.send_user_text("hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Connection(_)));
        assert_eq!(err.user_message(), CONNECTION_TROUBLE);
    }

    #[test]
    fn test_non_json_error_falls_back_to_generic_text() {
        let err = ChatError::Server {
            status: 502,
            message: String::new(),
        };
        assert_eq!(err.user_message(), CONNECTION_TROUBLE);
    }
}
