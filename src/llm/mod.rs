//! Hosted LLM integration (Gemini)

mod client;
mod error;
mod prompt;
mod types;

use async_trait::async_trait;

pub use client::GeminiClient;
pub use error::LlmError;
pub use prompt::COLLEGE_NAME;

/// What the rest of the crate needs from a language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Answer a single visitor question about the college
    async fn answer(&self, question: &str) -> Result<String, LlmError>;

    /// Transcribe an encoded audio clip
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, LlmError>;
}
