use std::sync::Arc;

use crate::llm::LanguageModel;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn LanguageModel>,
}

impl AppState {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}
