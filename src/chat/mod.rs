//! Chat-side collaborators: the relay client and the fixed widget content

mod session;

pub use session::{ChatError, ChatSession};

use crate::llm::COLLEGE_NAME;

/// Prompts offered before the visitor types anything
pub const SUGGESTED_QUESTIONS: [&str; 8] = [
    "What programs do you offer?",
    "How can I apply for admission?",
    "What are the eligibility criteria?",
    "What facilities do you have?",
    "Can I get a scholarship?",
    "What is the application deadline?",
    "Where is the campus located?",
    "Are there internship opportunities?",
];

pub fn welcome_message() -> String {
    format!(
        "Hi there! I'm {}'s AI assistant. How can I help you with information about our \
         programs, admissions, facilities, or other inquiries?",
        COLLEGE_NAME
    )
}
