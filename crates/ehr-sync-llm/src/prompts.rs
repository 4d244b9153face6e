//! Prompt template for diagnosis code suggestions.
//!
//! Output is kept short and near-deterministic: a small token budget and a
//! low temperature.

use crate::completion::{ChatMessage, CompletionRequest};
use crate::config::SuggestionConfig;

/// System instruction sent with every request.
pub const SYSTEM_PROMPT: &str = "You are a medical assistant that provide the ICD-10 diagnosis code followed by the name and nothing else for a given condition. Separate the code and name with a single space.";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Enough tokens for a code and a short name.
pub const DEFAULT_MAX_TOKENS: u32 = 20;

pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Build the completion request for a condition description.
pub fn build_request(condition: &str, config: &SuggestionConfig) -> CompletionRequest {
    CompletionRequest {
        model: config.model().to_string(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(condition.trim()),
        ],
        max_tokens: config.max_tokens(),
        temperature: config.temperature(),
    }
}
