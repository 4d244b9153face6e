//! Chat-completion wire types and response parsing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suggestion errors.
#[derive(Error, Debug)]
pub enum SuggestionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Completion service error: {0}")]
    Service(String),

    #[error("Completion service returned no content")]
    Empty,

    #[error("No condition given")]
    EmptyCondition,

    #[error("Malformed suggestion: {0}")]
    Malformed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for SuggestionError {
    fn from(e: reqwest::Error) -> Self {
        SuggestionError::Transport(e.to_string())
    }
}

pub type SuggestionResult<T> = Result<T, SuggestionError>;

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Request body for the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Response body from the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Error object reported in the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceError {
    pub message: String,
}

/// Extract the first choice's content from a response body.
///
/// An `error` object takes precedence over any choices.
pub fn parse_completion(body: &str) -> SuggestionResult<String> {
    let response: CompletionResponse = serde_json::from_str(body)?;

    if let Some(error) = response.error {
        return Err(SuggestionError::Service(error.message));
    }

    let content = response
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or(SuggestionError::Empty)?;

    if content.is_empty() {
        return Err(SuggestionError::Empty);
    }
    Ok(content)
}
