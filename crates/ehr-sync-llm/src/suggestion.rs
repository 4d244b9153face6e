//! Suggestion gateway.
//!
//! One templated POST per suggestion. Failures are logged and reported as
//! "no suggestion"; callers never see a thrown fault.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::completion::{parse_completion, CompletionRequest, SuggestionError, SuggestionResult};
use crate::config::SuggestionConfig;
use crate::prompts::build_request;

/// What to do with model output that is not shaped like "CODE name".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuggestionPolicy {
    /// Return the trimmed text verbatim
    #[default]
    PassThrough,
    /// Reject text that does not start with an ICD-10 code and a label
    RequireCode,
}

impl FromStr for SuggestionPolicy {
    type Err = SuggestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pass-through" | "passthrough" => Ok(SuggestionPolicy::PassThrough),
            "require-code" => Ok(SuggestionPolicy::RequireCode),
            other => Err(SuggestionError::Config(format!(
                "unknown suggestion policy '{}'",
                other
            ))),
        }
    }
}

/// A suggested diagnosis, as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    text: String,
}

impl Suggestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The full suggestion text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// The leading ICD-10 code, if the text has the "CODE name" shape.
    pub fn code(&self) -> Option<&str> {
        self.split().map(|(code, _)| code)
    }

    /// The name following the code, if the text has the "CODE name" shape.
    pub fn label(&self) -> Option<&str> {
        self.split().map(|(_, label)| label)
    }

    pub fn has_code(&self) -> bool {
        self.split().is_some()
    }

    fn split(&self) -> Option<(&str, &str)> {
        let (code, rest) = self.text.split_once(char::is_whitespace)?;
        let label = rest.trim();
        if is_icd10_code(code) && !label.is_empty() {
            Some((code, label))
        } else {
            None
        }
    }
}

/// Check the ICD-10 code shape: letter, digit, alphanumeric, then an
/// optional dot with one to four alphanumerics (e.g. `E11`, `E11.9`, `C7A.010`).
pub fn is_icd10_code(code: &str) -> bool {
    let (category, subcategory) = match code.split_once('.') {
        Some((category, subcategory)) => (category, Some(subcategory)),
        None => (code, None),
    };

    let chars: Vec<char> = category.chars().collect();
    let category_ok = chars.len() == 3
        && chars[0].is_ascii_uppercase()
        && chars[1].is_ascii_digit()
        && (chars[2].is_ascii_digit() || chars[2].is_ascii_uppercase());

    let subcategory_ok = match subcategory {
        None => true,
        Some(sub) => {
            (1..=4).contains(&sub.len())
                && sub
                    .chars()
                    .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        }
    };

    category_ok && subcategory_ok
}

/// Transport for completion requests.
///
/// Returns the raw response body; the service reports its own errors in it.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> SuggestionResult<String>;
}

/// Completion client posting JSON with bearer-token auth.
pub struct HttpCompletionClient {
    http_client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpCompletionClient {
    pub fn new(config: &SuggestionConfig) -> SuggestionResult<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                SuggestionError::Transport(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint().to_string(),
            api_key: config.api_key().to_string(),
        })
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> SuggestionResult<String> {
        debug!("POST {} (model {})", self.endpoint, request.model);
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!("Completion response {}: {}", status, body);
        Ok(body)
    }
}

/// Mock client returning a canned body (for testing without the service).
pub struct MockCompletionClient {
    body: String,
    calls: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl MockCompletionClient {
    /// Respond with an arbitrary body.
    pub fn responding(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Respond with a single successful choice.
    pub fn with_content(content: &str) -> Self {
        let body = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        });
        Self::responding(body.to_string())
    }

    /// Respond with a service error.
    pub fn with_error(message: &str) -> Self {
        let body = serde_json::json!({ "error": { "message": message } });
        Self::responding(body.to_string())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> SuggestionResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());
        Ok(self.body.clone())
    }
}

/// Suggests diagnosis codes for free-text conditions.
pub struct SuggestionGateway<C: CompletionClient> {
    client: C,
    config: SuggestionConfig,
}

impl SuggestionGateway<HttpCompletionClient> {
    /// Gateway talking to the configured endpoint.
    pub fn http(config: SuggestionConfig) -> SuggestionResult<Self> {
        let client = HttpCompletionClient::new(&config)?;
        Ok(Self::new(client, config))
    }
}

impl<C: CompletionClient> SuggestionGateway<C> {
    pub fn new(client: C, config: SuggestionConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Ask for a suggestion, surfacing why none is available.
    pub async fn try_suggest(&self, condition: &str) -> SuggestionResult<Suggestion> {
        if condition.trim().is_empty() {
            return Err(SuggestionError::EmptyCondition);
        }

        let request = build_request(condition, &self.config);
        let body = self.client.complete(&request).await?;
        let suggestion = Suggestion::new(parse_completion(&body)?);

        if self.config.policy() == SuggestionPolicy::RequireCode && !suggestion.has_code() {
            return Err(SuggestionError::Malformed(suggestion.into_text()));
        }
        Ok(suggestion)
    }

    /// Ask for a suggestion. Absent means "no suggestion available".
    pub async fn suggest_diagnosis(&self, condition: &str) -> Option<String> {
        match self.try_suggest(condition).await {
            Ok(suggestion) => Some(suggestion.into_text()),
            Err(e) => {
                warn!("No diagnosis suggestion for '{}': {}", condition.trim(), e);
                None
            }
        }
    }
}
