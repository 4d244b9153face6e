//! Suggestion service configuration, resolved once at startup.

use std::time::Duration;

use crate::completion::{SuggestionError, SuggestionResult};
use crate::prompts::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use crate::suggestion::SuggestionPolicy;

/// Default chat-completion endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "EHR_SUGGEST_MODEL";
pub const ENV_ENDPOINT: &str = "EHR_SUGGEST_ENDPOINT";
pub const ENV_POLICY: &str = "EHR_SUGGEST_POLICY";

/// Configuration for the suggestion gateway.
#[derive(Clone)]
pub struct SuggestionConfig {
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    policy: SuggestionPolicy,
    timeout: Duration,
}

impl std::fmt::Debug for SuggestionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SuggestionConfig {
    /// Defaults with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            policy: SuggestionPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Resolve from the environment. `OPENAI_API_KEY` is required.
    pub fn from_env() -> SuggestionResult<Self> {
        let api_key = std::env::var(ENV_API_KEY)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| SuggestionError::Config(format!("{} is not set", ENV_API_KEY)))?;

        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var(ENV_MODEL) {
            config = config.with_model(model);
        }
        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            config = config.with_endpoint(endpoint);
        }
        if let Ok(policy) = std::env::var(ENV_POLICY) {
            config = config.with_policy(policy.parse()?);
        }
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_policy(mut self, policy: SuggestionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn policy(&self) -> SuggestionPolicy {
        self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
