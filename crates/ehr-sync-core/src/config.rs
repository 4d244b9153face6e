//! Client configuration.
//!
//! Resolved once at startup and passed into the record client, so request
//! handling never reads process-wide environment variables.

use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

/// Default base URL of the record service.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable overriding the base URL.
pub const ENV_BASE_URL: &str = "EHR_API_BASE_URL";

/// Environment variable overriding the request timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "EHR_API_TIMEOUT_SECS";

/// Configuration errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Record service client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    base_url: String,
    request_timeout: Duration,
}

impl ClientConfig {
    /// Create a config, validating the base URL.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ConfigError> {
        let cleaned = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(cleaned).map_err(|e| ConfigError::InvalidBaseUrl {
            url: cleaned.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: cleaned.to_string(),
                reason: format!("scheme must be http or https, got {}", parsed.scheme()),
            });
        }

        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    /// Resolve from `EHR_API_BASE_URL` / `EHR_API_TIMEOUT_SECS`, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var(ENV_BASE_URL).unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let timeout = match std::env::var(ENV_TIMEOUT_SECS) {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidValue {
                    name: ENV_TIMEOUT_SECS.into(),
                    value: raw,
                })?,
            Err(_) => DEFAULT_TIMEOUT,
        };
        Self::new(&base_url, timeout)
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Build an absolute URL for a resource path such as `/patients/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_points_at_localhost() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint("/patients/"), "http://localhost:8000/patients/");
        assert_eq!(config.request_timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = ClientConfig::new("http://records.local:9000/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(config.endpoint("/patients/3"), "http://records.local:9000/patients/3");
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let err = ClientConfig::new("ftp://records.local", DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(ClientConfig::new("not a url", DEFAULT_TIMEOUT).is_err());
    }
}
