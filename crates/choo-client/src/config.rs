//! Collaborator service configuration.
//!
//! Base URLs for each service the train talks to. Defaults point at local
//! development ports. Override via environment variables or explicit
//! construction for staging/testing.

use url::Url;
use zeroize::Zeroizing;

/// Configuration for connecting to collaborator services.
///
/// Custom `Debug` implementation redacts the `api_token` field
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct ClientConfig {
    /// Contract gateway (ticket ids, transfers, metadata writes).
    /// Default: <http://127.0.0.1:8545>
    pub contract_url: Url,
    /// Ticket artwork generator and pinning service.
    pub generator_url: Url,
    /// Social identity lookup.
    pub identity_url: Url,
    /// Announcement (cast) service.
    pub announcer_url: Url,
    /// Bearer token sent to every service. Zeroized on drop.
    pub api_token: Zeroizing<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("contract_url", &self.contract_url)
            .field("generator_url", &self.generator_url)
            .field("identity_url", &self.identity_url)
            .field("announcer_url", &self.announcer_url)
            .field("api_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `CHOO_CONTRACT_URL` (default: `http://127.0.0.1:8545`)
    /// - `CHOO_GENERATOR_URL` (default: `http://127.0.0.1:8601`)
    /// - `CHOO_IDENTITY_URL` (default: `http://127.0.0.1:8602`)
    /// - `CHOO_ANNOUNCER_URL` (default: `http://127.0.0.1:8603`)
    /// - `CHOO_API_TOKEN` (required)
    /// - `CHOO_HTTP_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_token = std::env::var("CHOO_API_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        Ok(Self {
            contract_url: env_url("CHOO_CONTRACT_URL", "http://127.0.0.1:8545")?,
            generator_url: env_url("CHOO_GENERATOR_URL", "http://127.0.0.1:8601")?,
            identity_url: env_url("CHOO_IDENTITY_URL", "http://127.0.0.1:8602")?,
            announcer_url: env_url("CHOO_ANNOUNCER_URL", "http://127.0.0.1:8603")?,
            api_token: Zeroizing::new(api_token),
            timeout_secs: std::env::var("CHOO_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }

    /// Point every service at the same base URL (one mock server in tests).
    pub fn single_host(base: &str, token: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(base)
            .map_err(|e| ConfigError::InvalidUrl(base.to_string(), e.to_string()))?;
        Ok(Self {
            contract_url: url.clone(),
            generator_url: url.clone(),
            identity_url: url.clone(),
            announcer_url: url,
            api_token: Zeroizing::new(token.to_string()),
            timeout_secs: 5,
        })
    }
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CHOO_API_TOKEN environment variable is required")]
    MissingToken,
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_host_builds_valid_config() {
        let cfg = ClientConfig::single_host("http://127.0.0.1:9000", "test-token").unwrap();
        assert_eq!(cfg.api_token.as_str(), "test-token");
        assert_eq!(cfg.timeout_secs, 5);
        assert_eq!(cfg.contract_url.as_str(), "http://127.0.0.1:9000/");
        assert_eq!(cfg.announcer_url, cfg.identity_url);
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = ClientConfig::single_host("http://127.0.0.1:9000", "s3cret").unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn env_url_uses_default_when_var_absent() {
        let url = env_url("CHOO_NONEXISTENT_VAR_12345", "https://example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn env_url_rejects_invalid_url() {
        std::env::set_var("CHOO_TEST_BAD_URL", "not a url");
        let result = env_url("CHOO_TEST_BAD_URL", "https://example.com");
        std::env::remove_var("CHOO_TEST_BAD_URL");
        assert!(result.is_err());
    }
}
