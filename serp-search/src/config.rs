//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] fixes the provider priority order, result counts,
//! timeouts, and request pacing for a run. It is passed by reference into
//! every provider call; nothing in this crate reads global settings.

use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::types::Provider;

/// Base URLs for each provider. Overridable so tests can point adapters
/// at a local mock server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEndpoints {
    /// SearXNG instance root, e.g. `http://127.0.0.1:8888`.
    pub searxng: String,
    pub duckduckgo: String,
    pub bing: String,
    pub yahoo: String,
    pub kagi: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            searxng: "http://127.0.0.1:8888".into(),
            duckduckgo: "https://html.duckduckgo.com/html/".into(),
            bing: "https://www.bing.com/search".into(),
            yahoo: "https://search.yahoo.com/search".into(),
            kagi: "https://kagi.com/api/v0/search".into(),
        }
    }
}

/// Configuration for provider queries.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Provider priority order. Fixed for the whole run.
    pub providers: Vec<Provider>,
    /// How many raw results to request from each provider.
    pub num_results: usize,
    /// Per-call HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Random delay range in milliseconds `(min, max)` slept between
    /// provider calls to stay under rate limits.
    pub request_delay_ms: (u64, u64),
    /// Whether to request safe search from providers that support it.
    pub safe_search: bool,
    /// Custom User-Agent string. If `None`, rotates through a built-in list
    /// of realistic browser User-Agents.
    pub user_agent: Option<String>,
    pub endpoints: ProviderEndpoints,
    /// Kagi API token. Never serialised.
    #[serde(skip_serializing)]
    pub kagi_token: Option<String>,
    /// Consecutive failures before a provider is skipped for a cooldown.
    pub circuit_failure_threshold: u32,
    /// Seconds a tripped provider stays skipped before a trial call is allowed.
    pub circuit_cooldown_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers: vec![Provider::SearXng, Provider::DuckDuckGo, Provider::Bing],
            num_results: 20,
            timeout_seconds: 30,
            request_delay_ms: (2_000, 4_000),
            safe_search: false,
            user_agent: None,
            endpoints: ProviderEndpoints::default(),
            kagi_token: None,
            circuit_failure_threshold: 3,
            circuit_cooldown_secs: 300,
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("providers", &self.providers)
            .field("num_results", &self.num_results)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("request_delay_ms", &self.request_delay_ms)
            .field("safe_search", &self.safe_search)
            .field("user_agent", &self.user_agent)
            .field("endpoints", &self.endpoints)
            .field("kagi_token", &self.kagi_token.as_ref().map(|_| "<redacted>"))
            .field("circuit_failure_threshold", &self.circuit_failure_threshold)
            .field("circuit_cooldown_secs", &self.circuit_cooldown_secs)
            .finish()
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `providers` must not be empty and must not repeat a provider
    /// - `num_results` must be greater than 0
    /// - `timeout_seconds` must be greater than 0
    /// - `request_delay_ms.0` must be <= `request_delay_ms.1`
    /// - `circuit_failure_threshold` must be greater than 0
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.providers.is_empty() {
            return Err(SearchError::Config(
                "at least one provider must be configured".into(),
            ));
        }
        for (i, p) in self.providers.iter().enumerate() {
            if self.providers[..i].contains(p) {
                return Err(SearchError::Config(format!(
                    "provider {p} appears more than once in the priority list"
                )));
            }
        }
        if self.num_results == 0 {
            return Err(SearchError::Config(
                "num_results must be greater than 0".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(SearchError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.request_delay_ms.0 > self.request_delay_ms.1 {
            return Err(SearchError::Config(
                "request_delay_ms min must be <= max".into(),
            ));
        }
        if self.circuit_failure_threshold == 0 {
            return Err(SearchError::Config(
                "circuit_failure_threshold must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_values() {
        let config = SearchConfig::default();
        assert_eq!(config.num_results, 20);
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.request_delay_ms, (2_000, 4_000));
        assert!(config.user_agent.is_none());
        assert!(config.kagi_token.is_none());
    }

    #[test]
    fn default_priority_starts_with_meta_search() {
        let config = SearchConfig::default();
        assert_eq!(config.providers[0], Provider::SearXng);
        assert!(config.providers.len() >= 3);
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(SearchConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_providers_rejected() {
        let config = SearchConfig {
            providers: vec![],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("provider"));
    }

    #[test]
    fn duplicate_provider_rejected() {
        let config = SearchConfig {
            providers: vec![Provider::Bing, Provider::Yahoo, Provider::Bing],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn zero_num_results_rejected() {
        let config = SearchConfig {
            num_results: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("num_results"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = SearchConfig {
            timeout_seconds: 0,
            ..Default::default()
        };
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("timeout_seconds"));
    }

    #[test]
    fn invalid_delay_range_rejected() {
        let config = SearchConfig {
            request_delay_ms: (500, 100),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("delay"));
    }

    #[test]
    fn zero_delay_range_valid() {
        let config = SearchConfig {
            request_delay_ms: (0, 0),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_redacts_kagi_token() {
        let config = SearchConfig {
            kagi_token: Some("super-secret".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn kagi_token_never_serialised() {
        let config = SearchConfig {
            kagi_token: Some("super-secret".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"providers":["kagi","yahoo"],"num_results":5}"#)
                .expect("deserialize");
        assert_eq!(config.providers, vec![Provider::Kagi, Provider::Yahoo]);
        assert_eq!(config.num_results, 5);
        assert_eq!(config.timeout_seconds, 30);
    }
}
