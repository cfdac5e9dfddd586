//! Configuration types for an experiment run.
//!
//! Loaded from a TOML file (every field optional) and then overlaid with
//! environment variables. Secrets come only from the environment and are
//! never serialised, so a config snapshot can be embedded in results.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serp_search::SearchConfig;

use crate::error::{HarnessError, Result};
use crate::retry::RetryPolicy;

/// Hugging Face API token.
pub const ENV_HF_TOKEN: &str = "HF_TOKEN";
/// Kagi API token.
pub const ENV_KAGI_TOKEN: &str = "KAGI_TOKEN";
/// SearXNG instance root URL.
pub const ENV_SEARXNG_URL: &str = "SEARXNG_URL";
/// Results directory override.
pub const ENV_RESULTS_DIR: &str = "SERP_RESULTS_DIR";

/// Top-level configuration for an experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Newline-delimited keyword list.
    pub keywords_file: PathBuf,
    /// Directory for run logs and exports.
    pub results_dir: PathBuf,
    /// Candidates passed to re-ranking and kept in records.
    pub top_n: usize,
    /// Provider chain settings.
    pub search: SearchConfig,
    /// Re-ranking model settings.
    pub rerank: RerankConfig,
    /// Comparison settings.
    pub comparison: ComparisonConfig,
    /// Run provenance settings.
    pub provenance: ProvenanceConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            keywords_file: PathBuf::from("keywords.txt"),
            results_dir: PathBuf::from("results"),
            top_n: 10,
            search: SearchConfig::default(),
            rerank: RerankConfig::default(),
            comparison: ComparisonConfig::default(),
            provenance: ProvenanceConfig::default(),
        }
    }
}

/// Which rank information the re-ranking prompt reveals.
///
/// This is an experimental variable and is recorded with every result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Treatment {
    /// Candidates listed in SERP order with their positions.
    #[default]
    ShowRank,
    /// Candidates listed alphabetically without positions.
    HideRank,
}

impl std::fmt::Display for Treatment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShowRank => f.write_str("show_rank"),
            Self::HideRank => f.write_str("hide_rank"),
        }
    }
}

/// Hosted text-generation settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Whether to re-rank at all. Disabled runs collect the traditional baseline.
    pub enabled: bool,
    /// Inference endpoint root; the model id is appended as a path.
    pub endpoint: String,
    /// Model identifier, recorded with every result.
    pub model: String,
    /// Rank-visibility treatment.
    pub treatment: Treatment,
    /// Generation length cap.
    pub max_new_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Per-call timeout in seconds.
    pub timeout_seconds: u64,
    /// Backoff policy for transient failures.
    pub retry: RetryPolicy,
    /// API token. Read from `HF_TOKEN`; never serialised.
    #[serde(skip_serializing)]
    pub hf_token: Option<String>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://router.huggingface.co/hf-inference/models".into(),
            model: "Qwen/Qwen3-32B-Instruct".into(),
            treatment: Treatment::ShowRank,
            max_new_tokens: 500,
            temperature: 0.1,
            timeout_seconds: 120,
            retry: RetryPolicy::default(),
            hf_token: None,
        }
    }
}

impl std::fmt::Debug for RerankConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RerankConfig")
            .field("enabled", &self.enabled)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("treatment", &self.treatment)
            .field("max_new_tokens", &self.max_new_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry", &self.retry)
            .field("hf_token", &self.hf_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Comparison settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Rank assigned to a domain absent from one side of a comparison.
    /// `0` means "worst observed rank + 1" for that keyword.
    pub not_ranked_rank: usize,
}

/// Network provenance lookup, done once per run invocation.
///
/// SERP rankings depend on where the query comes from, so the run header
/// records the public IP and its geolocation. Lookups are best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvenanceConfig {
    /// Whether to look up the public IP and location at all.
    pub network_lookup: bool,
    /// Plain-text "what is my IP" services, tried in order.
    pub ip_endpoints: Vec<String>,
    /// ip-api compatible geolocation root; the IP is appended as a path.
    pub geo_endpoint: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            network_lookup: true,
            ip_endpoints: vec![
                "https://api.ipify.org".into(),
                "https://ifconfig.me/ip".into(),
            ],
            geo_endpoint: "http://ip-api.com/json".into(),
            timeout_seconds: 5,
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| HarnessError::Config(format!("{}: {e}", path.display())))
    }

    /// Load from `path` (or defaults), apply the environment, and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup`. Empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get(ENV_HF_TOKEN) {
            self.rerank.hf_token = Some(token);
        }
        if let Some(token) = get(ENV_KAGI_TOKEN) {
            self.search.kagi_token = Some(token);
        }
        if let Some(url) = get(ENV_SEARXNG_URL) {
            self.search.endpoints.searxng = url;
        }
        if let Some(dir) = get(ENV_RESULTS_DIR) {
            self.results_dir = PathBuf::from(dir);
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(HarnessError::Config("top_n must be greater than 0".into()));
        }
        self.search
            .validate()
            .map_err(|e| HarnessError::Config(e.to_string()))?;

        let r = &self.rerank;
        if r.enabled {
            if r.endpoint.trim().is_empty() {
                return Err(HarnessError::Config(
                    "rerank.endpoint must be set when re-ranking is enabled".into(),
                ));
            }
            if r.model.trim().is_empty() {
                return Err(HarnessError::Config(
                    "rerank.model must be set when re-ranking is enabled".into(),
                ));
            }
            if r.timeout_seconds == 0 {
                return Err(HarnessError::Config(
                    "rerank.timeout_seconds must be greater than 0".into(),
                ));
            }
            if r.max_new_tokens == 0 {
                return Err(HarnessError::Config(
                    "rerank.max_new_tokens must be greater than 0".into(),
                ));
            }
            if !r.temperature.is_finite() || r.temperature < 0.0 {
                return Err(HarnessError::Config(
                    "rerank.temperature must be a non-negative number".into(),
                ));
            }
            if r.retry.backoff_multiplier < 1.0 {
                return Err(HarnessError::Config(
                    "rerank.retry.backoff_multiplier must be at least 1.0".into(),
                ));
            }
        }
        if self.provenance.network_lookup && self.provenance.timeout_seconds == 0 {
            return Err(HarnessError::Config(
                "provenance.timeout_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// A JSON snapshot of this configuration with secrets omitted.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
