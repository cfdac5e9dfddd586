//! Error types for the serp-search crate.
//!
//! [`ProviderError`] is scoped to one provider call and is always
//! recoverable by falling back to the next provider. [`SearchError`] is
//! what the coordinator and normaliser surface to callers.

use serde::{Deserialize, Serialize};

use crate::types::{AttemptOutcome, Provider, ProviderAttempt};

/// Why a single provider call failed.
///
/// Codes are stable and end up in exported experiment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderErrorKind {
    /// Backend unreachable, misconfigured, or answered with a server error.
    Unavailable,
    /// The per-call timeout elapsed.
    Timeout,
    /// The backend throttled or blocked the request (429, 403, bot wall).
    RateLimited,
    /// The backend answered, but not in the shape the adapter expects.
    MalformedResponse,
}

impl ProviderErrorKind {
    /// Returns the stable SCREAMING_SNAKE_CASE code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::MalformedResponse => "MALFORMED_RESPONSE",
        }
    }
}

/// A failed call to one search provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{}] {}: {}", .kind.code(), .provider, .message)]
pub struct ProviderError {
    /// Which provider failed.
    pub provider: Provider,
    /// Failure classification.
    pub kind: ProviderErrorKind,
    /// Human-readable detail. Never contains tokens.
    pub message: String,
}

impl ProviderError {
    /// Create a provider error of the given kind.
    pub fn new(provider: Provider, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(provider: Provider, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Unavailable, message)
    }

    pub fn timeout(provider: Provider, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Timeout, message)
    }

    pub fn rate_limited(provider: Provider, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::RateLimited, message)
    }

    pub fn malformed(provider: Provider, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::MalformedResponse, message)
    }
}

/// Errors surfaced by the coordinator, the normaliser, and config validation.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Every configured provider failed or was skipped. Carries the full
    /// attempt log so callers can record each provider's reason.
    #[error("all providers failed: {}", summarize_attempts(.0))]
    AllProvidersFailed(Vec<ProviderAttempt>),

    /// Raw results violated the normaliser's input contract. Indicates an
    /// adapter bug rather than a runtime condition.
    #[error("normalization error: {0}")]
    Normalization(String),

    /// Invalid search configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for serp-search results.
pub type Result<T> = std::result::Result<T, SearchError>;

fn summarize_attempts(attempts: &[ProviderAttempt]) -> String {
    if attempts.is_empty() {
        return "no providers attempted".into();
    }
    attempts
        .iter()
        .map(|a| match &a.outcome {
            AttemptOutcome::Failed { kind, message } => {
                format!("{}: [{}] {message}", a.provider, kind.code())
            }
            AttemptOutcome::Skipped { reason } => format!("{}: skipped ({reason})", a.provider),
            AttemptOutcome::Empty => format!("{}: no results", a.provider),
            AttemptOutcome::Served { results } => format!("{}: {results} results", a.provider),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
