//! Shared HTTP plumbing for provider adapters.
//!
//! Provides a configured [`reqwest::Client`] with browser-like headers,
//! cookie support, and rotating User-Agent strings, plus the mapping from
//! transport failures and HTTP statuses onto [`ProviderErrorKind`].

use crate::config::SearchConfig;
use crate::error::ProviderError;
use crate::types::Provider;
use rand::seq::SliceRandom;
use std::time::Duration;

/// Realistic browser User-Agent strings, rotated per request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
];

/// Longest error body excerpt carried into a [`ProviderError`] message.
const MAX_BODY_EXCERPT: usize = 200;

/// Build a [`reqwest::Client`] for one provider call.
///
/// The client has:
/// - Cookie store enabled (consent pages)
/// - Timeout from config
/// - Random User-Agent from built-in rotation list (or custom if configured)
/// - Brotli and gzip decompression
///
/// # Errors
///
/// Returns an `Unavailable` [`ProviderError`] if the client cannot be built.
pub fn build_client(
    provider: Provider,
    config: &SearchConfig,
) -> Result<reqwest::Client, ProviderError> {
    let ua = match config.user_agent {
        Some(ref custom) => custom.clone(),
        None => random_user_agent().to_owned(),
    };

    reqwest::Client::builder()
        .cookie_store(true)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| ProviderError::unavailable(provider, format!("failed to build HTTP client: {e}")))
}

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        // SAFETY: USER_AGENTS is a non-empty const array, choose only returns None on empty slices
        .unwrap_or(USER_AGENTS[0])
}

/// Map a transport-level failure (no HTTP status) onto a provider error.
pub fn transport_error(provider: Provider, err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(provider, format!("request timed out: {err}"))
    } else if err.is_decode() || err.is_body() {
        ProviderError::malformed(provider, format!("response body unreadable: {err}"))
    } else {
        ProviderError::unavailable(provider, format!("request failed: {err}"))
    }
}

/// Map a non-success HTTP status onto a provider error.
///
/// 429 and 403 are throttling/blocking; everything else (auth failures
/// included) means the backend cannot serve this run.
pub fn status_error(provider: Provider, status: reqwest::StatusCode, body: &str) -> ProviderError {
    let excerpt: String = body.chars().take(MAX_BODY_EXCERPT).collect();
    let code = status.as_u16();
    match code {
        403 | 429 => ProviderError::rate_limited(provider, format!("HTTP {code}: {excerpt}")),
        _ => ProviderError::unavailable(provider, format!("HTTP {code}: {excerpt}")),
    }
}

/// Check the status of `response` and read its body as text.
pub async fn read_text(
    provider: Provider,
    response: reqwest::Response,
) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, &e))?;
    if !status.is_success() {
        return Err(status_error(provider, status, &body));
    }
    tracing::trace!(%provider, bytes = body.len(), "response received");
    Ok(body)
}
