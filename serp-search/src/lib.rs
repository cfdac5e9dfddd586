//! # serp-search
//!
//! Search-engine ranking collection for serp-rerank.
//!
//! This crate queries one search backend at a time through a fixed priority
//! chain and turns whatever ranking it returns into a dense, deduplicated
//! list of registrable domains. It compiles into the serp-rerank binary as
//! a library dependency.
//!
//! ## Design
//!
//! - SearXNG (JSON API) first, then direct HTML scraping of DuckDuckGo,
//!   Bing, and Yahoo; Kagi's API when a token is configured
//! - Sequential fallback: the first provider with a non-empty answer wins
//! - Per-provider circuit breaker owned by the coordinator
//! - User-Agent rotation and jittered pacing between calls
//! - Normalisation to public-suffix-plus-one-label domains, best raw
//!   position kept, ranks re-assigned densely from 1
//!
//! ## Security
//!
//! - The Kagi token is never serialised or printed in `Debug` output
//! - Keywords are logged at debug level, raw pages only at trace level
//! - No network listeners; this is a library, not a server

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod fallback;
pub mod http;
pub mod normalize;
pub mod provider;
pub mod providers;
pub mod types;

pub use config::{ProviderEndpoints, SearchConfig};
pub use error::{ProviderError, ProviderErrorKind, Result, SearchError};
pub use fallback::{FallbackCoordinator, SearchOutcome};
pub use normalize::{normalize, registrable_domain, truncate};
pub use provider::SearchProvider;
pub use types::{
    AttemptOutcome, CanonicalDomain, Provider, ProviderAttempt, RankedCandidate, RawResult,
};

/// Version of this crate, recorded in run provenance.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Search `keyword` through the configured provider chain and normalise
/// the serving provider's results into at most `top_n` ranked domains.
///
/// Convenience wrapper for one-off lookups. Long runs should hold a
/// [`FallbackCoordinator`] so circuit state and pacing carry across
/// keywords.
///
/// # Errors
///
/// Returns [`SearchError::Config`] for an invalid configuration,
/// [`SearchError::AllProvidersFailed`] if no provider could answer, or
/// [`SearchError::Normalization`] if an adapter produced invalid positions.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> serp_search::Result<()> {
/// let config = serp_search::SearchConfig::default();
/// let (outcome, ranked) = serp_search::search_ranked("crm software", 10, &config).await?;
/// println!("served by {}", outcome.provider_used);
/// for c in &ranked {
///     println!("{}. {}", c.rank, c.domain);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn search_ranked(
    keyword: &str,
    top_n: usize,
    config: &SearchConfig,
) -> Result<(SearchOutcome, Vec<RankedCandidate>)> {
    let coordinator = FallbackCoordinator::new(config.clone())?;
    let outcome = coordinator.search(keyword, config.num_results).await?;
    let ranked = truncate(normalize(keyword, &outcome.results)?, top_n);
    Ok((outcome, ranked))
}
