//! Trait definition for pluggable search provider adapters.
//!
//! Each backend (SearXNG, DuckDuckGo, Bing, Yahoo, Kagi) implements
//! [`SearchProvider`] to provide a uniform `fetch` over its own wire
//! format. Adapters talk to exactly one backend, never retry, and keep no
//! mutable state; fallback is the coordinator's job.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SearchConfig;
use crate::error::ProviderError;
use crate::providers::{BingProvider, DuckDuckGoProvider, KagiProvider, SearXngProvider, YahooProvider};
use crate::types::{Provider, RawResult};

/// A pluggable search backend.
///
/// Implementors query one backend and return its results as
/// [`RawResult`] values, in the backend's order, with 1-based positions.
/// Each implementation handles its own:
///
/// - URL construction with query encoding
/// - HTTP request with appropriate headers
/// - Response validation (JSON shape or HTML selectors)
/// - Mapping of failures onto [`ProviderError`] kinds
///
/// All implementations must be `Send + Sync` so the coordinator can hold
/// them behind `Arc<dyn SearchProvider>`.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Query the backend for `keyword`, returning at most `top_n` results.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the backend is unreachable, times out,
    /// throttles the request, or answers in an unexpected shape.
    async fn fetch(
        &self,
        keyword: &str,
        top_n: usize,
        config: &SearchConfig,
    ) -> Result<Vec<RawResult>, ProviderError>;

    /// Returns which [`Provider`] this implementation represents.
    fn provider(&self) -> Provider;
}

/// Build the built-in adapter for `provider`.
pub fn adapter_for(provider: Provider) -> Arc<dyn SearchProvider> {
    match provider {
        Provider::SearXng => Arc::new(SearXngProvider),
        Provider::DuckDuckGo => Arc::new(DuckDuckGoProvider),
        Provider::Bing => Arc::new(BingProvider),
        Provider::Yahoo => Arc::new(YahooProvider),
        Provider::Kagi => Arc::new(KagiProvider),
    }
}
