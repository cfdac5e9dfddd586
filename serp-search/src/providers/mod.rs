//! Provider adapter implementations.
//!
//! Each module provides a struct implementing [`crate::provider::SearchProvider`]
//! for one backend: the SearXNG and Kagi JSON APIs, and HTML scraping of
//! DuckDuckGo, Bing, and Yahoo as direct fallbacks.

pub mod bing;
pub mod duckduckgo;
pub mod kagi;
pub mod searxng;
pub mod yahoo;

pub use bing::BingProvider;
pub use duckduckgo::DuckDuckGoProvider;
pub use kagi::KagiProvider;
pub use searxng::SearXngProvider;
pub use yahoo::YahooProvider;

use scraper::Selector;

use crate::error::ProviderError;
use crate::types::Provider;

/// Parse a CSS selector, reporting failure against `provider`.
pub(crate) fn selector(provider: Provider, css: &str) -> Result<Selector, ProviderError> {
    Selector::parse(css)
        .map_err(|e| ProviderError::malformed(provider, format!("invalid selector {css:?}: {e:?}")))
}

/// Collapse runs of whitespace in scraped text.
pub(crate) fn clean_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_collapses_whitespace() {
        let parts = ["  Hub", "Spot \n  CRM ", "\tsoftware"];
        assert_eq!(clean_text(parts.into_iter()), "HubSpot CRM software");
    }

    #[test]
    fn invalid_selector_is_malformed() {
        let err = selector(Provider::Bing, "li[[").unwrap_err();
        assert_eq!(err.kind, crate::error::ProviderErrorKind::MalformedResponse);
    }
}
