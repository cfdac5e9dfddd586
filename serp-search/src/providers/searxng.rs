//! SearXNG meta-search aggregator, the primary provider.
//!
//! Queries `GET {base}/search?q=…&format=json&categories=general` and
//! validates the JSON body against [`SearxResponse`]. The instance must
//! have the JSON output format enabled; instances that refuse it answer
//! 403, which maps to `RATE_LIMITED` like any other block.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SearchConfig;
use crate::error::ProviderError;
use crate::http;
use crate::provider::SearchProvider;
use crate::types::{Provider, RawResult};

/// SearXNG JSON API adapter.
pub struct SearXngProvider;

/// Expected shape of a SearXNG JSON response. Only `results` is required.
#[derive(Debug, Deserialize)]
struct SearxResponse {
    results: Vec<SearxItem>,
}

#[derive(Debug, Deserialize)]
struct SearxItem {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    engines: Vec<String>,
    #[serde(default)]
    score: Option<f64>,
}

#[async_trait]
impl SearchProvider for SearXngProvider {
    async fn fetch(
        &self,
        keyword: &str,
        top_n: usize,
        config: &SearchConfig,
    ) -> Result<Vec<RawResult>, ProviderError> {
        tracing::trace!(keyword, "SearXNG search");

        let client = http::build_client(Provider::SearXng, config)?;
        let url = format!("{}/search", config.endpoints.searxng.trim_end_matches('/'));
        let safesearch = if config.safe_search { "1" } else { "0" };

        let response = client
            .get(&url)
            .query(&[
                ("q", keyword),
                ("format", "json"),
                ("categories", "general"),
                ("safesearch", safesearch),
            ])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| http::transport_error(Provider::SearXng, &e))?;

        let body = http::read_text(Provider::SearXng, response).await?;
        parse_searxng_json(&body, top_n)
    }

    fn provider(&self) -> Provider {
        Provider::SearXng
    }
}

/// Parse a SearXNG JSON body into raw results.
///
/// `position` is the item's 1-based index in SearXNG's own result list,
/// so an item without a URL leaves a gap rather than shifting later
/// results up. `top_n` bounds the provider positions considered.
pub(crate) fn parse_searxng_json(body: &str, top_n: usize) -> Result<Vec<RawResult>, ProviderError> {
    let parsed: SearxResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::malformed(Provider::SearXng, format!("unexpected JSON shape: {e}"))
    })?;

    let results: Vec<RawResult> = parsed
        .results
        .into_iter()
        .take(top_n)
        .enumerate()
        .filter_map(|(i, item)| {
            let url = item.url.filter(|u| !u.trim().is_empty())?;
            Some(RawResult {
                url,
                title: item.title.trim().to_string(),
                snippet: item.content.trim().to_string(),
                provider: Provider::SearXng,
                position: i + 1,
                engines: item.engines,
                score: item.score,
            })
        })
        .collect();

    tracing::debug!(count = results.len(), "SearXNG results parsed");
    Ok(results)
}
