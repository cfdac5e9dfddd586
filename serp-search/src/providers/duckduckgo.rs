//! DuckDuckGo: the most scraper-tolerant direct fallback.
//!
//! Uses the HTML-only endpoint at `https://html.duckduckgo.com/html/`,
//! which requires no JavaScript. When DuckDuckGo suspects automation it
//! answers `202 Accepted` with an anomaly page instead of results; that
//! is reported as `RATE_LIMITED`.

use async_trait::async_trait;
use reqwest::StatusCode;
use scraper::Html;
use url::Url;

use crate::config::SearchConfig;
use crate::error::ProviderError;
use crate::http;
use crate::provider::SearchProvider;
use crate::providers::{clean_text, selector};
use crate::types::{Provider, RawResult};

/// DuckDuckGo HTML scraper.
pub struct DuckDuckGoProvider;

impl DuckDuckGoProvider {
    /// Extract the actual URL from DuckDuckGo's redirect wrapper.
    ///
    /// DDG wraps URLs like: `//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=...`
    /// We parse out the `uddg` query parameter and URL-decode it.
    fn extract_url(href: &str) -> Option<String> {
        let full_href = if href.starts_with("//") {
            format!("https:{href}")
        } else {
            href.to_string()
        };

        let parsed = Url::parse(&full_href).ok()?;

        if parsed.host_str() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
            parsed
                .query_pairs()
                .find(|(key, _)| key == "uddg")
                .map(|(_, value)| value.into_owned())
        } else {
            Some(full_href)
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    async fn fetch(
        &self,
        keyword: &str,
        top_n: usize,
        config: &SearchConfig,
    ) -> Result<Vec<RawResult>, ProviderError> {
        tracing::trace!(keyword, "DuckDuckGo search");

        let client = http::build_client(Provider::DuckDuckGo, config)?;

        let mut params = vec![("q", keyword)];
        if config.safe_search {
            params.push(("kp", "1"));
        }

        let response = client
            .post(&config.endpoints.duckduckgo)
            .form(&params)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| http::transport_error(Provider::DuckDuckGo, &e))?;

        if response.status() == StatusCode::ACCEPTED {
            return Err(ProviderError::rate_limited(
                Provider::DuckDuckGo,
                "anomaly challenge (HTTP 202)",
            ));
        }

        let html = http::read_text(Provider::DuckDuckGo, response).await?;
        parse_duckduckgo_html(&html, top_n)
    }

    fn provider(&self) -> Provider {
        Provider::DuckDuckGo
    }
}

/// Parse DuckDuckGo HTML response into raw results.
///
/// Extracted as a separate function for testability with mock HTML.
pub(crate) fn parse_duckduckgo_html(
    html: &str,
    top_n: usize,
) -> Result<Vec<RawResult>, ProviderError> {
    let document = Html::parse_document(html);
    let p = Provider::DuckDuckGo;

    let result_sel = selector(
        p,
        ".result.results_links.results_links_deep:not(.result--ad), .web-result:not(.result--ad)",
    )?;
    let title_sel = selector(p, ".result__a")?;
    let snippet_sel = selector(p, ".result__snippet")?;
    let anomaly_sel = selector(p, ".anomaly-modal__title, #challenge-form")?;

    let mut results = Vec::new();

    for element in document.select(&result_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };

        let title = clean_text(title_el.text());
        if title.is_empty() {
            continue;
        }

        let Some(url) = title_el
            .value()
            .attr("href")
            .and_then(DuckDuckGoProvider::extract_url)
        else {
            continue;
        };

        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| clean_text(el.text()))
            .unwrap_or_default();

        results.push(RawResult {
            url,
            title,
            snippet,
            provider: p,
            position: results.len() + 1,
            engines: vec![],
            score: None,
        });

        if results.len() >= top_n {
            break;
        }
    }

    if results.is_empty() && document.select(&anomaly_sel).next().is_some() {
        return Err(ProviderError::rate_limited(p, "anomaly challenge page"));
    }

    tracing::debug!(count = results.len(), "DuckDuckGo results parsed");
    Ok(results)
}
