//! Yahoo: scraped fallback.
//!
//! Organic links sit under `div.algo h3 a` (older layouts use
//! `div.dd a.ac-algo`). Yahoo routes clicks through
//! `r.search.yahoo.com/.../RU=<encoded target>/RK=...`; the target is
//! unwrapped from the `RU=` segment. Any remaining link on a yahoo.com
//! host is internal navigation and is skipped.

use async_trait::async_trait;
use scraper::Html;
use url::Url;

use crate::config::SearchConfig;
use crate::error::ProviderError;
use crate::http;
use crate::provider::SearchProvider;
use crate::providers::{clean_text, selector};
use crate::types::{Provider, RawResult};

/// Yahoo HTML search scraper.
pub struct YahooProvider;

#[async_trait]
impl SearchProvider for YahooProvider {
    async fn fetch(
        &self,
        keyword: &str,
        top_n: usize,
        config: &SearchConfig,
    ) -> Result<Vec<RawResult>, ProviderError> {
        tracing::trace!(keyword, "Yahoo search");

        let client = http::build_client(Provider::Yahoo, config)?;
        let count = top_n.to_string();
        let vm = if config.safe_search { "r" } else { "p" };

        let response = client
            .get(&config.endpoints.yahoo)
            .query(&[("p", keyword), ("n", count.as_str()), ("vm", vm)])
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| http::transport_error(Provider::Yahoo, &e))?;

        let html = http::read_text(Provider::Yahoo, response).await?;
        parse_yahoo_html(&html, top_n)
    }

    fn provider(&self) -> Provider {
        Provider::Yahoo
    }
}

/// Resolve a Yahoo result link to its destination.
///
/// Returns `None` for yahoo-internal links and unparseable hrefs.
fn resolve_yahoo_link(href: &str) -> Option<String> {
    let parsed = Url::parse(href).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if !is_yahoo_host(&host) {
        return Some(href.to_string());
    }

    // r.search.yahoo.com/_ylt=.../RV=2/RE=.../RO=10/RU=https%3a%2f%2f.../RK=2/RS=...
    let path = parsed.path();
    let start = path.find("/RU=")? + "/RU=".len();
    let rest = &path[start..];
    let encoded = rest.split('/').next()?;
    let decoded = url::form_urlencoded::parse(format!("u={encoded}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())?;

    match Url::parse(&decoded) {
        Ok(target) if target.host_str().is_some_and(|h| !is_yahoo_host(h)) => Some(decoded),
        _ => None,
    }
}

fn is_yahoo_host(host: &str) -> bool {
    host == "yahoo.com" || host.ends_with(".yahoo.com")
}

/// Parse Yahoo HTML response into raw results.
///
/// Extracted as a separate function for testability with mock HTML.
pub(crate) fn parse_yahoo_html(html: &str, top_n: usize) -> Result<Vec<RawResult>, ProviderError> {
    let document = Html::parse_document(html);
    let p = Provider::Yahoo;

    let link_sel = selector(p, "div.algo h3 a, div.dd a.ac-algo")?;
    let container_sel = selector(p, "div.algo, div.dd")?;
    let snippet_sel = selector(p, "div.compText p, p.fz-ms")?;

    // Snippets live in the container next to the link; index them by the
    // link's href so each result picks up its own.
    let mut snippets = std::collections::HashMap::new();
    for container in document.select(&container_sel) {
        let href = container
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"));
        let snippet = container
            .select(&snippet_sel)
            .next()
            .map(|el| clean_text(el.text()));
        if let (Some(href), Some(snippet)) = (href, snippet) {
            snippets.entry(href.to_string()).or_insert(snippet);
        }
    }

    let mut results = Vec::new();

    for link in document.select(&link_sel) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(url) = resolve_yahoo_link(href) else {
            continue;
        };

        let title = clean_text(link.text());
        if title.is_empty() {
            continue;
        }

        results.push(RawResult {
            url,
            title,
            snippet: snippets.get(href).cloned().unwrap_or_default(),
            provider: p,
            position: results.len() + 1,
            engines: vec![],
            score: None,
        });

        if results.len() >= top_n {
            break;
        }
    }

    tracing::debug!(count = results.len(), "Yahoo results parsed");
    Ok(results)
}
