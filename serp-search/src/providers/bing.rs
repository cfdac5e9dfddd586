//! Bing: scraped fallback over Microsoft's index.
//!
//! Bing often wraps result links in a click-tracking redirect
//! (`https://www.bing.com/ck/a?...&u=a1<base64url>`); the target URL is
//! recovered from the `u` parameter.

use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use scraper::Html;
use url::Url;

use crate::config::SearchConfig;
use crate::error::ProviderError;
use crate::http;
use crate::provider::SearchProvider;
use crate::providers::{clean_text, selector};
use crate::types::{Provider, RawResult};

/// Bing HTML search scraper.
pub struct BingProvider;

#[async_trait]
impl SearchProvider for BingProvider {
    async fn fetch(
        &self,
        keyword: &str,
        top_n: usize,
        config: &SearchConfig,
    ) -> Result<Vec<RawResult>, ProviderError> {
        tracing::trace!(keyword, "Bing search");

        let client = http::build_client(Provider::Bing, config)?;

        let safesearch_val = if config.safe_search { "Strict" } else { "Off" };
        let count = top_n.min(50).to_string();

        let response = client
            .get(&config.endpoints.bing)
            .query(&[
                ("q", keyword),
                ("setlang", "en"),
                ("count", count.as_str()),
                ("safeSearch", safesearch_val),
            ])
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| http::transport_error(Provider::Bing, &e))?;

        let html = http::read_text(Provider::Bing, response).await?;
        parse_bing_html(&html, top_n)
    }

    fn provider(&self) -> Provider {
        Provider::Bing
    }
}

/// Recover the destination of a Bing click-tracking link.
///
/// Non-redirect links are returned unchanged. Returns `None` when a
/// redirect carries no decodable target.
fn unwrap_bing_redirect(href: &str) -> Option<String> {
    let Ok(parsed) = Url::parse(href) else {
        return Some(href.to_string());
    };
    let is_redirect = parsed
        .host_str()
        .is_some_and(|h| h.ends_with("bing.com"))
        && parsed.path().starts_with("/ck/");
    if !is_redirect {
        return Some(href.to_string());
    }

    let encoded = parsed
        .query_pairs()
        .find(|(k, _)| k == "u")
        .map(|(_, v)| v.into_owned())?;
    // The payload is prefixed with a two-character scheme marker ("a1").
    let payload = encoded.get(2..)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(payload))
        .ok()?;
    String::from_utf8(bytes).ok()
}

/// Parse Bing HTML response into raw results.
///
/// Extracted as a separate function for testability with mock HTML.
pub(crate) fn parse_bing_html(html: &str, top_n: usize) -> Result<Vec<RawResult>, ProviderError> {
    let document = Html::parse_document(html);
    let p = Provider::Bing;

    // Bing uses li.b_algo containers for organic search results
    let result_sel = selector(p, "li.b_algo")?;
    let title_sel = selector(p, "h2")?;
    let link_sel = selector(p, "a")?;
    let snippet_sel = selector(p, ".b_caption p, .b_lineclamp2")?;

    let mut results = Vec::new();

    for element in document.select(&result_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };

        let title = clean_text(title_el.text());
        if title.is_empty() {
            continue;
        }

        let url = title_el
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(unwrap_bing_redirect);

        let url = match url {
            Some(u) if !u.is_empty() => u,
            _ => continue,
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

    tracing::debug!(count = results.len(), "Bing results parsed");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bing_redirect_for(target: &str) -> String {
        format!(
            "https://www.bing.com/ck/a?!&amp;&amp;p=abc&amp;u=a1{}&amp;ntb=1",
            URL_SAFE_NO_PAD.encode(target)
        )
    }

    fn mock_html() -> String {
        format!(
            r#"<html><body><ol id="b_results">
<li class="b_algo">
    <h2><a href="{}">Zoho CRM</a></h2>
    <div class="b_caption"><p>Zoho CRM is an online sales CRM.</p></div>
</li>
<li class="b_algo">
    <h2><a href="https://www.pipedrive.com/en">Pipedrive</a></h2>
    <p class="b_lineclamp2">Sales pipeline software.</p>
</li>
<li class="b_algo"><h2></h2></li>
<li class="b_ad"><h2><a href="https://ad.example.com">Ad</a></h2></li>
</ol></body></html>"#,
            bing_redirect_for("https://www.zoho.com/crm/")
        )
    }

    #[test]
    fn unwraps_click_tracking_redirect() {
        let href = format!(
            "https://www.bing.com/ck/a?p=abc&u=a1{}&ntb=1",
            URL_SAFE_NO_PAD.encode("https://www.zoho.com/crm/")
        );
        assert_eq!(
            unwrap_bing_redirect(&href).as_deref(),
            Some("https://www.zoho.com/crm/")
        );
    }

    #[test]
    fn direct_links_pass_through() {
        assert_eq!(
            unwrap_bing_redirect("https://www.pipedrive.com/en").as_deref(),
            Some("https://www.pipedrive.com/en")
        );
    }

    #[test]
    fn redirect_without_target_is_dropped() {
        assert!(unwrap_bing_redirect("https://www.bing.com/ck/a?p=abc").is_none());
    }

    #[test]
    fn parse_mock_html_returns_organic_results() {
        let results = parse_bing_html(&mock_html(), 10).expect("should parse");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://www.zoho.com/crm/");
        assert_eq!(results[0].title, "Zoho CRM");
        assert!(results[0].snippet.contains("online sales CRM"));
        assert_eq!(results[1].position, 2);
        assert_eq!(results[1].snippet, "Sales pipeline software.");
    }

    #[test]
    fn parse_respects_top_n() {
        let results = parse_bing_html(&mock_html(), 1).expect("should parse");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn provider_is_bing() {
        assert_eq!(BingProvider.provider(), Provider::Bing);
    }
}
