//! Kagi: token-authenticated search API.
//!
//! `GET {endpoint}?q=…&limit=N` with `Authorization: Bot <token>`. The
//! response `data` array mixes organic results (`t == 0`) with related
//! searches and other widgets; only organic entries are kept.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SearchConfig;
use crate::error::ProviderError;
use crate::http;
use crate::provider::SearchProvider;
use crate::types::{Provider, RawResult};

/// Kagi search API adapter.
pub struct KagiProvider;

/// Organic result type tag in Kagi's `data` array.
const ORGANIC: i64 = 0;

#[derive(Debug, Deserialize)]
struct KagiResponse {
    data: Vec<KagiItem>,
}

#[derive(Debug, Deserialize)]
struct KagiItem {
    t: i64,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[async_trait]
impl SearchProvider for KagiProvider {
    async fn fetch(
        &self,
        keyword: &str,
        top_n: usize,
        config: &SearchConfig,
    ) -> Result<Vec<RawResult>, ProviderError> {
        let Some(token) = config.kagi_token.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Err(ProviderError::unavailable(
                Provider::Kagi,
                "KAGI_TOKEN is not configured",
            ));
        };

        tracing::trace!(keyword, "Kagi search");

        let client = http::build_client(Provider::Kagi, config)?;
        let limit = top_n.to_string();

        let response = client
            .get(&config.endpoints.kagi)
            .query(&[("q", keyword), ("limit", limit.as_str())])
            .header("Authorization", format!("Bot {token}"))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| http::transport_error(Provider::Kagi, &e))?;

        let body = http::read_text(Provider::Kagi, response).await?;
        parse_kagi_json(&body, top_n)
    }

    fn provider(&self) -> Provider {
        Provider::Kagi
    }
}

/// Parse a Kagi API body, keeping organic results only.
pub(crate) fn parse_kagi_json(body: &str, top_n: usize) -> Result<Vec<RawResult>, ProviderError> {
    let parsed: KagiResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::malformed(Provider::Kagi, format!("unexpected JSON shape: {e}"))
    })?;

    let results: Vec<RawResult> = parsed
        .data
        .into_iter()
        .filter(|item| item.t == ORGANIC)
        .filter_map(|item| {
            let url = item.url.filter(|u| !u.trim().is_empty())?;
            Some((url, item.title.unwrap_or_default(), item.snippet.unwrap_or_default()))
        })
        .take(top_n)
        .enumerate()
        .map(|(i, (url, title, snippet))| RawResult {
            url,
            title,
            snippet,
            provider: Provider::Kagi,
            position: i + 1,
            engines: vec![],
            score: None,
        })
        .collect();

    tracing::debug!(count = results.len(), "Kagi results parsed");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;

    const MOCK_JSON: &str = r#"{
        "meta": {"id": "abc", "node": "us-east", "ms": 120},
        "data": [
            {"t": 0, "rank": 1, "url": "https://www.hubspot.com/products/crm", "title": "HubSpot CRM", "snippet": "Free CRM"},
            {"t": 1, "list": ["best crm", "crm for startups"]},
            {"t": 0, "rank": 2, "url": "https://www.salesforce.com/crm/", "title": "Salesforce"},
            {"t": 0, "rank": 3, "title": "no url"}
        ]
    }"#;

    #[test]
    fn keeps_only_organic_results() {
        let results = parse_kagi_json(MOCK_JSON, 10).expect("should parse");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://www.hubspot.com/products/crm");
        assert_eq!(results[0].snippet, "Free CRM");
        assert_eq!(results[1].position, 2);
        assert!(results[1].snippet.is_empty());
    }

    #[test]
    fn missing_data_is_malformed() {
        let err = parse_kagi_json(r#"{"error": [{"code": 1}]}"#, 10).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn missing_token_is_unavailable() {
        let err = KagiProvider
            .fetch("crm software", 10, &SearchConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unavailable);
        assert!(err.message.contains("KAGI_TOKEN"));
    }

    #[tokio::test]
    async fn sends_bot_authorization_header() {
        use wiremock::matchers::{header, method, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Authorization", "Bot test-token"))
            .and(query_param("q", "crm software"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOCK_JSON))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = SearchConfig {
            kagi_token: Some("test-token".into()),
            ..Default::default()
        };
        config.endpoints.kagi = format!("{}/api/v0/search", server.uri());

        let results = KagiProvider
            .fetch("crm software", 5, &config)
            .await
            .expect("mock search should succeed");
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_unavailable() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let mut config = SearchConfig {
            kagi_token: Some("wrong".into()),
            ..Default::default()
        };
        config.endpoints.kagi = server.uri();

        let err = KagiProvider
            .fetch("crm software", 5, &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unavailable);
        assert!(!err.message.contains("wrong"));
    }
}
