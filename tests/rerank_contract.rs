//! Re-ranking contract tests against a mocked inference endpoint.
//!
//! Verify request shape, retry behaviour per status class, and that the
//! parsed ranking never leaves the candidate set.

use serp_rerank::rerank::Reranker;
use serp_rerank::{RerankConfig, RerankStatus, Treatment};
use serp_search::{normalize, Provider, RankedCandidate, RawResult};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn candidates() -> Vec<RankedCandidate> {
    let raw: Vec<RawResult> = [
        "https://www.capterra.com/crm-software/",
        "https://www.salesforce.com/crm/",
        "https://www.hubspot.com/products/crm",
        "https://www.zoho.com/crm/",
    ]
    .iter()
    .enumerate()
    .map(|(i, url)| RawResult {
        url: url.to_string(),
        title: format!("Result {}", i + 1),
        snippet: "CRM software for growing teams".into(),
        provider: Provider::SearXng,
        position: i + 1,
        engines: vec!["google".into()],
        score: None,
    })
    .collect();
    normalize("crm software", &raw).expect("normalize")
}

fn config(server: &MockServer, treatment: Treatment) -> RerankConfig {
    let mut config = RerankConfig {
        endpoint: format!("{}/models", server.uri()),
        model: "Qwen/Qwen3-32B-Instruct".into(),
        treatment,
        hf_token: Some("hf_test".into()),
        timeout_seconds: 5,
        ..Default::default()
    };
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 2;
    config
}

#[tokio::test]
async fn request_carries_prompt_parameters_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/Qwen/Qwen3-32B-Instruct"))
        .and(header("authorization", "Bearer hf_test"))
        .and(body_partial_json(json!({
            "parameters": {"max_new_tokens": 500, "temperature": 0.1, "return_full_text": false}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "generated_text": "<think>capterra is a directory</think>\nhubspot.com\nzoho.com\nsalesforce.com"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let reranker = Reranker::from_config(&config(&server, Treatment::ShowRank), 10).expect("reranker");
    let result = reranker
        .rerank("crm software", &candidates(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, RerankStatus::Ok);
    let post: Vec<&str> = result.domains.iter().map(|d| d.as_str()).collect();
    assert_eq!(post, ["hubspot.com", "zoho.com", "salesforce.com"]);
    assert!(result.prompt.contains("1. [capterra.com] Result 1"));
    assert_eq!(result.treatment, Treatment::ShowRank);
}

#[tokio::test]
async fn model_loading_503_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(json!({"error": "Model is currently loading", "estimated_time": 1.0})),
        )
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"generated_text": "zoho.com"}])),
        )
        .mount(&server)
        .await;

    let reranker = Reranker::from_config(&config(&server, Treatment::ShowRank), 10).expect("reranker");
    let result = reranker
        .rerank("crm software", &candidates(), &CancellationToken::new())
        .await;
    assert_eq!(result.status, RerankStatus::Ok);
    assert_eq!(result.attempts, 3);
}

#[tokio::test]
async fn bad_request_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"error": "inputs too long"})))
        .expect(1)
        .mount(&server)
        .await;

    let reranker = Reranker::from_config(&config(&server, Treatment::HideRank), 10).expect("reranker");
    let result = reranker
        .rerank("crm software", &candidates(), &CancellationToken::new())
        .await;
    assert_eq!(result.status, RerankStatus::Failed);
    assert_eq!(result.attempts, 1);
    let error = result.error.expect("error");
    assert_eq!(error.code, "BAD_REQUEST");
    assert_eq!(error.message, "inputs too long");
}

#[tokio::test]
async fn persistent_rate_limit_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;

    let reranker = Reranker::from_config(&config(&server, Treatment::ShowRank), 10).expect("reranker");
    let result = reranker
        .rerank("crm software", &candidates(), &CancellationToken::new())
        .await;
    assert_eq!(result.status, RerankStatus::Failed);
    assert_eq!(result.attempts, 4);
    assert_eq!(result.error.map(|e| e.code), Some("RATE_LIMITED".to_string()));
}
