//! Re-ranking adapter.
//!
//! Given a keyword and its normalised candidates, [`Reranker::rerank`]
//! builds a prompt, calls the configured [`TextGenerator`] with bounded
//! retries, and parses the reply into an ordered subset of the candidate
//! domains. Model failures never propagate: they come back as a
//! [`RerankResult`] with [`RerankStatus::Failed`] so the run can continue.

pub mod client;
pub mod error;
pub mod parse;
pub mod prompt;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serp_search::{CanonicalDomain, RankedCandidate};
use tokio_util::sync::CancellationToken;

pub use client::{HfInferenceClient, TextGenerator};
pub use error::RerankError;
pub use parse::{parse_ranking, ParsedRanking};
pub use prompt::build_prompt;

use crate::config::{RerankConfig, Treatment};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Code recorded when the reply contained no candidate domain.
pub const NO_VALID_DOMAINS: &str = "NO_VALID_DOMAINS";
/// Code recorded when there was nothing to re-rank.
pub const NO_CANDIDATES: &str = "NO_CANDIDATES";

/// Outcome class of a re-ranking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankStatus {
    /// Every domain-like token matched a candidate.
    Ok,
    /// Some tokens matched; others were outside the candidate set.
    Partial,
    /// No usable ranking.
    Failed,
}

/// Why a re-ranking failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerankFailure {
    /// Stable code, e.g. `AUTH_FAILED` or `NO_VALID_DOMAINS`.
    pub code: String,
    pub message: String,
}

/// Post-LLM ranking for one keyword, with everything needed to audit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankResult {
    pub keyword: String,
    /// Candidate domains in the model's order. Rank is index + 1.
    pub domains: Vec<CanonicalDomain>,
    /// Model output verbatim. `None` only when no call succeeded.
    pub raw_text: Option<String>,
    pub status: RerankStatus,
    /// Domain-like tokens that matched no candidate.
    #[serde(default)]
    pub rejected: Vec<String>,
    pub prompt: String,
    pub treatment: Treatment,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Model calls made, including retries.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RerankFailure>,
    /// Cancellation cut the retry loop short; the failure is not the
    /// model's answer and the result must not be stored.
    #[serde(skip)]
    pub interrupted: bool,
}

impl RerankResult {
    /// 1-based post-LLM rank of `domain`, if the model kept it.
    pub fn rank_of(&self, domain: &CanonicalDomain) -> Option<usize> {
        self.domains.iter().position(|d| d == domain).map(|i| i + 1)
    }
}

/// Re-ranks candidate lists through a [`TextGenerator`].
pub struct Reranker {
    generator: Arc<dyn TextGenerator>,
    treatment: Treatment,
    top_n: usize,
    retry: RetryPolicy,
}

impl Reranker {
    /// Create a re-ranker over any generator.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        treatment: Treatment,
        top_n: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            treatment,
            top_n,
            retry,
        }
    }

    /// Create a re-ranker backed by the Hugging Face inference API.
    ///
    /// # Errors
    ///
    /// Returns a config error if the HTTP client cannot be built.
    pub fn from_config(config: &RerankConfig, top_n: usize) -> crate::error::Result<Self> {
        let client = HfInferenceClient::new(config)?;
        Ok(Self::new(
            Arc::new(client),
            config.treatment,
            top_n,
            config.retry.clone(),
        ))
    }

    /// Model identifier of the underlying generator.
    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Treatment applied to every prompt.
    pub fn treatment(&self) -> Treatment {
        self.treatment
    }

    /// Re-rank `candidates` for `keyword`.
    ///
    /// Transient model errors are retried with backoff; `cancel` cuts a
    /// backoff short. The returned domains are always a duplicate-free
    /// subset of the candidates.
    pub async fn rerank(
        &self,
        keyword: &str,
        candidates: &[RankedCandidate],
        cancel: &CancellationToken,
    ) -> RerankResult {
        let started_at = Utc::now();
        let prompt = build_prompt(keyword, candidates, self.top_n, self.treatment);
        let mut result = RerankResult {
            keyword: keyword.to_string(),
            domains: Vec::new(),
            raw_text: None,
            status: RerankStatus::Failed,
            rejected: Vec::new(),
            prompt,
            treatment: self.treatment,
            model: self.generator.model().to_string(),
            started_at,
            finished_at: started_at,
            attempts: 0,
            error: None,
            interrupted: false,
        };

        if candidates.is_empty() {
            result.error = Some(RerankFailure {
                code: NO_CANDIDATES.into(),
                message: "no candidates to re-rank".into(),
            });
            return result;
        }

        let generator = &self.generator;
        let prompt = result.prompt.as_str();
        let retried = retry_with_backoff(&self.retry, cancel, |attempt| async move {
            tracing::debug!(keyword, attempt, "calling re-ranking model");
            generator.generate(prompt).await
        })
        .await;
        result.attempts = retried.attempts;
        result.interrupted = retried.cancelled;
        result.finished_at = Utc::now();

        match retried.result {
            Ok(text) => {
                let parsed = parse_ranking(&text, candidates);
                result.status = match (parsed.domains.is_empty(), parsed.rejected.is_empty()) {
                    (true, _) => RerankStatus::Failed,
                    (false, true) => RerankStatus::Ok,
                    (false, false) => RerankStatus::Partial,
                };
                if parsed.domains.is_empty() {
                    result.error = Some(RerankFailure {
                        code: NO_VALID_DOMAINS.into(),
                        message: "model output named no candidate domain".into(),
                    });
                }
                if !parsed.rejected.is_empty() {
                    tracing::info!(
                        keyword,
                        rejected = parsed.rejected.len(),
                        "model returned domains outside the candidate set"
                    );
                }
                result.domains = parsed.domains;
                result.rejected = parsed.rejected;
                result.raw_text = Some(text);
            }
            Err(e) if retried.cancelled => {
                tracing::info!(keyword, error = %e, "re-ranking interrupted before a final answer");
                result.error = Some(RerankFailure {
                    code: e.code().to_string(),
                    message: e.message().to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(keyword, code = e.code(), error = %e, "re-ranking failed");
                result.error = Some(RerankFailure {
                    code: e.code().to_string(),
                    message: e.message().to_string(),
                });
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serp_search::{normalize, Provider, RawResult};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Generator that replays a fixed script of replies.
    struct ScriptedGenerator {
        replies: Mutex<VecDeque<std::result::Result<String, RerankError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<std::result::Result<String, RerankError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl TextGenerator for ScriptedGenerator {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> std::result::Result<String, RerankError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RerankError::Provider("script exhausted".into())))
        }
    }

    fn candidates() -> Vec<RankedCandidate> {
        let raw: Vec<RawResult> = ["salesforce.com", "hubspot.com", "zoho.com"]
            .iter()
            .enumerate()
            .map(|(i, d)| RawResult {
                url: format!("https://www.{d}/"),
                title: format!("{d} CRM"),
                snippet: String::new(),
                provider: Provider::SearXng,
                position: i + 1,
                engines: Vec::new(),
                score: None,
            })
            .collect();
        normalize("crm software", &raw).unwrap()
    }

    fn reranker(generator: Arc<ScriptedGenerator>) -> Reranker {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..RetryPolicy::default()
        };
        Reranker::new(generator, Treatment::ShowRank, 10, policy)
    }

    #[tokio::test]
    async fn ok_result_keeps_model_order_and_raw_text() {
        let generator = ScriptedGenerator::new(vec![Ok("hubspot.com\nsalesforce.com".into())]);
        let result = reranker(generator)
            .rerank("crm software", &candidates(), &CancellationToken::new())
            .await;
        assert_eq!(result.status, RerankStatus::Ok);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.raw_text.as_deref(), Some("hubspot.com\nsalesforce.com"));
        let hubspot = &candidates()[1].domain;
        assert_eq!(result.rank_of(hubspot), Some(1));
        assert_eq!(result.model, "scripted");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn unknown_domain_marks_partial() {
        let generator = ScriptedGenerator::new(vec![Ok("hubspot.com\nnotreal.io".into())]);
        let result = reranker(generator)
            .rerank("crm software", &candidates(), &CancellationToken::new())
            .await;
        assert_eq!(result.status, RerankStatus::Partial);
        assert_eq!(result.rejected, ["notreal.io"]);
        assert_eq!(result.domains.len(), 1);
    }

    #[tokio::test]
    async fn no_valid_domains_fails_with_raw_text_kept() {
        let generator = ScriptedGenerator::new(vec![Ok("I cannot help with that.".into())]);
        let result = reranker(generator)
            .rerank("crm software", &candidates(), &CancellationToken::new())
            .await;
        assert_eq!(result.status, RerankStatus::Failed);
        assert_eq!(result.error.unwrap().code, NO_VALID_DOMAINS);
        assert_eq!(result.raw_text.as_deref(), Some("I cannot help with that."));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let generator = ScriptedGenerator::new(vec![
            Err(RerankError::RateLimited("slow down".into())),
            Err(RerankError::Server("HTTP 503: loading".into())),
            Ok("zoho.com".into()),
        ]);
        let result = reranker(Arc::clone(&generator))
            .rerank("crm software", &candidates(), &CancellationToken::new())
            .await;
        assert_eq!(result.status, RerankStatus::Ok);
        assert_eq!(result.attempts, 3);
        assert_eq!(generator.prompts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_backoff_marks_result_interrupted() {
        let generator = ScriptedGenerator::new(vec![
            Err(RerankError::RateLimited("429".into())),
            Ok("zoho.com".into()),
        ]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = reranker(Arc::clone(&generator))
            .rerank("crm software", &candidates(), &cancel)
            .await;
        assert!(result.interrupted);
        assert_eq!(result.status, RerankStatus::Failed);
        assert_eq!(result.attempts, 1);
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn auth_error_fails_without_retry() {
        let generator =
            ScriptedGenerator::new(vec![Err(RerankError::Auth("bad token".into()))]);
        let result = reranker(Arc::clone(&generator))
            .rerank("crm software", &candidates(), &CancellationToken::new())
            .await;
        assert_eq!(result.status, RerankStatus::Failed);
        assert_eq!(result.attempts, 1);
        assert!(result.raw_text.is_none());
        let failure = result.error.unwrap();
        assert_eq!(failure.code, "AUTH_FAILED");
        assert_eq!(failure.message, "bad token");
        assert!(!result.interrupted);
    }

    #[tokio::test]
    async fn empty_candidates_skip_the_model() {
        let generator = ScriptedGenerator::new(vec![]);
        let result = reranker(Arc::clone(&generator))
            .rerank("crm software", &[], &CancellationToken::new())
            .await;
        assert_eq!(result.status, RerankStatus::Failed);
        assert_eq!(result.attempts, 0);
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prompt_and_treatment_are_recorded() {
        let generator = ScriptedGenerator::new(vec![Ok("zoho.com".into())]);
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        let result = Reranker::new(generator, Treatment::HideRank, 5, policy)
            .rerank("crm software", &candidates(), &CancellationToken::new())
            .await;
        assert_eq!(result.treatment, Treatment::HideRank);
        assert!(result.prompt.contains("return the top 5"));
        assert!(result.prompt.contains("- [hubspot.com]"));
    }
}
