//! Per-keyword experiment records.
//!
//! One [`ExperimentRecord`] is appended per keyword per run. It carries
//! the pre-LLM candidates, the post-LLM ranking, and enough provenance to
//! audit which provider answered and what the model actually said.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serp_search::{CanonicalDomain, Provider, ProviderAttempt, RankedCandidate};

use crate::rerank::{RerankResult, RerankStatus};

/// Outcome class of one keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Candidates collected and, if enabled, fully re-ranked.
    Ok,
    /// Re-ranked, but the model named domains outside the candidates.
    Partial,
    /// A provider answered but no candidate with a domain survived.
    NoResults,
    /// Every provider failed or was skipped.
    SearchFailed,
    /// Raw results violated a ranking invariant.
    NormalizationFailed,
    /// Candidates collected; the model produced no usable ranking.
    RerankFailed,
}

impl RecordStatus {
    /// Statuses that `--retry-failed` runs again.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::NoResults | Self::SearchFailed | Self::NormalizationFailed | Self::RerankFailed
        )
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::NoResults => "no_results",
            Self::SearchFailed => "search_failed",
            Self::NormalizationFailed => "normalization_failed",
            Self::RerankFailed => "rerank_failed",
        };
        f.pad(s)
    }
}

/// Everything collected for one keyword in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub keyword: String,
    pub run_id: String,
    pub status: RecordStatus,
    /// Pre-LLM ranking, dense ranks 1..N.
    #[serde(default)]
    pub candidates: Vec<RankedCandidate>,
    /// Post-LLM ranking. `None` in baseline runs or when search failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank: Option<RerankResult>,
    /// Provider that served the query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<Provider>,
    /// True if the serving provider was not first in priority.
    #[serde(default)]
    pub fallback_taken: bool,
    /// Every provider tried, in order.
    #[serde(default)]
    pub attempts: Vec<ProviderAttempt>,
    /// Raw results before normalisation.
    #[serde(default)]
    pub raw_result_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ExperimentRecord {
    /// Traditional (pre-LLM) rank per domain.
    pub fn traditional_ranks(&self) -> Vec<(&CanonicalDomain, usize)> {
        self.candidates.iter().map(|c| (&c.domain, c.rank)).collect()
    }

    /// AI (post-LLM) rank per domain, if the model produced a usable ranking.
    pub fn ai_ranks(&self) -> Option<Vec<(&CanonicalDomain, usize)>> {
        let rerank = self.rerank.as_ref()?;
        if rerank.status == RerankStatus::Failed {
            return None;
        }
        Some(
            rerank
                .domains
                .iter()
                .enumerate()
                .map(|(i, d)| (d, i + 1))
                .collect(),
        )
    }

    /// The ranking this record contributes: post-LLM when available,
    /// otherwise the traditional one.
    pub fn final_ranking(&self) -> Vec<(&CanonicalDomain, usize)> {
        self.ai_ranks().unwrap_or_else(|| self.traditional_ranks())
    }

    /// Candidate entry for `domain`, if present.
    pub fn candidate(&self, domain: &CanonicalDomain) -> Option<&RankedCandidate> {
        self.candidates.iter().find(|c| &c.domain == domain)
    }
}
