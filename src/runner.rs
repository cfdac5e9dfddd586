//! Experiment runner.
//!
//! Processes keywords strictly in sequence: search with fallback,
//! normalise, optionally re-rank, then append the record before touching
//! the next keyword. Per-keyword failures are written into the record and
//! the run continues; only a persistence failure stops the run.
//! Cancellation is checked between keywords, never mid-append. A keyword
//! whose re-rank retries were cut short by cancellation is not recorded,
//! so a resumed run processes it again.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use serp_search::{normalize, truncate, FallbackCoordinator, SearchError};
use tokio_util::sync::CancellationToken;

use crate::config::{ExperimentConfig, ProvenanceConfig};
use crate::context::{lookup_network, ExperimentContext};
use crate::error::Result;
use crate::record::{ExperimentRecord, RecordStatus};
use crate::rerank::{RerankStatus, Reranker};
use crate::store::{ResultStore, RunFooter};

/// Per-invocation options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Process at most this many pending keywords.
    pub limit: Option<usize>,
    /// Treat failed records as incomplete.
    pub retry_failed: bool,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: String,
    pub log_path: PathBuf,
    /// Keywords processed in this invocation.
    pub processed: usize,
    /// Keywords skipped because the log already had them.
    pub already_complete: usize,
    pub by_status: BTreeMap<RecordStatus, usize>,
    pub cancelled: bool,
}

/// Drives one run over a keyword list.
pub struct Runner {
    coordinator: FallbackCoordinator,
    reranker: Option<Reranker>,
    store: ResultStore,
    context: ExperimentContext,
    network_lookup: Option<ProvenanceConfig>,
    top_n: usize,
    num_results: usize,
}

impl Runner {
    /// Build a runner from configuration, writing to
    /// `{results_dir}/{run_name}.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the search or re-ranking clients cannot be
    /// built or the log cannot be opened.
    pub fn from_config(config: &ExperimentConfig, run_name: &str) -> Result<Self> {
        let coordinator = FallbackCoordinator::new(config.search.clone())?;
        let reranker = if config.rerank.enabled {
            if config.rerank.hf_token.is_none() {
                tracing::warn!("HF_TOKEN is not set; re-ranking calls will likely be rejected");
            }
            Some(Reranker::from_config(&config.rerank, config.top_n)?)
        } else {
            None
        };
        let store = ResultStore::open(config.results_dir.join(format!("{run_name}.jsonl")))?;
        let context = ExperimentContext::capture(run_name, config);
        let runner = Self::with_parts(
            coordinator,
            reranker,
            store,
            context,
            config.top_n,
            config.search.num_results,
        );
        Ok(if config.provenance.network_lookup {
            runner.with_network_lookup(config.provenance.clone())
        } else {
            runner
        })
    }

    /// Assemble a runner from already-built parts.
    pub fn with_parts(
        coordinator: FallbackCoordinator,
        reranker: Option<Reranker>,
        store: ResultStore,
        context: ExperimentContext,
        top_n: usize,
        num_results: usize,
    ) -> Self {
        Self {
            coordinator,
            reranker,
            store,
            context,
            network_lookup: None,
            top_n,
            num_results,
        }
    }

    /// Look up the public IP and location before each run and record them
    /// in the log header.
    pub fn with_network_lookup(mut self, config: ProvenanceConfig) -> Self {
        self.network_lookup = Some(config);
        self
    }

    /// Run every keyword not already complete in the log.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HarnessError::Persistence`] if a record cannot be
    /// durably written. Records appended before the failure remain valid.
    pub async fn run(
        &mut self,
        keywords: &[String],
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let completed = self.store.load_existing(options.retry_failed);
        let mut pending: Vec<&String> = keywords.iter().filter(|k| !completed.contains(*k)).collect();
        let already_complete = keywords.len() - pending.len();
        if let Some(limit) = options.limit {
            pending.truncate(limit);
        }

        tracing::info!(
            run_id = %self.context.run_id,
            log = %self.store.path().display(),
            pending = pending.len(),
            already_complete,
            "starting run"
        );
        if let Some(lookup) = &self.network_lookup {
            self.context.network = Some(lookup_network(lookup).await);
        }
        self.store.append_header(&self.context)?;

        let total = pending.len();
        let mut report = RunReport {
            run_id: self.context.run_id.clone(),
            log_path: self.store.path().to_path_buf(),
            processed: 0,
            already_complete,
            by_status: BTreeMap::new(),
            cancelled: false,
        };

        for (i, keyword) in pending.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(remaining = total - i, "cancellation requested, stopping");
                report.cancelled = true;
                break;
            }
            tracing::info!("[{}/{}] {}", i + 1, total, keyword);

            let Some(record) = self.process_keyword(keyword, cancel).await else {
                tracing::info!(keyword = %keyword, "cancelled mid-keyword, left pending for resume");
                report.cancelled = true;
                break;
            };
            tracing::info!(keyword = %keyword, status = %record.status, "keyword done");
            self.store.append(&record)?;

            report.processed += 1;
            *report.by_status.entry(record.status).or_insert(0) += 1;
        }

        self.store.append_footer(&RunFooter {
            run_id: self.context.run_id.clone(),
            finished_at: Utc::now(),
            processed: report.processed,
            cancelled: report.cancelled,
        })?;
        Ok(report)
    }

    /// Search, normalise and re-rank one keyword. Every failure is
    /// captured in the returned record.
    ///
    /// Returns `None` when cancellation interrupted the re-rank retries:
    /// the keyword has no final outcome and must stay pending.
    pub async fn process_keyword(
        &self,
        keyword: &str,
        cancel: &CancellationToken,
    ) -> Option<ExperimentRecord> {
        let started_at = Utc::now();
        let mut record = ExperimentRecord {
            keyword: keyword.to_string(),
            run_id: self.context.run_id.clone(),
            status: RecordStatus::Ok,
            candidates: Vec::new(),
            rerank: None,
            provider_used: None,
            fallback_taken: false,
            attempts: Vec::new(),
            raw_result_count: 0,
            started_at,
            finished_at: started_at,
            failure_reason: None,
        };

        let outcome = match self.coordinator.search(keyword, self.num_results).await {
            Ok(outcome) => outcome,
            Err(e) => {
                record.status = RecordStatus::SearchFailed;
                record.failure_reason = Some(e.to_string());
                match e {
                    SearchError::AllProvidersFailed(attempts) => {
                        tracing::warn!(keyword, "all providers failed");
                        record.attempts = attempts;
                    }
                    other => tracing::error!(keyword, error = %other, "search failed"),
                }
                record.finished_at = Utc::now();
                return Some(record);
            }
        };

        record.provider_used = Some(outcome.provider_used);
        record.fallback_taken = outcome.fallback_taken;
        record.raw_result_count = outcome.results.len();
        record.attempts = outcome.attempts;

        let candidates = match normalize(keyword, &outcome.results) {
            Ok(c) => truncate(c, self.top_n),
            Err(e) => {
                tracing::error!(keyword, provider = %outcome.provider_used, error = %e, "normalisation invariant violated");
                record.status = RecordStatus::NormalizationFailed;
                record.failure_reason = Some(e.to_string());
                record.finished_at = Utc::now();
                return Some(record);
            }
        };
        if candidates.is_empty() {
            record.status = RecordStatus::NoResults;
            record.failure_reason = Some(if outcome.results.is_empty() {
                "providers answered with no results".to_string()
            } else {
                "no result had a registrable domain".to_string()
            });
            record.finished_at = Utc::now();
            return Some(record);
        }
        record.candidates = candidates;

        if let Some(reranker) = &self.reranker {
            let rerank = reranker.rerank(keyword, &record.candidates, cancel).await;
            if rerank.interrupted {
                return None;
            }
            record.status = match rerank.status {
                RerankStatus::Ok => RecordStatus::Ok,
                RerankStatus::Partial => RecordStatus::Partial,
                RerankStatus::Failed => RecordStatus::RerankFailed,
            };
            if let Some(err) = &rerank.error {
                record.failure_reason = Some(format!("[{}] {}", err.code, err.message));
            }
            record.rerank = Some(rerank);
        }

        record.finished_at = Utc::now();
        Some(record)
    }
}
