//! serp-rerank: does an LLM re-ranker agree with the search engine?
//!
//! Research harness that collects search-engine rankings for B2B SaaS
//! keywords, has a hosted LLM re-rank them, and compares the two:
//!
//! keywords → [`serp_search::FallbackCoordinator`] → rank normaliser →
//! [`rerank::Reranker`] → [`store::ResultStore`] → [`compare`] / [`summary`]
//!
//! # Architecture
//!
//! - **serp-search** (workspace member): provider adapters, fallback,
//!   canonical domains, dense ranks
//! - **Re-ranking**: prompt, hosted model call with backoff, output parsing
//! - **Store**: append-only JSON-lines log, fsynced per keyword, resumable
//! - **Reporting**: exports, AI vs traditional comparison, run summary

pub mod compare;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod keywords;
pub mod record;
pub mod rerank;
pub mod retry;
pub mod runner;
pub mod stats;
pub mod store;
pub mod summary;

pub use config::{ComparisonConfig, ExperimentConfig, ProvenanceConfig, RerankConfig, Treatment};
pub use context::{lookup_network, ExperimentContext, NetworkLocation};
pub use error::{HarnessError, Result};
pub use record::{ExperimentRecord, RecordStatus};
pub use rerank::{RerankResult, RerankStatus, Reranker};
pub use runner::{RunOptions, RunReport, Runner};
pub use store::ResultStore;
