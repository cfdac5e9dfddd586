//! Exports projected from a run log.
//!
//! Every export is derived from the stored log, never from in-memory run
//! state, and uses the latest record per keyword:
//!
//! - `{run_name}.json`: nested, run headers plus full records
//! - `{run_name}.csv`: flat, one row per candidate domain, plus one
//!   status-only row for each keyword without candidates
//! - `{run_name}_domains.csv`: unique domains with the first URL seen

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::ExperimentContext;
use crate::error::{HarnessError, Result};
use crate::record::ExperimentRecord;
use crate::rerank::RerankStatus;
use crate::store::{latest_per_keyword, load_log, write_atomic, LoadedLog};

/// Nested JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedExport {
    /// One header per run session that wrote to the log.
    pub runs: Vec<ExperimentContext>,
    /// Latest record per keyword.
    pub records: Vec<ExperimentRecord>,
}

/// Flat CSV row.
#[derive(Debug, Serialize)]
struct FlatRow<'a> {
    keyword: &'a str,
    domain: &'a str,
    traditional_rank: Option<usize>,
    ai_rank: Option<usize>,
    source: &'a str,
    url: &'a str,
    raw_position: Option<usize>,
    title: &'a str,
    status: String,
    provider_used: &'a str,
    fallback_taken: bool,
    rerank_status: &'a str,
    model: &'a str,
    treatment: String,
    failure_reason: &'a str,
}

impl<'a> FlatRow<'a> {
    /// Row with the record-level columns filled and the candidate columns empty.
    fn status_only(record: &'a ExperimentRecord) -> Self {
        let rerank = record.rerank.as_ref();
        Self {
            keyword: &record.keyword,
            domain: "",
            traditional_rank: None,
            ai_rank: None,
            source: "",
            url: "",
            raw_position: None,
            title: "",
            status: record.status.to_string(),
            provider_used: record.provider_used.map_or("", |p| p.slug()),
            fallback_taken: record.fallback_taken,
            rerank_status: rerank.map_or("", |r| match r.status {
                RerankStatus::Ok => "ok",
                RerankStatus::Partial => "partial",
                RerankStatus::Failed => "failed",
            }),
            model: rerank.map_or("", |r| r.model.as_str()),
            treatment: rerank.map(|r| r.treatment.to_string()).unwrap_or_default(),
            failure_reason: record.failure_reason.as_deref().unwrap_or_default(),
        }
    }
}

/// Paths written by [`export_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
    pub domains: PathBuf,
}

impl ExportPaths {
    /// Export paths next to `log_path`, sharing its file stem.
    pub fn for_log(log_path: &Path) -> Self {
        let dir = log_path.parent().unwrap_or_else(|| Path::new(""));
        let stem = log_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("results");
        Self {
            json: dir.join(format!("{stem}.json")),
            csv: dir.join(format!("{stem}.csv")),
            domains: dir.join(format!("{stem}_domains.csv")),
        }
    }
}

/// Write every export for the log at `log_path`.
///
/// # Errors
///
/// Returns an error if the log cannot be read or an export cannot be written.
pub fn export_all(log_path: &Path) -> Result<ExportPaths> {
    let log = load_log(log_path)?;
    let paths = ExportPaths::for_log(log_path);
    let records = log.latest_records();

    export_json(&log, &paths.json)?;
    export_csv(&records, &paths.csv)?;
    export_domains(&records, &paths.domains)?;

    tracing::info!(
        records = records.len(),
        json = %paths.json.display(),
        csv = %paths.csv.display(),
        domains = %paths.domains.display(),
        "exports written"
    );
    Ok(paths)
}

/// Write the nested JSON export.
///
/// # Errors
///
/// Returns an error if serialisation or the write fails.
pub fn export_json(log: &LoadedLog, path: &Path) -> Result<()> {
    let export = NestedExport {
        runs: log.headers.clone(),
        records: log.latest_records(),
    };
    let json = serde_json::to_string_pretty(&export)
        .map_err(|e| HarnessError::Persistence(format!("failed to serialise export: {e}")))?;
    write_atomic(path, json.as_bytes())
}

/// Write the flat CSV export: one row per candidate, AI rank empty when the
/// model did not keep the domain. A keyword with no candidates (search
/// failed, no results) gets a single row with empty domain and rank
/// columns so its status stays visible.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn export_csv(records: &[ExperimentRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        if record.candidates.is_empty() {
            writer.serialize(FlatRow::status_only(record)).map_err(csv_error)?;
            continue;
        }
        let ai = record.ai_ranks();
        for candidate in &record.candidates {
            let ai_rank = ai.as_ref().and_then(|ranks| {
                ranks
                    .iter()
                    .find(|(d, _)| *d == &candidate.domain)
                    .map(|(_, r)| *r)
            });
            writer
                .serialize(FlatRow {
                    domain: candidate.domain.as_str(),
                    traditional_rank: Some(candidate.rank),
                    ai_rank,
                    source: candidate.source.slug(),
                    url: &candidate.url,
                    raw_position: Some(candidate.raw_position),
                    title: &candidate.title,
                    ..FlatRow::status_only(record)
                })
                .map_err(csv_error)?;
        }
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| HarnessError::Persistence(format!("failed to finish CSV: {e}")))?;
    write_atomic(path, &bytes)
}

/// Write unique domains with the first URL seen, sorted by domain.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn export_domains(records: &[ExperimentRecord], path: &Path) -> Result<()> {
    let mut first_url: BTreeMap<&str, &str> = BTreeMap::new();
    for candidate in records.iter().flat_map(|r| &r.candidates) {
        first_url
            .entry(candidate.domain.as_str())
            .or_insert(candidate.url.as_str());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["domain", "url"]).map_err(csv_error)?;
    for (domain, url) in &first_url {
        writer.write_record([*domain, *url]).map_err(csv_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| HarnessError::Persistence(format!("failed to finish CSV: {e}")))?;
    write_atomic(path, &bytes)
}

/// Load a run log (`.jsonl`) or a nested export (`.json`) as run headers
/// plus the latest record per keyword.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a recognised format.
pub fn load_run(path: &Path) -> Result<NestedExport> {
    let from_log = |path: &Path| -> Result<NestedExport> {
        let log = load_log(path)?;
        Ok(NestedExport {
            records: log.latest_records(),
            runs: log.headers,
        })
    };

    if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
        return from_log(path);
    }
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str::<NestedExport>(&content) {
        Ok(export) => Ok(NestedExport {
            records: latest_per_keyword(&export.records),
            runs: export.runs,
        }),
        Err(e) => {
            // A `.json` name is not a guarantee; fall back to the log format.
            tracing::debug!(path = %path.display(), error = %e, "not a nested export");
            from_log(path)
        }
    }
}

/// Latest record per keyword from a run log or nested export.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a recognised format.
pub fn load_records(path: &Path) -> Result<Vec<ExperimentRecord>> {
    Ok(load_run(path)?.records)
}

fn csv_error(e: csv::Error) -> HarnessError {
    HarnessError::Persistence(format!("failed to write CSV row: {e}"))
}
