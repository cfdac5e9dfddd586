//! Append-only JSON-lines result store.
//!
//! A run log is `{results_dir}/{run_name}.jsonl`. Each line is a tagged
//! [`LogLine`]: a `header` with run provenance when a run (or a resumed
//! run) starts, one `record` per keyword, and a `footer` when the run
//! ends (absent after a crash). Every append is flushed
//! and fsynced before the next keyword is processed, so a crash loses at
//! most the keyword in flight.
//!
//! On load, a truncated trailing line (crash mid-write) is ignored with a
//! warning and cut from the file before new appends. A corrupt line
//! anywhere else is a format error.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ExperimentContext;
use crate::error::{HarnessError, Result};
use crate::record::ExperimentRecord;

/// One line of a run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogLine {
    Header(Box<ExperimentContext>),
    Record(Box<ExperimentRecord>),
    Footer(RunFooter),
}

/// Written once when a run stops, normally or by cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFooter {
    pub run_id: String,
    pub finished_at: DateTime<Utc>,
    /// Keywords processed in this session.
    pub processed: usize,
    pub cancelled: bool,
}

/// Parsed contents of a run log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedLog {
    /// One header per run session, in append order.
    pub headers: Vec<ExperimentContext>,
    /// Every record, in append order, including superseded ones.
    pub records: Vec<ExperimentRecord>,
    /// Byte length of the intact prefix. Anything past it is a torn write.
    pub valid_len: u64,
    /// True if a torn trailing line was found.
    pub truncated_tail: bool,
}

impl LoadedLog {
    /// Latest record per keyword, ordered by each keyword's first appearance.
    pub fn latest_records(&self) -> Vec<ExperimentRecord> {
        latest_per_keyword(&self.records)
    }

    /// Keywords that a run should skip.
    ///
    /// A keyword is complete if its latest record exists and, when
    /// `retry_failed` is set, is not a failure.
    pub fn completed_keywords(&self, retry_failed: bool) -> HashSet<String> {
        self.latest_records()
            .into_iter()
            .filter(|r| !(retry_failed && r.status.is_failure()))
            .map(|r| r.keyword)
            .collect()
    }
}

/// Latest record per keyword, ordered by each keyword's first appearance.
pub fn latest_per_keyword(records: &[ExperimentRecord]) -> Vec<ExperimentRecord> {
    let mut order: Vec<&str> = Vec::new();
    let mut latest: HashMap<&str, &ExperimentRecord> = HashMap::new();
    for record in records {
        if latest.insert(record.keyword.as_str(), record).is_none() {
            order.push(record.keyword.as_str());
        }
    }
    order
        .into_iter()
        .filter_map(|k| latest.get(k).map(|r| (*r).clone()))
        .collect()
}

/// Parse a run log.
///
/// # Errors
///
/// Returns [`HarnessError::Io`] if the file cannot be read and
/// [`HarnessError::Format`] if a line other than the last is corrupt.
pub fn load_log(path: &Path) -> Result<LoadedLog> {
    let content = std::fs::read_to_string(path)?;
    parse_log(&content, path)
}

fn parse_log(content: &str, path: &Path) -> Result<LoadedLog> {
    let mut log = LoadedLog::default();
    let mut offset = 0usize;
    let mut lines = content.split_inclusive('\n').enumerate().peekable();

    while let Some((index, raw)) = lines.next() {
        let is_last = lines.peek().is_none();
        let line = raw.trim();
        if line.is_empty() {
            offset += raw.len();
            continue;
        }
        match serde_json::from_str::<LogLine>(line) {
            Ok(LogLine::Header(ctx)) => log.headers.push(*ctx),
            Ok(LogLine::Record(record)) => log.records.push(*record),
            Ok(LogLine::Footer(footer)) => {
                if let Some(header) = log.headers.iter_mut().find(|h| h.run_id == footer.run_id) {
                    header.finished_at = Some(footer.finished_at);
                }
            }
            Err(e) if is_last => {
                tracing::warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "ignoring truncated trailing line in run log"
                );
                log.truncated_tail = true;
                break;
            }
            Err(e) => {
                return Err(HarnessError::Format(format!(
                    "{}: line {}: {e}",
                    path.display(),
                    index + 1
                )));
            }
        }
        offset += raw.len();
    }

    // An intact final line missing its newline is kept; the next append
    // must start on a fresh line.
    log.valid_len = offset as u64;
    Ok(log)
}

/// Single-writer append handle for a run log.
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    file: File,
    existing: LoadedLog,
}

impl ResultStore {
    /// Open (or create) the log at `path`, loading anything already in it.
    ///
    /// A torn trailing line is cut off so new appends start clean.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Persistence`] if the file cannot be opened or
    /// repaired, and [`HarnessError::Format`] if it is corrupt.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                HarnessError::Persistence(format!(
                    "failed to create results directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let existing = if path.exists() {
            load_log(&path)?
        } else {
            LoadedLog::default()
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| persistence(&path, "open", &e))?;

        let on_disk = file
            .metadata()
            .map_err(|e| persistence(&path, "stat", &e))?
            .len();
        if existing.truncated_tail && on_disk > existing.valid_len {
            file.set_len(existing.valid_len)
                .map_err(|e| persistence(&path, "truncate", &e))?;
        }
        if existing.valid_len > 0 && !ends_with_newline(&path, existing.valid_len)? {
            file.write_all(b"\n")
                .map_err(|e| persistence(&path, "write", &e))?;
        }

        if !existing.records.is_empty() {
            tracing::info!(
                path = %path.display(),
                records = existing.records.len(),
                "resuming from existing run log"
            );
        }
        Ok(Self {
            path,
            file,
            existing,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Contents of the log as it was when opened.
    pub fn existing(&self) -> &LoadedLog {
        &self.existing
    }

    /// Keywords already complete in this log.
    pub fn load_existing(&self, retry_failed: bool) -> HashSet<String> {
        self.existing.completed_keywords(retry_failed)
    }

    /// Append a run header.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Persistence`] if the line is not durably written.
    pub fn append_header(&mut self, context: &ExperimentContext) -> Result<()> {
        self.write_line(&LogLine::Header(Box::new(context.clone())))
    }

    /// Append one keyword record.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Persistence`] if the line is not durably written.
    pub fn append(&mut self, record: &ExperimentRecord) -> Result<()> {
        self.write_line(&LogLine::Record(Box::new(record.clone())))
    }

    /// Append the footer for a finished run.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Persistence`] if the line is not durably written.
    pub fn append_footer(&mut self, footer: &RunFooter) -> Result<()> {
        self.write_line(&LogLine::Footer(footer.clone()))
    }

    fn write_line(&mut self, line: &LogLine) -> Result<()> {
        let mut json = serde_json::to_string(line)
            .map_err(|e| HarnessError::Persistence(format!("failed to serialise log line: {e}")))?;
        json.push('\n');
        self.file
            .write_all(json.as_bytes())
            .map_err(|e| persistence(&self.path, "write", &e))?;
        self.file
            .flush()
            .map_err(|e| persistence(&self.path, "flush", &e))?;
        self.file
            .sync_data()
            .map_err(|e| persistence(&self.path, "fsync", &e))?;
        Ok(())
    }
}

fn ends_with_newline(path: &Path, len: u64) -> Result<bool> {
    use std::io::{Read, Seek, SeekFrom};

    let mut f = File::open(path).map_err(|e| persistence(path, "open", &e))?;
    f.seek(SeekFrom::Start(len - 1))
        .map_err(|e| persistence(path, "seek", &e))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)
        .map_err(|e| persistence(path, "read", &e))?;
    Ok(last[0] == b'\n')
}

fn persistence(path: &Path, op: &str, e: &std::io::Error) -> HarnessError {
    HarnessError::Persistence(format!("failed to {op} {}: {e}", path.display()))
}

/// Atomically replace `path` with `bytes`: temp file, fsync, rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("export");
    let tmp_path = dir.join(format!(".{name}.tmp"));

    let mut tmp = File::create(&tmp_path).map_err(|e| persistence(&tmp_path, "create", &e))?;
    tmp.write_all(bytes)
        .map_err(|e| persistence(&tmp_path, "write", &e))?;
    tmp.sync_all()
        .map_err(|e| persistence(&tmp_path, "fsync", &e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| persistence(path, "rename into", &e))?;
    Ok(())
}
