//! Keyword list loading.
//!
//! One keyword per line. Lines are trimmed; blank lines and `#` comments
//! are skipped; a repeated keyword keeps its first position.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{HarnessError, Result};

/// Parse keyword file contents.
pub fn parse_keywords(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

/// Read and parse the keyword file at `path`.
///
/// # Errors
///
/// Returns [`HarnessError::Config`] if the file cannot be read or contains
/// no keywords.
pub fn load_keywords(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        HarnessError::Config(format!("failed to read keywords file {}: {e}", path.display()))
    })?;
    let keywords = parse_keywords(&content);
    if keywords.is_empty() {
        return Err(HarnessError::Config(format!(
            "keywords file {} contains no keywords",
            path.display()
        )));
    }
    tracing::debug!(count = keywords.len(), path = %path.display(), "keywords loaded");
    Ok(keywords)
}
