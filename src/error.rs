//! Error types for the serp-rerank harness.
//!
//! Per-keyword failures (search, normalisation, re-ranking) never surface
//! here; they are written into the keyword's record. [`HarnessError`] is
//! for conditions that stop a whole command.

/// Top-level error type for the experiment harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Invalid configuration or command-line input.
    #[error("config error: {0}")]
    Config(String),

    /// A record could not be durably written. Fatal for the run.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A results file exists but cannot be interpreted.
    #[error("format error: {0}")]
    Format(String),

    /// Search layer setup error.
    #[error("search error: {0}")]
    Search(#[from] serp_search::SearchError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_display() {
        let err = HarnessError::Persistence("disk full".into());
        assert_eq!(err.to_string(), "persistence error: disk full");
    }

    #[test]
    fn io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "keywords.txt");
        let err: HarnessError = io.into();
        assert!(matches!(err, HarnessError::Io(_)));
    }

    #[test]
    fn search_config_converts() {
        let err: HarnessError = serp_search::SearchError::Config("no providers".into()).into();
        assert!(err.to_string().contains("no providers"));
    }
}
