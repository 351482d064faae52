//! Error types for fgrid

use thiserror::Error;

/// fgrid error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error (worker counts, environment hints)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Cache entry absent or unreadable; caller should recompute
    #[error("Cache miss: {0}")]
    CacheMiss(String),

    /// Cache entry present but stored inputs differ; caller should recompute
    #[error("Cache stale: {0}")]
    CacheStale(String),

    /// A function-value column too degenerate for a density fit
    #[error("Degenerate column: {0}")]
    DegenerateColumn(String),

    /// Distributed execution failure (shape or communicator disagreement)
    #[error("Distributed error: {0}")]
    Distributed(String),
}

impl Error {
    /// Whether this error is a recoverable cache condition.
    ///
    /// Cache misses and stale entries are expected during normal operation:
    /// the caller logs them, recomputes, and overwrites the cache entry.
    /// Every other variant is a genuine failure.
    pub fn is_cache_recoverable(&self) -> bool {
        matches!(self, Error::CacheMiss(_) | Error::CacheStale(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_errors_are_recoverable() {
        assert!(Error::CacheMiss("no file".into()).is_cache_recoverable());
        assert!(Error::CacheStale("x differs".into()).is_cache_recoverable());
        assert!(!Error::Validation("bad shape".into()).is_cache_recoverable());
        assert!(!Error::DegenerateColumn("empty".into()).is_cache_recoverable());
    }

    #[test]
    fn test_display_names_condition() {
        let e = Error::Distributed("rank 2 row width 4 != 3".into());
        assert!(e.to_string().contains("Distributed"));
        assert!(e.to_string().contains("rank 2"));
    }
}
