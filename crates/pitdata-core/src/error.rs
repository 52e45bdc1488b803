//! Error types for cache and dataset operations.
//!
//! [`DatasetError`] is the taxonomy surfaced to callers of the dataset and
//! batch APIs. [`FetchError`] is what a [`Fetcher`](crate::fetcher::Fetcher)
//! returns; it is carried unchanged inside [`DatasetError::Fetch`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::kind::CacheKind;

/// Errors a [`Fetcher`](crate::fetcher::Fetcher) may report.
///
/// Retry policy belongs to the fetcher; the cache layer never retries.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The upstream provider returned an error or unusable payload.
    #[error("Upstream error from {provider}: {message}")]
    Upstream {
        /// The provider that failed.
        provider: String,
        /// Provider-specific failure description.
        message: String,
    },

    /// Network access is disabled for this fetcher.
    #[error("Offline: refusing to fetch {kind} for {entity}")]
    Offline {
        /// Normalized entity symbol.
        entity: String,
        /// Requested cache kind.
        kind: CacheKind,
    },

    /// Writing fetched data into the cache directory failed.
    #[error("Failed to write {path}: {message}")]
    Write {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },
}

/// Errors returned by dataset preparation and cache orchestration.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Malformed entity identifier or date. Never retried automatically.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Required file missing, unreadable, or cache still stale after a refresh.
    #[error("Cache integrity error for {entity} [{kind}]: {reason}")]
    CacheIntegrity {
        /// Normalized entity symbol.
        entity: String,
        /// Cache kind that failed the check.
        kind: CacheKind,
        /// What was wrong with the on-disk state.
        reason: String,
    },

    /// The cache is fresh but the as-of window contains no rows.
    #[error("Data not available for {entity} [{kind}] in range {start} to {end}")]
    DataUnavailable {
        /// Normalized entity symbol.
        entity: String,
        /// Cache kind that came back empty.
        kind: CacheKind,
        /// Start of the requested window.
        start: String,
        /// End of the requested window (the as-of date).
        end: String,
    },

    /// The fetcher failed while refreshing a cache kind.
    #[error("Fetch failed for {entity} [{kind}]: {source}")]
    Fetch {
        /// Normalized entity symbol.
        entity: String,
        /// Cache kind being refreshed.
        kind: CacheKind,
        /// Error reported by the fetcher.
        #[source]
        source: FetchError,
    },

    /// The caller-supplied deadline elapsed.
    #[error("Timed out preparing {entity} after {elapsed:?}")]
    Timeout {
        /// Entity being prepared.
        entity: String,
        /// Deadline that was exceeded.
        elapsed: Duration,
    },

    /// Filesystem error while managing cache directories or metadata.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A batch worker task failed without producing a result.
    #[error("Worker failure for {entity}: {message}")]
    Worker {
        /// Entity the worker was preparing.
        entity: String,
        /// Panic or join failure description.
        message: String,
    },
}

impl DatasetError {
    /// Wraps an I/O error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`DatasetError::CacheIntegrity`].
    pub fn integrity(entity: impl Into<String>, kind: CacheKind, reason: impl Into<String>) -> Self {
        Self::CacheIntegrity {
            entity: entity.into(),
            kind,
            reason: reason.into(),
        }
    }

    /// Short machine-friendly name of the error category.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::CacheIntegrity { .. } => "cache_integrity",
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::Fetch { .. } => "fetch",
            Self::Timeout { .. } => "timeout",
            Self::Io { .. } => "io",
            Self::Worker { .. } => "worker",
        }
    }
}

/// Result type alias using [`DatasetError`].
pub type Result<T> = std::result::Result<T, DatasetError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_fetch_error_is_carried_unchanged() {
        let err = DatasetError::Fetch {
            entity: "600519.SH".to_string(),
            kind: CacheKind::PriceSeries,
            source: FetchError::Offline {
                entity: "600519.SH".to_string(),
                kind: CacheKind::PriceSeries,
            },
        };
        assert_eq!(err.category(), "fetch");
        assert!(err.to_string().contains("600519.SH [price_series]"));
        let source = err.source().unwrap().downcast_ref::<FetchError>().unwrap();
        assert!(matches!(source, FetchError::Offline { .. }));
    }

    #[test]
    fn test_fetch_error_messages() {
        let upstream = FetchError::Upstream {
            provider: "cninfo".to_string(),
            message: "HTTP 502".to_string(),
        };
        assert_eq!(upstream.to_string(), "Upstream error from cninfo: HTTP 502");

        let write = FetchError::Write {
            path: PathBuf::from("/cache/price.csv"),
            message: "disk full".to_string(),
        };
        assert_eq!(write.to_string(), "Failed to write /cache/price.csv: disk full");
    }

    #[test]
    fn test_categories() {
        assert_eq!(DatasetError::Validation("x".into()).category(), "validation");
        assert_eq!(
            DatasetError::integrity("600519.SH", CacheKind::Financials, "gone").category(),
            "cache_integrity"
        );
        assert_eq!(
            DatasetError::Timeout {
                entity: "600519.SH".into(),
                elapsed: Duration::from_secs(1),
            }
            .category(),
            "timeout"
        );
    }
}
