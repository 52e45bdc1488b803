//! Fetcher trait for refreshing cache directories.
//!
//! A [`Fetcher`] retrieves fresh data for one entity and cache kind from an
//! upstream provider and writes it into the target cache directory. The cache
//! layer only calls it when a refresh is needed and never retries it.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::error::FetchError;
use crate::kind::CacheKind;
use crate::types::EntityIdentity;

/// One refresh request.
#[derive(Clone, Copy, Debug)]
pub struct FetchRequest<'a> {
    /// Entity to refresh.
    pub entity: &'a EntityIdentity,
    /// Kind of data to refresh.
    pub kind: CacheKind,
    /// As-of date of the dataset that triggered the refresh.
    pub as_of: NaiveDate,
    /// Oldest date the caller needs.
    pub history_start: NaiveDate,
    /// Directory the fetched files must be written to.
    pub target_dir: &'a Path,
}

/// What a successful refresh produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Files written (or overwritten) in the target directory.
    pub written_files: Vec<PathBuf>,
    /// Oldest date that was asked of the provider, whether or not it had data that old.
    pub furthest_history_reached: Option<NaiveDate>,
}

impl FetchOutcome {
    /// Creates an outcome for the given files.
    #[must_use]
    pub const fn new(written_files: Vec<PathBuf>) -> Self {
        Self {
            written_files,
            furthest_history_reached: None,
        }
    }

    /// Records how far back the provider was asked.
    #[must_use]
    pub const fn with_furthest_history(mut self, date: NaiveDate) -> Self {
        self.furthest_history_reached = Some(date);
        self
    }
}

/// Upstream collaborator that refreshes a cache directory.
///
/// Implementations may rate-limit and retry internally. From the cache
/// layer's point of view a call either succeeds or fails; the error is
/// surfaced to the caller unchanged.
#[async_trait]
pub trait Fetcher: Send + Sync + Debug {
    /// Returns the name of this fetcher (e.g., "cninfo").
    fn name(&self) -> &str;

    /// Fetches `request.kind` for `request.entity` into `request.target_dir`.
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchOutcome, FetchError>;
}
