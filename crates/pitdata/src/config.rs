//! Dataset configuration.

use chrono::{Days, NaiveDate};
use std::path::{Path, PathBuf};

/// Default price lookback, roughly five years of calendar days.
pub const DEFAULT_PRICE_LOOKBACK_DAYS: u32 = 1800;
/// Default announcement lookback, two years.
pub const DEFAULT_DISCLOSURE_LOOKBACK_DAYS: u32 = 730;
/// Default slack between the price lookback and the history a cache must cover.
pub const DEFAULT_HISTORY_GRACE_DAYS: u32 = 7;

/// Settings shared by every dataset request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetConfig {
    /// Root of the cache tree.
    pub base_dir: PathBuf,
    /// Calendar days of price history in a dataset.
    pub price_lookback_days: u32,
    /// Calendar days of announcements in a dataset.
    pub disclosure_lookback_days: u32,
    /// Days the earliest cached bar may trail the lookback start without a refresh.
    pub history_grace_days: u32,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self::new("data_cache")
    }
}

impl DatasetConfig {
    /// Creates a configuration rooted at `base_dir` with default windows.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            price_lookback_days: DEFAULT_PRICE_LOOKBACK_DAYS,
            disclosure_lookback_days: DEFAULT_DISCLOSURE_LOOKBACK_DAYS,
            history_grace_days: DEFAULT_HISTORY_GRACE_DAYS,
        }
    }

    /// Sets the price lookback.
    #[must_use]
    pub const fn with_price_lookback_days(mut self, days: u32) -> Self {
        self.price_lookback_days = days;
        self
    }

    /// Sets the announcement lookback.
    #[must_use]
    pub const fn with_disclosure_lookback_days(mut self, days: u32) -> Self {
        self.disclosure_lookback_days = days;
        self
    }

    /// Sets the history grace period.
    #[must_use]
    pub const fn with_history_grace_days(mut self, days: u32) -> Self {
        self.history_grace_days = days;
        self
    }

    /// Root of the cache tree.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// First day of the price window ending at `as_of`.
    #[must_use]
    pub fn price_window_start(&self, as_of: NaiveDate) -> NaiveDate {
        days_before(as_of, self.price_lookback_days)
    }

    /// Oldest date a price cache must reach to serve `as_of` without a refresh.
    #[must_use]
    pub fn required_history_start(&self, as_of: NaiveDate) -> NaiveDate {
        let required = self
            .price_lookback_days
            .saturating_sub(self.history_grace_days);
        days_before(as_of, required)
    }

    /// First day of the announcement window ending at `as_of`.
    #[must_use]
    pub fn disclosure_window_start(&self, as_of: NaiveDate, lookback_override: Option<u32>) -> NaiveDate {
        days_before(as_of, lookback_override.unwrap_or(self.disclosure_lookback_days))
    }
}

fn days_before(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}
