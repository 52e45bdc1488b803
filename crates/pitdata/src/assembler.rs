//! Dataset assembly: ensure fresh caches, read artifacts, apply the as-of cutoff.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use pitdata_cache::ArtifactError;
use pitdata_cache::artifact::{
    self, ABSTRACT_FILE, DISCLOSURES_FILE, PRICE_FILE, SHARE_FACTS_FILE,
};
use pitdata_cache::{CacheRegistry, RefreshLocks};
use pitdata_core::{
    CacheKind, DatasetError, DisclosureWindow, EntityIdentity, Fetcher, FinancialStatements,
    PreparedDataset, PriceSeries, Result, StatementKind,
};

use crate::config::DatasetConfig;
use crate::cutoff;
use crate::orchestrator::{EnsureFlags, EntityCacheOrchestrator};

/// Per-call options of [`DatasetAssembler::prepare_dataset`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Which kinds to ensure and force.
    pub ensure: EnsureFlags,
    /// Announcement lookback for this call, overriding the configured one.
    pub disclosure_lookback_days: Option<u32>,
    /// Abort the call with [`DatasetError::Timeout`] once this much time has passed.
    pub deadline: Option<Duration>,
}

impl PrepareOptions {
    /// Refreshes every kind.
    #[must_use]
    pub const fn with_force_refresh(mut self) -> Self {
        self.ensure.force_refresh = true;
        self
    }

    /// Refreshes statements and share counts.
    #[must_use]
    pub const fn with_force_refresh_financials(mut self) -> Self {
        self.ensure.force_refresh_financials = true;
        self
    }

    /// Refreshes prices.
    #[must_use]
    pub const fn with_force_refresh_prices(mut self) -> Self {
        self.ensure.force_refresh_prices = true;
        self
    }

    /// Refreshes announcements.
    #[must_use]
    pub const fn with_force_refresh_disclosures(mut self) -> Self {
        self.ensure.force_refresh_disclosures = true;
        self
    }

    /// Includes announcements in the dataset.
    #[must_use]
    pub const fn with_disclosures(mut self) -> Self {
        self.ensure.include_disclosures = true;
        self
    }

    /// Overrides the announcement lookback.
    #[must_use]
    pub const fn with_disclosure_lookback_days(mut self, days: u32) -> Self {
        self.disclosure_lookback_days = Some(days);
        self
    }

    /// Sets a deadline for the whole call.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Parses an as-of date given as `YYYY-MM-DD` or `YYYYMMDD`.
///
/// # Errors
/// Returns [`DatasetError::Validation`] for anything else.
pub fn parse_as_of(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .map_err(|_| {
            DatasetError::Validation(format!(
                "as-of date {raw:?} is invalid, expected YYYY-MM-DD"
            ))
        })
}

/// Builder for [`DatasetAssembler`].
#[derive(Debug)]
pub struct AssemblerBuilder {
    config: DatasetConfig,
    registry: Option<Arc<CacheRegistry>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    locks: Option<Arc<RefreshLocks>>,
}

impl AssemblerBuilder {
    /// Uses `registry` instead of the built-in policy table.
    #[must_use]
    pub fn registry(mut self, registry: Arc<CacheRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the fetcher used to refresh caches.
    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Shares a refresh lock table with other assemblers over the same tree.
    #[must_use]
    pub fn locks(mut self, locks: Arc<RefreshLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Builds the assembler. Without a fetcher, caches are never refreshed.
    #[must_use]
    pub fn build(self) -> DatasetAssembler {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(CacheRegistry::builtin()));
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(pitdata_cache::OfflineFetcher::new()));
        let locks = self.locks.unwrap_or_default();
        DatasetAssembler {
            orchestrator: Arc::new(EntityCacheOrchestrator::with_locks(
                self.config,
                registry,
                fetcher,
                locks,
            )),
        }
    }
}

/// Builds point-in-time datasets.
///
/// Each call ensures the entity's caches, verifies them, reads the artifacts
/// and applies the [`cutoff`](crate::cutoff) rules. The result is a fresh,
/// owned [`PreparedDataset`]. Cloning is cheap and clones share the cache
/// locks.
#[derive(Clone, Debug)]
pub struct DatasetAssembler {
    orchestrator: Arc<EntityCacheOrchestrator>,
}

impl DatasetAssembler {
    /// Starts a builder over `config`.
    #[must_use]
    pub const fn builder(config: DatasetConfig) -> AssemblerBuilder {
        AssemblerBuilder {
            config,
            registry: None,
            fetcher: None,
            locks: None,
        }
    }

    /// Wraps an existing orchestrator.
    #[must_use]
    pub const fn new(orchestrator: Arc<EntityCacheOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Orchestrator keeping the caches fresh.
    #[must_use]
    pub fn orchestrator(&self) -> &EntityCacheOrchestrator {
        &self.orchestrator
    }

    /// Prepares the dataset of `entity` as known on `as_of`.
    ///
    /// # Errors
    /// - [`DatasetError::Validation`] for a malformed symbol or date
    /// - [`DatasetError::Fetch`] when a needed refresh fails
    /// - [`DatasetError::CacheIntegrity`] when a cache is incomplete or unreadable after the refresh step
    /// - [`DatasetError::DataUnavailable`] when a required component is empty after filtering
    /// - [`DatasetError::Timeout`] when the deadline elapses
    pub async fn prepare_dataset(
        &self,
        entity: &str,
        as_of: &str,
        options: &PrepareOptions,
    ) -> Result<PreparedDataset> {
        let entity = EntityIdentity::parse(entity)?;
        let as_of = parse_as_of(as_of)?;
        self.prepare_for(&entity, as_of, options).await
    }

    /// Prepares the dataset of an already parsed entity.
    ///
    /// # Errors
    /// See [`prepare_dataset`](Self::prepare_dataset).
    pub async fn prepare_for(
        &self,
        entity: &EntityIdentity,
        as_of: NaiveDate,
        options: &PrepareOptions,
    ) -> Result<PreparedDataset> {
        match options.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.assemble(entity, as_of, options))
                .await
                .map_err(|_| DatasetError::Timeout {
                    entity: entity.symbol(),
                    elapsed: deadline,
                })?,
            None => self.assemble(entity, as_of, options).await,
        }
    }

    #[instrument(skip(self, options), fields(entity = %entity, %as_of))]
    async fn assemble(
        &self,
        entity: &EntityIdentity,
        as_of: NaiveDate,
        options: &PrepareOptions,
    ) -> Result<PreparedDataset> {
        let started = Utc::now();
        let outcomes = self
            .orchestrator
            .ensure_entity_data(entity, as_of, &options.ensure)
            .await?;
        debug!(?outcomes, "Caches ensured");

        let config = self.orchestrator.config();
        let market = entity.market_class();

        let prices = self.load_prices(entity, as_of, started)?;
        let mut dataset = PreparedDataset::new(entity.clone(), as_of, prices);

        if market.supports(CacheKind::Financials) {
            dataset = dataset.with_financials(self.load_financials(entity, as_of, started)?);
        }

        if market.supports(CacheKind::ShareInfo) {
            let dir = self.verified_dir(entity, CacheKind::ShareInfo, started)?;
            let facts = read_artifact(entity, CacheKind::ShareInfo, || {
                artifact::read_share_facts(&dir.join(SHARE_FACTS_FILE))
            })?;
            let fact = cutoff::select_share_fact(&facts, as_of).ok_or_else(|| {
                DatasetError::DataUnavailable {
                    entity: entity.symbol(),
                    kind: CacheKind::ShareInfo,
                    start: "-".to_string(),
                    end: as_of.to_string(),
                }
            })?;
            dataset = dataset.with_share_info(fact);
        }

        if options.ensure.include_disclosures && market.supports(CacheKind::Disclosures) {
            let dir = self.verified_dir(entity, CacheKind::Disclosures, started)?;
            let path = dir.join(DISCLOSURES_FILE);
            let items = read_artifact(entity, CacheKind::Disclosures, || {
                artifact::read_disclosures(&path)
            })?;
            let start = config.disclosure_window_start(as_of, options.disclosure_lookback_days);
            let items = cutoff::filter_disclosures(items, start, as_of);
            dataset = dataset.with_disclosures(DisclosureWindow::new(items, start, as_of, Some(path)));
        }

        info!(
            bars = dataset.prices().len(),
            financials = dataset.financials().is_some(),
            share_info = dataset.share_info().is_some(),
            disclosures = dataset.disclosures().map(|d| d.items().len()),
            "Prepared dataset"
        );
        Ok(dataset)
    }

    fn load_prices(
        &self,
        entity: &EntityIdentity,
        as_of: NaiveDate,
        started: DateTime<Utc>,
    ) -> Result<PriceSeries> {
        let dir = self.verified_dir(entity, CacheKind::PriceSeries, started)?;
        let path = dir.join(PRICE_FILE);
        let bars = read_artifact(entity, CacheKind::PriceSeries, || artifact::read_prices(&path))?;

        let start = self.orchestrator.config().price_window_start(as_of);
        let bars = cutoff::filter_prices(bars, start, as_of);
        if bars.is_empty() {
            return Err(DatasetError::DataUnavailable {
                entity: entity.symbol(),
                kind: CacheKind::PriceSeries,
                start: start.to_string(),
                end: as_of.to_string(),
            });
        }
        Ok(PriceSeries::new(bars, start, as_of, path))
    }

    fn load_financials(
        &self,
        entity: &EntityIdentity,
        as_of: NaiveDate,
        started: DateTime<Utc>,
    ) -> Result<FinancialStatements> {
        let dir = self.verified_dir(entity, CacheKind::Financials, started)?;
        let read = |statement: StatementKind| {
            read_artifact(entity, CacheKind::Financials, || {
                artifact::read_statement(&dir.join(statement.file_name()))
            })
        };

        let income = read(StatementKind::Income)?;
        let visibility = cutoff::visibility_map(&income);
        let income = cutoff::filter_statement_rows(income, as_of);
        if income.is_empty() {
            return Err(DatasetError::DataUnavailable {
                entity: entity.symbol(),
                kind: CacheKind::Financials,
                start: "-".to_string(),
                end: as_of.to_string(),
            });
        }
        let balance = cutoff::filter_statement_rows(read(StatementKind::Balance)?, as_of);
        let cash_flow = cutoff::filter_statement_rows(read(StatementKind::CashFlow)?, as_of);
        let mut statements = FinancialStatements::new(income, balance, cash_flow);

        let abstract_path = dir.join(ABSTRACT_FILE);
        if abstract_path.is_file() {
            let table = read_artifact(entity, CacheKind::Financials, || {
                artifact::read_abstract_table(&abstract_path)
            })?;
            let table = cutoff::filter_abstract_columns(&table, &visibility, as_of).map_err(|e| {
                DatasetError::integrity(entity.symbol(), CacheKind::Financials, e.to_string())
            })?;
            statements = statements.with_abstract_table(table);
        }
        Ok(statements)
    }

    /// Cache directory of `kind`, checked for completeness and freshness.
    ///
    /// A cache stamped during this call counts as fresh even if its TTL is zero.
    fn verified_dir(
        &self,
        entity: &EntityIdentity,
        kind: CacheKind,
        started: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let dir = self.orchestrator.cache_dir(entity, kind, false)?;
        let status = self.orchestrator.checker().check(&dir, kind);
        if !status.exists {
            return Err(DatasetError::integrity(
                entity.symbol(),
                kind,
                format!("cache directory {} does not exist", dir.display()),
            ));
        }
        if !status.missing_required_files.is_empty() {
            return Err(DatasetError::integrity(
                entity.symbol(),
                kind,
                format!(
                    "missing required files: {}",
                    status.missing_required_files.join(", ")
                ),
            ));
        }
        let refreshed_now = status.last_updated.is_some_and(|ts| ts >= started);
        if status.stale && !refreshed_now {
            return Err(DatasetError::integrity(
                entity.symbol(),
                kind,
                format!("cache still stale after refresh (last_updated={:?})", status.last_updated),
            ));
        }
        Ok(dir)
    }
}

fn read_artifact<T>(
    entity: &EntityIdentity,
    kind: CacheKind,
    read: impl FnOnce() -> std::result::Result<T, ArtifactError>,
) -> Result<T> {
    read().map_err(|e| DatasetError::integrity(entity.symbol(), kind, e.to_string()))
}
