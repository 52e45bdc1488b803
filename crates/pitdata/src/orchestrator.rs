//! Cache orchestration: decides per cache kind whether a refresh is needed and runs it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use pitdata_cache::artifact::{self, PRICE_FILE};
use pitdata_cache::{CacheRegistry, CacheStatusChecker, RefreshLocks, read_metadata, record_refresh};
use pitdata_core::{
    CacheKind, DatasetError, EntityIdentity, FetchRequest, Fetcher, Result,
};

use crate::config::DatasetConfig;

/// What [`EntityCacheOrchestrator::ensure_fresh`] did for one kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cache was usable as is.
    Fresh,
    /// The fetcher ran and the refresh was recorded.
    Refreshed {
        /// Number of files the fetcher reported writing.
        files_written: usize,
    },
    /// The kind does not exist for the entity's market class.
    NotApplicable,
}

/// Which kinds to ensure and which to force.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnsureFlags {
    /// Refresh every kind regardless of freshness.
    pub force_refresh: bool,
    /// Refresh statements and share counts regardless of freshness.
    pub force_refresh_financials: bool,
    /// Refresh prices regardless of freshness.
    pub force_refresh_prices: bool,
    /// Refresh announcements regardless of freshness.
    pub force_refresh_disclosures: bool,
    /// Also ensure announcements.
    pub include_disclosures: bool,
}

impl EnsureFlags {
    /// Whether `kind` is forced.
    #[must_use]
    pub const fn force_for(&self, kind: CacheKind) -> bool {
        self.force_refresh
            || match kind {
                CacheKind::Financials | CacheKind::ShareInfo => self.force_refresh_financials,
                CacheKind::PriceSeries => self.force_refresh_prices,
                CacheKind::Disclosures => self.force_refresh_disclosures,
                CacheKind::BasicSnapshot => false,
            }
    }

    /// Dataset kinds selected by these flags, before market class rules.
    #[must_use]
    pub fn selected_kinds(&self) -> Vec<CacheKind> {
        let mut kinds = vec![
            CacheKind::Financials,
            CacheKind::PriceSeries,
            CacheKind::ShareInfo,
        ];
        if self.include_disclosures {
            kinds.push(CacheKind::Disclosures);
        }
        kinds
    }
}

/// Keeps per-entity cache directories fresh through an injected [`Fetcher`].
///
/// Refreshes of one cache directory are serialized with a per-directory lock;
/// different entities and kinds refresh in parallel. Fetch errors are
/// surfaced unchanged and never retried here.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = EntityCacheOrchestrator::new(
///     DatasetConfig::new("./cache"),
///     Arc::new(CacheRegistry::builtin()),
///     Arc::new(FixtureFetcher::new()),
/// );
/// let outcome = orchestrator
///     .ensure_fresh(&entity, CacheKind::PriceSeries, as_of, false)
///     .await?;
/// ```
pub struct EntityCacheOrchestrator {
    config: DatasetConfig,
    registry: Arc<CacheRegistry>,
    checker: CacheStatusChecker,
    fetcher: Arc<dyn Fetcher>,
    locks: Arc<RefreshLocks>,
}

impl std::fmt::Debug for EntityCacheOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCacheOrchestrator")
            .field("base_dir", &self.config.base_dir)
            .field("fetcher", &self.fetcher.name())
            .field("locked_dirs", &self.locks.len())
            .finish()
    }
}

impl EntityCacheOrchestrator {
    /// Creates an orchestrator with its own lock table.
    #[must_use]
    pub fn new(config: DatasetConfig, registry: Arc<CacheRegistry>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_locks(config, registry, fetcher, Arc::new(RefreshLocks::new()))
    }

    /// Creates an orchestrator sharing `locks` with other orchestrators over the same tree.
    #[must_use]
    pub fn with_locks(
        config: DatasetConfig,
        registry: Arc<CacheRegistry>,
        fetcher: Arc<dyn Fetcher>,
        locks: Arc<RefreshLocks>,
    ) -> Self {
        let checker = CacheStatusChecker::new(Arc::clone(&registry));
        debug!(fetcher = fetcher.name(), base_dir = %config.base_dir.display(), "Creating cache orchestrator");
        Self {
            config,
            registry,
            checker,
            fetcher,
            locks,
        }
    }

    /// Dataset configuration.
    #[must_use]
    pub const fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Cache policy table.
    #[must_use]
    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    /// Status checker over the same policy table.
    #[must_use]
    pub const fn checker(&self) -> &CacheStatusChecker {
        &self.checker
    }

    /// Directory of `kind` for `entity`, optionally created.
    ///
    /// # Errors
    /// Returns [`DatasetError::Io`] if the directory cannot be created.
    pub fn cache_dir(
        &self,
        entity: &EntityIdentity,
        kind: CacheKind,
        ensure: bool,
    ) -> Result<std::path::PathBuf> {
        self.registry
            .resolve_directory(&self.config.base_dir, entity, kind, ensure)
            .map_err(|e| DatasetError::io(self.config.base_dir.join(entity.bucket_id()), e))
    }

    /// Makes sure `kind` is fresh for `entity`, refreshing it if needed.
    ///
    /// # Errors
    /// Returns [`DatasetError::Fetch`] when the fetcher fails, and
    /// [`DatasetError::Io`] when directories or metadata cannot be written.
    #[instrument(skip(self), fields(entity = %entity))]
    pub async fn ensure_fresh(
        &self,
        entity: &EntityIdentity,
        kind: CacheKind,
        as_of: NaiveDate,
        force: bool,
    ) -> Result<RefreshOutcome> {
        if !entity.market_class().supports(kind) {
            debug!(market = %entity.market_class(), "Kind not applicable, skipping");
            return Ok(RefreshOutcome::NotApplicable);
        }

        let started = Utc::now();
        let dir = self.cache_dir(entity, kind, true)?;
        if !self.needs_refresh(&dir, kind, as_of, force) {
            debug!("Cache is fresh");
            return Ok(RefreshOutcome::Fresh);
        }

        let _guard = self.locks.acquire(&dir).await;

        // Another caller may have refreshed while we waited.
        if self.refreshed_since(&dir, kind, started) {
            debug!("Refreshed by a concurrent caller");
            return Ok(RefreshOutcome::Fresh);
        }
        if !self.needs_refresh(&dir, kind, as_of, force) {
            return Ok(RefreshOutcome::Fresh);
        }

        let history_start = self.history_start(kind, as_of);
        let request = FetchRequest {
            entity,
            kind,
            as_of,
            history_start,
            target_dir: &dir,
        };
        debug!(fetcher = self.fetcher.name(), %history_start, "Refreshing cache");

        let outcome = self.fetcher.fetch(&request).await.map_err(|source| {
            warn!(fetcher = self.fetcher.name(), error = %source, "Fetch failed");
            DatasetError::Fetch {
                entity: entity.symbol(),
                kind,
                source,
            }
        })?;

        let mut extra = serde_json::Map::new();
        extra.insert("fetcher".to_string(), self.fetcher.name().into());
        extra.insert("as_of".to_string(), as_of.to_string().into());
        extra.insert(
            "files_written".to_string(),
            outcome.written_files.len().into(),
        );
        record_refresh(&dir, outcome.furthest_history_reached, extra)
            .map_err(|e| DatasetError::io(&dir, e))?;

        info!(files = outcome.written_files.len(), "Cache refreshed");
        Ok(RefreshOutcome::Refreshed {
            files_written: outcome.written_files.len(),
        })
    }

    /// Ensures every kind selected by `flags` that applies to `entity`.
    ///
    /// Kinds are ensured concurrently. Every kind runs to completion; the
    /// first error in kind order is returned afterwards.
    ///
    /// # Errors
    /// Returns the first error any kind produced.
    #[instrument(skip(self, flags), fields(entity = %entity))]
    pub async fn ensure_entity_data(
        &self,
        entity: &EntityIdentity,
        as_of: NaiveDate,
        flags: &EnsureFlags,
    ) -> Result<BTreeMap<CacheKind, RefreshOutcome>> {
        let kinds = flags.selected_kinds();
        let results = join_all(
            kinds
                .iter()
                .map(|&kind| self.ensure_fresh(entity, kind, as_of, flags.force_for(kind))),
        )
        .await;

        let mut outcomes = BTreeMap::new();
        let mut first_error = None;
        for (kind, result) in kinds.into_iter().zip(results) {
            match result {
                Ok(outcome) => {
                    outcomes.insert(kind, outcome);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    fn needs_refresh(&self, dir: &Path, kind: CacheKind, as_of: NaiveDate, force: bool) -> bool {
        if self.checker.should_refresh(dir, kind, force) {
            return true;
        }
        kind == CacheKind::PriceSeries && !self.covers_history(dir, as_of)
    }

    /// Whether the price cache reaches back far enough for `as_of`.
    ///
    /// A cache whose metadata shows upstream was already asked for data at
    /// least as old as required counts as covering, since the provider has
    /// nothing older to give. That record is never re-checked.
    fn covers_history(&self, dir: &Path, as_of: NaiveDate) -> bool {
        let required_start = self.config.required_history_start(as_of);
        let earliest = artifact::read_prices(&dir.join(PRICE_FILE))
            .ok()
            .and_then(|bars| bars.first().map(|bar| bar.trade_date));
        if earliest.is_some_and(|earliest| earliest <= required_start) {
            return true;
        }

        let furthest = read_metadata(dir).and_then(|meta| meta.furthest_history());
        if furthest.is_some_and(|furthest| furthest <= required_start) {
            debug!(
                ?earliest,
                ?furthest,
                %required_start,
                "Upstream already asked for older history, not refetching"
            );
            return true;
        }

        debug!(?earliest, %required_start, "Cached prices do not reach back far enough");
        false
    }

    fn refreshed_since(&self, dir: &Path, kind: CacheKind, since: chrono::DateTime<Utc>) -> bool {
        let status = self.checker.check(dir, kind);
        status.missing_required_files.is_empty()
            && status.last_updated.is_some_and(|ts| ts >= since)
    }

    fn history_start(&self, kind: CacheKind, as_of: NaiveDate) -> NaiveDate {
        match kind {
            CacheKind::Disclosures => self.config.disclosure_window_start(as_of, None),
            _ => self.config.price_window_start(as_of),
        }
    }
}
