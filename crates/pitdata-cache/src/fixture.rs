//! In-memory fetcher for tests and development.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use pitdata_core::{
    CacheKind, Disclosure, FetchError, FetchOutcome, FetchRequest, Fetcher, FinancialRow, PriceBar,
    ShareFact, StatementKind,
};
use polars::prelude::DataFrame;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::artifact::{self, ABSTRACT_FILE, DISCLOSURES_FILE, PRICE_FILE, SHARE_FACTS_FILE};

const FIXTURE_NAME: &str = "fixture";

/// Everything the fixture fetcher knows about one entity.
#[derive(Clone, Debug, Default)]
pub struct EntityFixture {
    prices: Vec<PriceBar>,
    income: Vec<FinancialRow>,
    balance: Vec<FinancialRow>,
    cash_flow: Vec<FinancialRow>,
    abstract_table: Option<DataFrame>,
    share_facts: Vec<ShareFact>,
    disclosures: Vec<Disclosure>,
}

impl EntityFixture {
    /// Creates an empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the price bars.
    #[must_use]
    pub fn with_prices(mut self, prices: Vec<PriceBar>) -> Self {
        self.prices = prices;
        self
    }

    /// Sets the rows of one statement.
    #[must_use]
    pub fn with_statement(mut self, statement: StatementKind, rows: Vec<FinancialRow>) -> Self {
        match statement {
            StatementKind::Income => self.income = rows,
            StatementKind::Balance => self.balance = rows,
            StatementKind::CashFlow => self.cash_flow = rows,
        }
        self
    }

    /// Sets the wide financial abstract.
    #[must_use]
    pub fn with_abstract_table(mut self, table: DataFrame) -> Self {
        self.abstract_table = Some(table);
        self
    }

    /// Sets the share facts.
    #[must_use]
    pub fn with_share_facts(mut self, facts: Vec<ShareFact>) -> Self {
        self.share_facts = facts;
        self
    }

    /// Sets the announcements.
    #[must_use]
    pub fn with_disclosures(mut self, items: Vec<Disclosure>) -> Self {
        self.disclosures = items;
        self
    }

    fn statement(&self, statement: StatementKind) -> &[FinancialRow] {
        match statement {
            StatementKind::Income => &self.income,
            StatementKind::Balance => &self.balance,
            StatementKind::CashFlow => &self.cash_flow,
        }
    }
}

/// Fetcher serving preloaded fixtures.
///
/// Every call is counted per (symbol, kind), failures can be injected per
/// symbol or per kind, and an optional delay simulates upstream latency.
/// It reports the requested history start as the furthest history reached.
#[derive(Debug, Default)]
pub struct FixtureFetcher {
    fixtures: RwLock<HashMap<String, EntityFixture>>,
    failures: DashSet<(String, CacheKind)>,
    calls: DashMap<(String, CacheKind), usize>,
    delay: Option<Duration>,
}

impl FixtureFetcher {
    /// Creates a fetcher with no fixtures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` before serving each call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Registers (or replaces) the fixture of `symbol`.
    pub async fn insert(&self, symbol: impl Into<String>, fixture: EntityFixture) {
        let mut fixtures = self.fixtures.write().await;
        fixtures.insert(symbol.into(), fixture);
    }

    /// Makes every fetch for `symbol` fail.
    pub fn fail_for(&self, symbol: &str) {
        for kind in CacheKind::ALL {
            self.fail_kind(symbol, kind);
        }
    }

    /// Makes fetches of `kind` for `symbol` fail.
    pub fn fail_kind(&self, symbol: &str, kind: CacheKind) {
        self.failures.insert((symbol.to_string(), kind));
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Number of fetches of `kind` for `symbol` so far.
    #[must_use]
    pub fn calls(&self, symbol: &str, kind: CacheKind) -> usize {
        self.calls
            .get(&(symbol.to_string(), kind))
            .map_or(0, |count| *count)
    }

    /// Number of fetches for any symbol and kind so far.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    fn write(
        dir: &Path,
        symbol: &str,
        kind: CacheKind,
        fixture: &EntityFixture,
    ) -> Result<Vec<PathBuf>, FetchError> {
        let mut written = Vec::new();
        match kind {
            CacheKind::PriceSeries => {
                let path = dir.join(PRICE_FILE);
                artifact::write_prices(&path, &fixture.prices).map_err(write_error(&path))?;
                written.push(path);
            }
            CacheKind::Financials => {
                for statement in StatementKind::ALL {
                    let path = dir.join(statement.file_name());
                    artifact::write_statement(&path, fixture.statement(statement))
                        .map_err(write_error(&path))?;
                    written.push(path);
                }
                if let Some(table) = &fixture.abstract_table {
                    let path = dir.join(ABSTRACT_FILE);
                    artifact::write_abstract_table(&path, table).map_err(write_error(&path))?;
                    written.push(path);
                }
            }
            CacheKind::ShareInfo => {
                let path = dir.join(SHARE_FACTS_FILE);
                artifact::write_share_facts(&path, &fixture.share_facts)
                    .map_err(write_error(&path))?;
                written.push(path);
            }
            CacheKind::Disclosures => {
                let path = dir.join(DISCLOSURES_FILE);
                artifact::write_disclosures(&path, &fixture.disclosures)
                    .map_err(write_error(&path))?;
                written.push(path);

                let index = dir.join("index.json");
                let body = serde_json::json!({
                    "symbol": symbol,
                    "count": fixture.disclosures.len(),
                });
                std::fs::write(&index, body.to_string()).map_err(write_error(&index))?;
                written.push(index);
            }
            CacheKind::BasicSnapshot => {
                let path = dir.join("basic_info.json");
                let body = serde_json::json!({ "symbol": symbol, "source": FIXTURE_NAME });
                std::fs::write(&path, body.to_string()).map_err(write_error(&path))?;
                written.push(path);
            }
        }
        Ok(written)
    }
}

fn write_error<E: std::fmt::Display>(path: &Path) -> impl FnOnce(E) -> FetchError + '_ {
    move |e| FetchError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    fn name(&self) -> &str {
        FIXTURE_NAME
    }

    #[instrument(skip(self, request), fields(entity = %request.entity, kind = %request.kind))]
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchOutcome, FetchError> {
        let symbol = request.entity.symbol();
        *self.calls.entry((symbol.clone(), request.kind)).or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failures.contains(&(symbol.clone(), request.kind)) {
            debug!("Injected fixture failure");
            return Err(FetchError::Upstream {
                provider: FIXTURE_NAME.to_string(),
                message: format!("injected failure for {symbol}"),
            });
        }

        let fixtures = self.fixtures.read().await;
        let Some(fixture) = fixtures.get(&symbol) else {
            return Err(FetchError::Upstream {
                provider: FIXTURE_NAME.to_string(),
                message: format!("no fixture for {symbol}"),
            });
        };

        let written = Self::write(request.target_dir, &symbol, request.kind, fixture)?;
        debug!(files = written.len(), "Served fixture");
        Ok(FetchOutcome::new(written).with_furthest_history(request.history_start))
    }
}
