//! Immutable datasets handed to callers.
//!
//! A [`PreparedDataset`] is assembled fresh for each request from on-disk
//! artifacts that have already been filtered to the as-of date. It is never
//! cached itself, and exposes its contents through shared references only.

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::path::{Path, PathBuf};

use crate::types::{Disclosure, EntityIdentity, FinancialRow, PriceBar, ShareFact, StatementKind};

/// Price bars inside the lookback window, ascending by trade date.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
    start: NaiveDate,
    end: NaiveDate,
    source_path: PathBuf,
}

impl PriceSeries {
    /// Creates a series over `[start, end]` read from `source_path`.
    #[must_use]
    pub fn new(bars: Vec<PriceBar>, start: NaiveDate, end: NaiveDate, source_path: PathBuf) -> Self {
        Self {
            bars,
            start,
            end,
            source_path,
        }
    }

    /// Bars in ascending date order.
    #[must_use]
    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    /// First day of the window (inclusive).
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the window (inclusive), the as-of date.
    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// File the bars were read from.
    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Number of bars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Returns true if there are no bars.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Most recent bar at or before the as-of date.
    #[must_use]
    pub fn latest(&self) -> Option<&PriceBar> {
        self.bars.last()
    }
}

/// Statement rows visible at the as-of date.
#[derive(Clone, Debug, Default)]
pub struct FinancialStatements {
    income: Vec<FinancialRow>,
    balance: Vec<FinancialRow>,
    cash_flow: Vec<FinancialRow>,
    abstract_table: Option<DataFrame>,
}

impl FinancialStatements {
    /// Creates the statement set from already filtered rows.
    #[must_use]
    pub fn new(
        income: Vec<FinancialRow>,
        balance: Vec<FinancialRow>,
        cash_flow: Vec<FinancialRow>,
    ) -> Self {
        Self {
            income,
            balance,
            cash_flow,
            abstract_table: None,
        }
    }

    /// Attaches the wide financial abstract (one column per visible period).
    #[must_use]
    pub fn with_abstract_table(mut self, table: DataFrame) -> Self {
        self.abstract_table = Some(table);
        self
    }

    /// Rows of one statement.
    #[must_use]
    pub fn rows(&self, statement: StatementKind) -> &[FinancialRow] {
        match statement {
            StatementKind::Income => &self.income,
            StatementKind::Balance => &self.balance,
            StatementKind::CashFlow => &self.cash_flow,
        }
    }

    /// Wide financial abstract, when the cache carries one.
    #[must_use]
    pub const fn abstract_table(&self) -> Option<&DataFrame> {
        self.abstract_table.as_ref()
    }

    /// Most recent reporting period across the income statement.
    #[must_use]
    pub fn latest_period(&self) -> Option<NaiveDate> {
        self.income.iter().map(|row| row.report_period_end).max()
    }
}

/// Announcements published inside the disclosure lookback window, newest first.
#[derive(Clone, Debug, PartialEq)]
pub struct DisclosureWindow {
    items: Vec<Disclosure>,
    start: NaiveDate,
    end: NaiveDate,
    source_path: Option<PathBuf>,
}

impl DisclosureWindow {
    /// Creates a window over `[start, end]`.
    #[must_use]
    pub fn new(
        items: Vec<Disclosure>,
        start: NaiveDate,
        end: NaiveDate,
        source_path: Option<PathBuf>,
    ) -> Self {
        Self {
            items,
            start,
            end,
            source_path,
        }
    }

    /// Announcements, newest first.
    #[must_use]
    pub fn items(&self) -> &[Disclosure] {
        &self.items
    }

    /// First day of the window (inclusive).
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the window (inclusive).
    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// File the announcements were read from.
    #[must_use]
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}

/// Point-in-time dataset for one entity.
///
/// No value inside was publicly known after [`as_of`](Self::as_of).
#[derive(Clone, Debug)]
pub struct PreparedDataset {
    entity: EntityIdentity,
    as_of: NaiveDate,
    prices: PriceSeries,
    financials: Option<FinancialStatements>,
    share_info: Option<ShareFact>,
    disclosures: Option<DisclosureWindow>,
}

impl PreparedDataset {
    /// Creates a dataset carrying only prices.
    #[must_use]
    pub const fn new(entity: EntityIdentity, as_of: NaiveDate, prices: PriceSeries) -> Self {
        Self {
            entity,
            as_of,
            prices,
            financials: None,
            share_info: None,
            disclosures: None,
        }
    }

    /// Attaches statement data.
    #[must_use]
    pub fn with_financials(mut self, financials: FinancialStatements) -> Self {
        self.financials = Some(financials);
        self
    }

    /// Attaches the share fact in effect at the as-of date.
    #[must_use]
    pub fn with_share_info(mut self, share_info: ShareFact) -> Self {
        self.share_info = Some(share_info);
        self
    }

    /// Attaches announcements.
    #[must_use]
    pub fn with_disclosures(mut self, disclosures: DisclosureWindow) -> Self {
        self.disclosures = Some(disclosures);
        self
    }

    /// Entity the dataset describes.
    #[must_use]
    pub const fn entity(&self) -> &EntityIdentity {
        &self.entity
    }

    /// Cutoff date of the dataset.
    #[must_use]
    pub const fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Price bars.
    #[must_use]
    pub const fn prices(&self) -> &PriceSeries {
        &self.prices
    }

    /// Statement data; `None` for funds and indices.
    #[must_use]
    pub const fn financials(&self) -> Option<&FinancialStatements> {
        self.financials.as_ref()
    }

    /// Share counts; `None` when the market class has no provider of record.
    #[must_use]
    pub const fn share_info(&self) -> Option<&ShareFact> {
        self.share_info.as_ref()
    }

    /// Announcements, when requested.
    #[must_use]
    pub const fn disclosures(&self) -> Option<&DisclosureWindow> {
        self.disclosures.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::MarketClass;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn prices(bars: Vec<PriceBar>) -> PriceSeries {
        PriceSeries::new(
            bars,
            date(2024, 6, 1),
            date(2024, 6, 28),
            PathBuf::from("/cache/price.csv"),
        )
    }

    #[test]
    fn test_price_series_latest() {
        let empty = prices(Vec::new());
        assert!(empty.is_empty());
        assert!(empty.latest().is_none());

        let series = prices(vec![
            PriceBar::new(date(2024, 6, 26), 10.0, 11.0, 9.0, 10.5, 1000.0),
            PriceBar::new(date(2024, 6, 27), 10.5, 12.0, 10.0, 11.5, 1200.0),
        ]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.latest().unwrap().trade_date, date(2024, 6, 27));
        assert_eq!(series.source_path(), Path::new("/cache/price.csv"));
        assert_eq!((series.start(), series.end()), (date(2024, 6, 1), date(2024, 6, 28)));
    }

    #[test]
    fn test_financial_statements() {
        let statements = FinancialStatements::new(
            vec![
                FinancialRow::new(date(2023, 12, 31), Some(date(2024, 3, 30))),
                FinancialRow::new(date(2024, 3, 31), Some(date(2024, 4, 27))),
            ],
            vec![FinancialRow::new(date(2024, 3, 31), None)],
            Vec::new(),
        );
        assert_eq!(statements.latest_period(), Some(date(2024, 3, 31)));
        assert_eq!(statements.rows(StatementKind::Income).len(), 2);
        assert_eq!(statements.rows(StatementKind::Balance).len(), 1);
        assert!(statements.rows(StatementKind::CashFlow).is_empty());
        assert!(statements.abstract_table().is_none());

        let table = polars::prelude::df!(
            "item" => ["revenue", "net_profit"],
            "20240331" => [1.0, 0.4],
        )
        .unwrap();
        let statements = statements.with_abstract_table(table);
        assert_eq!(statements.abstract_table().map(DataFrame::width), Some(2));
        assert_eq!(FinancialStatements::default().latest_period(), None);
    }

    #[test]
    fn test_disclosure_window_source() {
        let without = DisclosureWindow::new(Vec::new(), date(2024, 5, 29), date(2024, 6, 28), None);
        assert!(without.source_path().is_none());

        let item = Disclosure {
            publish_time: date(2024, 6, 20).and_hms_opt(18, 30, 0).unwrap(),
            title: "Annual dividend".to_string(),
            category: None,
            url: None,
        };
        let with = DisclosureWindow::new(
            vec![item],
            date(2024, 5, 29),
            date(2024, 6, 28),
            Some(PathBuf::from("/cache/disclosures.csv")),
        );
        assert_eq!(with.source_path(), Some(Path::new("/cache/disclosures.csv")));
        assert_eq!(with.items()[0].title, "Annual dividend");
    }

    #[test]
    fn test_prepared_dataset_builders() {
        let entity = EntityIdentity::parse("600519.SH").unwrap();
        let as_of = date(2024, 6, 28);
        let dataset = PreparedDataset::new(entity.clone(), as_of, prices(Vec::new()));
        assert_eq!(dataset.entity(), &entity);
        assert_eq!(dataset.as_of(), as_of);
        assert!(dataset.financials().is_none());
        assert!(dataset.share_info().is_none());
        assert!(dataset.disclosures().is_none());

        let share = ShareFact {
            effective_date: date(2024, 1, 2),
            total_shares: 1_256_197_800.0,
            float_shares: 1_256_197_800.0,
            source_tag: "cninfo".to_string(),
        };
        let dataset = dataset
            .with_financials(FinancialStatements::default())
            .with_share_info(share.clone())
            .with_disclosures(DisclosureWindow::new(Vec::new(), date(2024, 5, 29), as_of, None));
        assert!(dataset.financials().is_some());
        assert_eq!(dataset.share_info(), Some(&share));
        assert_eq!(dataset.disclosures().map(DisclosureWindow::end), Some(as_of));
        assert_eq!(dataset.entity().market_class(), MarketClass::CnEquity);
    }
}
