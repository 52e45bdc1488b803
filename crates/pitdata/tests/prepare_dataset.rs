//! End-to-end dataset preparation against a temporary cache tree.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta, Utc};
use polars::prelude::{Column, DataFrame, NamedFrom};

use pitdata::{
    BatchOptions, BatchRunner, CacheKind, CacheRegistry, DatasetAssembler, DatasetConfig,
    DatasetError, Disclosure, EntityFixture, EntityIdentity, FetchError, FetchOutcome,
    FetchRequest, Fetcher, FinancialRow, FixtureFetcher, PrepareOptions, PriceBar,
    RefreshMetadata, ShareFact, StatementKind, artifact,
};
use pitdata_cache::{read_metadata, registry::PolicyOverrides, write_metadata};

const AS_OF: &str = "2024-06-28";

fn d(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

fn as_of() -> NaiveDate {
    d(AS_OF)
}

fn daily_bars(from: NaiveDate, to: NaiveDate) -> Vec<PriceBar> {
    from.iter_days()
        .take_while(|day| *day <= to)
        .enumerate()
        .map(|(i, day)| {
            let px = 100.0 + i as f64;
            PriceBar::new(day, px, px + 1.0, px - 1.0, px + 0.5, 1_000.0).with_turnover(0.8)
        })
        .collect()
}

fn share_fact(effective: &str, total: f64) -> ShareFact {
    ShareFact {
        effective_date: d(effective),
        total_shares: total,
        float_shares: total * 0.8,
        source_tag: "cninfo".to_string(),
    }
}

fn disclosure(at: &str, title: &str) -> Disclosure {
    Disclosure {
        publish_time: NaiveDate::parse_from_str(&at[..10], "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap(),
        title: title.to_string(),
        category: Some("periodic".to_string()),
        url: None,
    }
}

/// A listed stock with a statement for the period ending the day before
/// [`AS_OF`] that is only disclosed five days after it.
fn stock_fixture() -> EntityFixture {
    let as_of = as_of();
    let income = vec![
        FinancialRow::new(d("2023-12-31"), Some(d("2024-03-28"))).with_value("NETPROFIT", 100.0),
        FinancialRow::new(d("2024-03-31"), Some(d("2024-04-26"))).with_value("NETPROFIT", 30.0),
        FinancialRow::new(d("2024-06-27"), Some(d("2024-07-03"))).with_value("NETPROFIT", 7.0),
    ];
    let balance = vec![
        FinancialRow::new(d("2023-12-31"), Some(d("2024-03-28"))).with_value("TOTAL_ASSETS", 5e3),
        FinancialRow::new(d("2024-06-27"), Some(d("2024-07-03"))).with_value("TOTAL_ASSETS", 6e3),
    ];
    let cash_flow =
        vec![FinancialRow::new(d("2024-03-31"), None).with_value("NETCASH_OPERATE", 12.0)];
    let abstract_table = DataFrame::new(vec![
        Column::new("指标".into(), vec!["净利润"]),
        Column::new("20231231".into(), vec![100.0]),
        Column::new("20240331".into(), vec![30.0]),
        Column::new("20240627".into(), vec![7.0]),
    ])
    .unwrap();

    EntityFixture::new()
        .with_prices(daily_bars(
            as_of - TimeDelta::days(90),
            as_of + TimeDelta::days(10),
        ))
        .with_statement(StatementKind::Income, income)
        .with_statement(StatementKind::Balance, balance)
        .with_statement(StatementKind::CashFlow, cash_flow)
        .with_abstract_table(abstract_table)
        .with_share_facts(vec![
            share_fact("2023-07-01", 1.0e9),
            share_fact("2024-07-15", 1.2e9),
        ])
        .with_disclosures(vec![
            disclosure("2023-05-01", "too old"),
            disclosure("2024-06-18", "board meeting"),
            disclosure("2024-06-28", "same day"),
            disclosure("2024-06-29", "tomorrow"),
        ])
}

fn config(base: &Path) -> DatasetConfig {
    DatasetConfig::new(base)
        .with_price_lookback_days(60)
        .with_disclosure_lookback_days(365)
}

async fn fixture_fetcher(symbols: &[&str]) -> Arc<FixtureFetcher> {
    let fetcher = Arc::new(FixtureFetcher::new());
    for symbol in symbols {
        fetcher.insert(*symbol, stock_fixture()).await;
    }
    fetcher
}

fn assembler(base: &Path, fetcher: Arc<dyn Fetcher>) -> DatasetAssembler {
    DatasetAssembler::builder(config(base)).fetcher(fetcher).build()
}

/// Fetcher that reports success without writing anything.
#[derive(Debug)]
struct SilentFetcher;

#[async_trait]
impl Fetcher for SilentFetcher {
    fn name(&self) -> &str {
        "silent"
    }

    async fn fetch(&self, _request: &FetchRequest<'_>) -> Result<FetchOutcome, FetchError> {
        Ok(FetchOutcome::default())
    }
}

#[tokio::test]
async fn prepares_a_complete_stock_dataset() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = fixture_fetcher(&["600519.SH"]).await;
    let assembler = assembler(tmp.path(), fetcher.clone());

    let dataset = assembler
        .prepare_dataset("600519.sh", AS_OF, &PrepareOptions::default().with_disclosures())
        .await
        .unwrap();

    assert_eq!(dataset.entity().symbol(), "600519.SH");
    assert_eq!(dataset.as_of(), as_of());

    let prices = dataset.prices();
    assert_eq!(prices.start(), as_of() - TimeDelta::days(60));
    assert_eq!(prices.latest().unwrap().trade_date, as_of());
    assert_eq!(prices.len(), 61);
    assert!(prices.bars().windows(2).all(|w| w[0].trade_date < w[1].trade_date));

    let financials = dataset.financials().unwrap();
    assert_eq!(financials.rows(StatementKind::Income).len(), 2);
    assert_eq!(financials.rows(StatementKind::Balance).len(), 1);
    assert_eq!(financials.rows(StatementKind::CashFlow).len(), 1);
    assert_eq!(financials.latest_period(), Some(d("2024-03-31")));
    let table = financials.abstract_table().unwrap();
    let columns: Vec<&str> = table.get_column_names().iter().map(|c| c.as_str()).collect();
    assert_eq!(columns, vec!["指标", "20231231", "20240331"]);

    let share = dataset.share_info().unwrap();
    assert_eq!(share.effective_date, d("2023-07-01"));
    assert_eq!(share.source_tag, "cninfo");

    let disclosures = dataset.disclosures().unwrap();
    let titles: Vec<&str> = disclosures.items().iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["same day", "board meeting"]);
}

#[tokio::test]
async fn statement_is_hidden_until_its_disclosure_date() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = fixture_fetcher(&["600519.SH"]).await;
    let assembler = assembler(tmp.path(), fetcher.clone());
    let late_period = d("2024-06-27");

    let before = assembler
        .prepare_dataset("600519.SH", AS_OF, &PrepareOptions::default())
        .await
        .unwrap();
    let income = before.financials().unwrap().rows(StatementKind::Income);
    assert!(income.iter().all(|row| row.report_period_end != late_period));
    assert!(income.iter().all(|row| row.visibility_date() <= as_of()));

    let after = assembler
        .prepare_dataset("600519.SH", "2024-07-03", &PrepareOptions::default())
        .await
        .unwrap();
    let income = after.financials().unwrap().rows(StatementKind::Income);
    assert!(income.iter().any(|row| row.report_period_end == late_period));
    assert!(
        after
            .financials()
            .unwrap()
            .abstract_table()
            .unwrap()
            .column("20240627")
            .is_ok()
    );
}

#[tokio::test]
async fn second_call_does_not_refetch() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = fixture_fetcher(&["600519.SH"]).await;
    let assembler = assembler(tmp.path(), fetcher.clone());
    let options = PrepareOptions::default().with_disclosures();

    assembler.prepare_dataset("600519.SH", AS_OF, &options).await.unwrap();
    assembler.prepare_dataset("600519.SH", AS_OF, &options).await.unwrap();

    for kind in [
        CacheKind::Financials,
        CacheKind::PriceSeries,
        CacheKind::ShareInfo,
        CacheKind::Disclosures,
    ] {
        assert_eq!(fetcher.calls("600519.SH", kind), 1, "{kind}");
    }
}

#[tokio::test]
async fn expired_cache_is_refreshed() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = fixture_fetcher(&["600519.SH"]).await;
    let assembler = assembler(tmp.path(), fetcher.clone());
    assembler
        .prepare_dataset("600519.SH", AS_OF, &PrepareOptions::default())
        .await
        .unwrap();

    let entity = EntityIdentity::parse("600519.SH").unwrap();
    let dir = assembler
        .orchestrator()
        .cache_dir(&entity, CacheKind::PriceSeries, false)
        .unwrap();
    let mut meta = read_metadata(&dir).unwrap();
    meta.last_updated = Utc::now() - TimeDelta::days(2);
    write_metadata(&dir, &meta).unwrap();

    assembler
        .prepare_dataset("600519.SH", AS_OF, &PrepareOptions::default())
        .await
        .unwrap();
    assert_eq!(fetcher.calls("600519.SH", CacheKind::PriceSeries), 2);
    assert_eq!(fetcher.calls("600519.SH", CacheKind::Financials), 1);
}

#[tokio::test]
async fn stale_price_cache_scenario() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(FixtureFetcher::new());
    fetcher
        .insert(
            "510300.SH",
            EntityFixture::new().with_prices(daily_bars(
                as_of() - TimeDelta::days(30),
                as_of() + TimeDelta::days(5),
            )),
        )
        .await;
    let assembler = assembler(tmp.path(), fetcher.clone());

    // One bar ten days old, refreshed two days ago.
    let entity = EntityIdentity::parse("510300.SH").unwrap();
    let dir = assembler
        .orchestrator()
        .cache_dir(&entity, CacheKind::PriceSeries, true)
        .unwrap();
    artifact::write_prices(
        &dir.join(artifact::PRICE_FILE),
        &daily_bars(as_of() - TimeDelta::days(10), as_of() - TimeDelta::days(10)),
    )
    .unwrap();
    write_metadata(&dir, &RefreshMetadata::new(Utc::now() - TimeDelta::days(2))).unwrap();

    let dataset = assembler
        .prepare_dataset("510300.SH", AS_OF, &PrepareOptions::default())
        .await
        .unwrap();

    assert_eq!(fetcher.total_calls(), 1);
    assert_eq!(fetcher.calls("510300.SH", CacheKind::PriceSeries), 1);
    assert!(dataset.prices().bars().iter().all(|bar| bar.trade_date <= as_of()));
    assert_eq!(dataset.prices().latest().unwrap().trade_date, as_of());
    assert!(dataset.financials().is_none());
    assert!(dataset.share_info().is_none());
}

#[tokio::test]
async fn missing_file_after_refresh_is_an_integrity_error() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = fixture_fetcher(&["600519.SH"]).await;
    assembler(tmp.path(), fetcher)
        .prepare_dataset("600519.SH", AS_OF, &PrepareOptions::default())
        .await
        .unwrap();

    let entity = EntityIdentity::parse("600519.SH").unwrap();
    let registry = CacheRegistry::builtin();
    let dir = registry
        .resolve_directory(tmp.path(), &entity, CacheKind::Financials, false)
        .unwrap();
    std::fs::remove_file(dir.join("balance_sheet.csv")).unwrap();

    let err = assembler(tmp.path(), Arc::new(SilentFetcher))
        .prepare_dataset("600519.SH", AS_OF, &PrepareOptions::default())
        .await
        .unwrap_err();
    match err {
        DatasetError::CacheIntegrity { kind, reason, .. } => {
            assert_eq!(kind, CacheKind::Financials);
            assert!(reason.contains("balance_sheet.csv"), "{reason}");
        }
        other => panic!("expected integrity error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_file_is_restored_by_a_working_fetcher() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = fixture_fetcher(&["600519.SH"]).await;
    let assembler = assembler(tmp.path(), fetcher.clone());
    assembler
        .prepare_dataset("600519.SH", AS_OF, &PrepareOptions::default())
        .await
        .unwrap();

    let entity = EntityIdentity::parse("600519.SH").unwrap();
    let dir = assembler
        .orchestrator()
        .cache_dir(&entity, CacheKind::ShareInfo, false)
        .unwrap();
    std::fs::remove_file(dir.join(artifact::SHARE_FACTS_FILE)).unwrap();

    assembler
        .prepare_dataset("600519.SH", AS_OF, &PrepareOptions::default())
        .await
        .unwrap();
    assert_eq!(fetcher.calls("600519.SH", CacheKind::ShareInfo), 2);
}

#[tokio::test]
async fn empty_window_is_data_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = fixture_fetcher(&["600519.SH"]).await;
    let err = assembler(tmp.path(), fetcher)
        .prepare_dataset("600519.SH", "2020-01-02", &PrepareOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DatasetError::DataUnavailable {
            kind: CacheKind::PriceSeries,
            ..
        }
    ));
}

#[tokio::test]
async fn forced_financials_refresh_leaves_prices_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = fixture_fetcher(&["600519.SH"]).await;
    let assembler = assembler(tmp.path(), fetcher.clone());
    assembler
        .prepare_dataset("600519.SH", AS_OF, &PrepareOptions::default())
        .await
        .unwrap();
    assembler
        .prepare_dataset(
            "600519.SH",
            AS_OF,
            &PrepareOptions::default().with_force_refresh_financials(),
        )
        .await
        .unwrap();

    assert_eq!(fetcher.calls("600519.SH", CacheKind::Financials), 2);
    assert_eq!(fetcher.calls("600519.SH", CacheKind::ShareInfo), 2);
    assert_eq!(fetcher.calls("600519.SH", CacheKind::PriceSeries), 1);
}

#[tokio::test]
async fn zero_ttl_refreshes_every_call_and_still_assembles() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = fixture_fetcher(&["510300.SH"]).await;
    let overrides: PolicyOverrides =
        serde_json::from_str(r#"{"price_series": {"ttl_days": 0}}"#).unwrap();
    let assembler = DatasetAssembler::builder(config(tmp.path()))
        .registry(Arc::new(CacheRegistry::with_overrides(&overrides)))
        .fetcher(fetcher.clone())
        .build();

    for _ in 0..2 {
        assembler
            .prepare_dataset("510300.SH", AS_OF, &PrepareOptions::default())
            .await
            .unwrap();
    }
    assert_eq!(fetcher.calls("510300.SH", CacheKind::PriceSeries), 2);
}

#[tokio::test]
async fn deadline_surfaces_as_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(FixtureFetcher::new().with_delay(Duration::from_secs(5)));
    fetcher.insert("600519.SH", stock_fixture()).await;

    let err = assembler(tmp.path(), fetcher)
        .prepare_dataset(
            "600519.SH",
            AS_OF,
            &PrepareOptions::default().with_deadline(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::Timeout { ref entity, .. } if entity == "600519.SH"));
}

#[tokio::test]
async fn batch_isolates_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let symbols = ["600519.SH", "000001.SZ", "002415.SZ", "601318.SH"];
    let fetcher = fixture_fetcher(&symbols).await;
    fetcher.fail_for("002415.SZ");
    let runner = BatchRunner::new(assembler(tmp.path(), fetcher.clone()));

    let report = runner
        .run_batch(&symbols, AS_OF, &BatchOptions::default().with_max_workers(3))
        .await;

    assert_eq!(report.len(), symbols.len());
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(
        report.errors["002415.SZ"],
        DatasetError::Fetch { .. }
    ));
    assert!(report.results.contains_key("601318.SH"));
}

#[tokio::test]
async fn sequential_batch_matches_parallel_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let symbols = ["600519.SH", "510300.SH", "000300.IDX"];
    let fetcher = fixture_fetcher(&symbols).await;
    let runner = BatchRunner::new(assembler(tmp.path(), fetcher.clone()));

    let sequential = runner
        .run_batch(&symbols, AS_OF, &BatchOptions::default().with_max_workers(1))
        .await;
    let parallel = runner
        .run_batch(&symbols, AS_OF, &BatchOptions::default().with_max_workers(8))
        .await;

    assert!(sequential.is_complete_success());
    assert!(parallel.is_complete_success());
    for symbol in symbols {
        assert_eq!(
            sequential.results[symbol].prices().len(),
            parallel.results[symbol].prices().len()
        );
    }
    // The second run found every cache fresh.
    assert_eq!(fetcher.calls("600519.SH", CacheKind::PriceSeries), 1);
}

#[tokio::test]
async fn batch_entity_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(FixtureFetcher::new().with_delay(Duration::from_secs(5)));
    fetcher.insert("600519.SH", stock_fixture()).await;
    fetcher.insert("000001.SZ", stock_fixture()).await;
    let runner = BatchRunner::new(assembler(tmp.path(), fetcher));

    let report = runner
        .run_batch(
            &["600519.SH", "000001.SZ"],
            AS_OF,
            &BatchOptions::default()
                .with_max_workers(2)
                .with_entity_timeout(Duration::from_millis(50)),
        )
        .await;

    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.values().all(|e| e.category() == "timeout"));
}
