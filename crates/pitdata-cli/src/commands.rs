//! Command implementations.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::info;

use pitdata::{
    BatchOptions, BatchRunner, CacheHealthRow, CacheKind, CacheRegistry, CacheStatusChecker,
    DatasetAssembler, DatasetConfig, EntityIdentity, OfflineFetcher, PrepareOptions,
    PreparedDataset, failing_rows, parse_targets,
};

use crate::cli::{BatchArgs, CheckArgs, DatasetArgs, PrepareArgs};

pub(crate) fn load_registry(policy: Option<&Path>) -> CacheRegistry {
    match policy {
        Some(path) => CacheRegistry::from_policy_file(path),
        None => CacheRegistry::builtin(),
    }
}

pub(crate) fn kinds(registry: &CacheRegistry, json: bool) -> Result<ExitCode> {
    if json {
        let specs: Vec<_> = registry.specs().collect();
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(ExitCode::SUCCESS);
    }
    println!("{:<16} {:<18} {:>8}  REQUIRED FILES", "KIND", "SUBDIRECTORY", "TTL");
    for spec in registry.specs() {
        let ttl = spec
            .ttl_days
            .map_or_else(|| "-".to_string(), |days| format!("{days}d"));
        println!(
            "{:<16} {:<18} {:>8}  {}",
            spec.kind.as_str(),
            spec.subdirectory,
            ttl,
            spec.required_files.join(", ")
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn check(registry: CacheRegistry, base_dir: &Path, args: &CheckArgs) -> Result<ExitCode> {
    let mut entities = Vec::new();
    for symbol in &args.symbol {
        entities.push(EntityIdentity::parse(symbol)?);
    }
    if let Some(path) = &args.batch_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read target list {}", path.display()))?;
        entities.extend(parse_targets(&text).with_context(|| format!("In {}", path.display()))?);
    }
    let kinds = if args.kinds.is_empty() {
        CacheKind::ALL.to_vec()
    } else {
        args.kinds.clone()
    };

    let checker = CacheStatusChecker::new(Arc::new(registry));
    let rows = checker.health_rows(base_dir, &entities, &kinds);
    info!(entities = entities.len(), rows = rows.len(), "Checked caches");

    let report = if args.json {
        serde_json::to_string_pretty(&rows)?
    } else {
        render_health_table(&rows)
    };
    match &args.output {
        Some(path) => std::fs::write(path, report + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{report}"),
    }

    let failing = failing_rows(&rows, args.fail_on_missing, args.fail_on_stale);
    if failing.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{} cache(s) failed the health check", failing.len());
        Ok(ExitCode::FAILURE)
    }
}

fn render_health_table(rows: &[CacheHealthRow]) -> String {
    let mut out = format!(
        "{:<12} {:<14} {:<7} {:<6} {:<25} MISSING",
        "SYMBOL", "KIND", "EXISTS", "STALE", "LAST UPDATED"
    );
    for row in rows {
        let last_updated = row
            .last_updated
            .map_or_else(|| "-".to_string(), |ts| ts.format("%Y-%m-%d %H:%M:%S").to_string());
        out.push_str(&format!(
            "\n{:<12} {:<14} {:<7} {:<6} {:<25} {}",
            row.symbol,
            row.kind.as_str(),
            row.exists,
            row.stale,
            last_updated,
            row.missing_files.join(", ")
        ));
    }
    out
}

fn assembler(registry: CacheRegistry, base_dir: &Path, args: &DatasetArgs) -> DatasetAssembler {
    let mut config = DatasetConfig::new(base_dir);
    if let Some(days) = args.price_lookback_days {
        config = config.with_price_lookback_days(days);
    }
    if let Some(days) = args.disclosure_lookback_days {
        config = config.with_disclosure_lookback_days(days);
    }
    DatasetAssembler::builder(config)
        .registry(Arc::new(registry))
        .fetcher(Arc::new(OfflineFetcher::new()))
        .build()
}

fn prepare_options(args: &DatasetArgs) -> PrepareOptions {
    let mut options = PrepareOptions::default();
    if args.include_disclosures {
        options = options.with_disclosures();
    }
    options
}

pub(crate) async fn prepare(
    registry: CacheRegistry,
    base_dir: &Path,
    args: &PrepareArgs,
) -> Result<ExitCode> {
    let mut options = prepare_options(&args.dataset);
    if let Some(secs) = args.dataset.timeout_secs {
        options = options.with_deadline(Duration::from_secs(secs));
    }
    let dataset = assembler(registry, base_dir, &args.dataset)
        .prepare_dataset(&args.symbol, &args.dataset.as_of, &options)
        .await?;
    println!("{}", serde_json::to_string_pretty(&summarize(&dataset))?);
    Ok(ExitCode::SUCCESS)
}

pub(crate) async fn batch(registry: CacheRegistry, base_dir: &Path, args: &BatchArgs) -> Result<ExitCode> {
    let mut options = BatchOptions::default()
        .with_max_workers(args.workers)
        .with_prepare(prepare_options(&args.dataset));
    if let Some(secs) = args.dataset.timeout_secs {
        options = options.with_entity_timeout(Duration::from_secs(secs));
    }
    let runner = BatchRunner::new(assembler(registry, base_dir, &args.dataset));
    let report = runner
        .run_batch(args.symbols.as_slice(), &args.dataset.as_of, &options)
        .await;

    let results: serde_json::Map<String, Value> = report
        .results
        .iter()
        .map(|(key, dataset)| (key.clone(), summarize(dataset)))
        .collect();
    let errors: serde_json::Map<String, Value> = report
        .errors
        .iter()
        .map(|(key, e)| {
            (
                key.clone(),
                json!({ "category": e.category(), "message": e.to_string() }),
            )
        })
        .collect();
    let out = json!({ "results": results, "errors": errors });
    println!("{}", serde_json::to_string_pretty(&out)?);

    Ok(if report.is_complete_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn summarize(dataset: &PreparedDataset) -> Value {
    let prices = dataset.prices();
    json!({
        "symbol": dataset.entity().symbol(),
        "market": dataset.entity().market_class().to_string(),
        "as_of": dataset.as_of().to_string(),
        "prices": {
            "start": prices.start().to_string(),
            "bars": prices.len(),
            "last_trade_date": prices.latest().map(|bar| bar.trade_date.to_string()),
            "last_close": prices.latest().map(|bar| bar.close),
        },
        "financials": dataset.financials().map(|f| json!({
            "latest_period": f.latest_period().map(|d| d.to_string()),
            "abstract_columns": f.abstract_table().map(|t| t.width()),
        })),
        "share_info": dataset.share_info(),
        "disclosures": dataset.disclosures().map(|d| d.items().len()),
    })
}
