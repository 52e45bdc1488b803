//! CSV codecs for cached artifacts.
//!
//! Long-form artifacts (price bars, statement rows, share facts, announcements)
//! go through the `csv` crate. The wide financial abstract has one column per
//! reporting period, so it is read and written as a polars [`DataFrame`].
//!
//! Writers are what fetchers use to populate a cache directory; readers are
//! what the dataset assembler uses afterwards.

use chrono::{NaiveDate, NaiveDateTime};
use pitdata_core::{Disclosure, FinancialRow, PriceBar, ShareFact};
use polars::prelude::{CsvReadOptions, CsvWriter, DataFrame, PolarsError, SerReader, SerWriter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Price bar file inside the price cache directory.
pub const PRICE_FILE: &str = "price.csv";
/// Share fact file inside the share info cache directory.
pub const SHARE_FACTS_FILE: &str = "share_facts.csv";
/// Announcement file inside the disclosure cache directory.
pub const DISCLOSURES_FILE: &str = "disclosures.csv";
/// Wide financial abstract inside the financials cache directory.
pub const ABSTRACT_FILE: &str = "financial_abstract.csv";

/// Header naming the reporting period in statement files.
pub const REPORT_DATE_COLUMN: &str = "REPORT_DATE";
/// Headers that may carry the public filing date in statement files.
pub const NOTICE_DATE_COLUMNS: [&str; 2] = ["NOTICE_DATE", "公告日期"];

/// Errors reading or writing cached artifacts.
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// Filesystem error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding or decoding error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: csv::Error,
    },

    /// Table read or write error.
    #[error("Table error in {path}: {source}")]
    Table {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: PolarsError,
    },

    /// The file parsed but its content is unusable.
    #[error("Malformed artifact {path}: {message}")]
    Malformed {
        /// File being read.
        path: PathBuf,
        /// What was wrong.
        message: String,
    },
}

impl ArtifactError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    fn malformed(path: &Path, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Result alias for artifact operations.
pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Parses `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or `YYYYMMDD`.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(dt) = parse_datetime(raw) {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .ok()
}

/// Parses a publication timestamp; a bare date means midnight.
#[must_use]
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parses a period column header of the wide abstract (`YYYYMMDD` or `YYYY-MM-DD`).
#[must_use]
pub fn parse_period_column(name: &str) -> Option<NaiveDate> {
    let name = name.trim();
    match name.len() {
        8 if name.bytes().all(|b| b.is_ascii_digit()) => {
            NaiveDate::parse_from_str(name, "%Y%m%d").ok()
        }
        10 => NaiveDate::parse_from_str(name, "%Y-%m-%d").ok(),
        _ => None,
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PriceRecord {
    #[serde(alias = "date", alias = "日期")]
    trade_date: String,
    #[serde(alias = "开盘")]
    open: f64,
    #[serde(alias = "最高")]
    high: f64,
    #[serde(alias = "最低")]
    low: f64,
    #[serde(alias = "收盘")]
    close: f64,
    #[serde(alias = "成交量")]
    volume: f64,
    #[serde(default, alias = "换手率")]
    turnover: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ShareRecord {
    effective_date: String,
    total_shares: f64,
    float_shares: f64,
    #[serde(default)]
    source_tag: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DisclosureRecord {
    publish_time: String,
    title: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ArtifactError::csv(path, e))
}

fn writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::Writer::from_path(path).map_err(|e| ArtifactError::csv(path, e))
}

/// Hidden sibling a writer fills before it replaces `path`.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Runs `write` against a temp sibling of `path`, then renames it into place.
///
/// Readers see either the previous file or the complete new one.
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp = temp_path(path);
    let result = write(&tmp)
        .and_then(|()| std::fs::rename(&tmp, path).map_err(|e| ArtifactError::io(path, e)));
    if result.is_err() {
        if let Err(cleanup) = std::fs::remove_file(&tmp) {
            debug!(path = %tmp.display(), error = %cleanup, "Temp artifact not removed");
        }
    }
    result
}

/// Reads price bars, sorted ascending with one bar per trade date.
///
/// # Errors
/// Fails if the file is unreadable or a row has an invalid trade date.
pub fn read_prices(path: &Path) -> Result<Vec<PriceBar>> {
    let mut rdr = reader(path)?;
    let mut bars = Vec::new();
    for record in rdr.deserialize::<PriceRecord>() {
        let record = record.map_err(|e| ArtifactError::csv(path, e))?;
        let trade_date = parse_date(&record.trade_date).ok_or_else(|| {
            ArtifactError::malformed(path, format!("invalid trade date {:?}", record.trade_date))
        })?;
        let mut bar = PriceBar::new(
            trade_date,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        );
        bar.turnover = record.turnover;
        bars.push(bar);
    }
    bars.sort_by_key(|bar| bar.trade_date);
    // Keep the last row written for a repeated date.
    bars.reverse();
    bars.dedup_by_key(|bar| bar.trade_date);
    bars.reverse();
    debug!(path = %path.display(), rows = bars.len(), "Read price bars");
    Ok(bars)
}

/// Writes price bars.
///
/// # Errors
/// Fails if the file cannot be written.
pub fn write_prices(path: &Path, bars: &[PriceBar]) -> Result<()> {
    write_atomically(path, |path| {
        let mut wtr = writer(path)?;
        for bar in bars {
            wtr.serialize(PriceRecord {
                trade_date: bar.trade_date.format("%Y-%m-%d").to_string(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                turnover: bar.turnover,
            })
            .map_err(|e| ArtifactError::csv(path, e))?;
        }
        wtr.flush().map_err(|e| ArtifactError::io(path, e))
    })
}

fn is_identifier_column(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.ends_with("_DATE")
        || upper.contains("CODE")
        || upper.contains("NAME")
        || upper == "REPORT_TYPE"
        || upper == "CURRENCY"
        || NOTICE_DATE_COLUMNS.contains(&name)
}

/// Reads one long-form statement file.
///
/// Rows with an unparseable `REPORT_DATE` are skipped. When the file has a
/// notice date column, rows without a valid notice date are skipped too, since
/// their visibility cannot be established; without the column the period end
/// is the visibility date. Non-numeric cells are ignored.
///
/// # Errors
/// Fails if the file is unreadable or has no `REPORT_DATE` column.
pub fn read_statement(path: &Path) -> Result<Vec<FinancialRow>> {
    let mut rdr = reader(path)?;
    let headers = rdr.headers().map_err(|e| ArtifactError::csv(path, e))?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let report_idx = headers
        .iter()
        .position(|h| h == REPORT_DATE_COLUMN)
        .ok_or_else(|| ArtifactError::malformed(path, "missing REPORT_DATE column"))?;
    let notice_idx = headers
        .iter()
        .position(|h| NOTICE_DATE_COLUMNS.contains(&h));

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in rdr.records() {
        let record = record.map_err(|e| ArtifactError::csv(path, e))?;
        let Some(period_end) = record.get(report_idx).and_then(parse_date) else {
            skipped += 1;
            continue;
        };
        let disclosure_date = match notice_idx {
            Some(idx) => match record.get(idx).and_then(parse_date) {
                Some(date) => Some(date),
                None => {
                    skipped += 1;
                    continue;
                }
            },
            None => None,
        };

        let mut row = FinancialRow::new(period_end, disclosure_date);
        for (name, cell) in headers.iter().zip(record.iter()) {
            if is_identifier_column(name) {
                continue;
            }
            if let Ok(value) = cell.parse::<f64>() {
                row.values.insert(name.to_string(), value);
            }
        }
        rows.push(row);
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "Skipped statement rows without usable dates");
    }
    rows.sort_by_key(|row| row.report_period_end);
    Ok(rows)
}

/// Writes one long-form statement file.
///
/// The notice date column is written only if some row carries a disclosure date.
///
/// # Errors
/// Fails if the file cannot be written.
pub fn write_statement(path: &Path, rows: &[FinancialRow]) -> Result<()> {
    write_atomically(path, |path| {
        let with_notice = rows.iter().any(|row| row.disclosure_date.is_some());
        let mut items: Vec<&str> = rows
            .iter()
            .flat_map(|row| row.values.keys().map(String::as_str))
            .collect();
        items.sort_unstable();
        items.dedup();

        let mut wtr = writer(path)?;
        let mut header = vec![REPORT_DATE_COLUMN];
        if with_notice {
            header.push(NOTICE_DATE_COLUMNS[0]);
        }
        header.extend(items.iter().copied());
        wtr.write_record(&header)
            .map_err(|e| ArtifactError::csv(path, e))?;

        for row in rows {
            let mut record = vec![row.report_period_end.format("%Y-%m-%d").to_string()];
            if with_notice {
                record.push(
                    row.disclosure_date
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .unwrap_or_default(),
                );
            }
            record.extend(
                items
                    .iter()
                    .map(|item| row.value(item).map(|v| v.to_string()).unwrap_or_default()),
            );
            wtr.write_record(&record)
                .map_err(|e| ArtifactError::csv(path, e))?;
        }
        wtr.flush().map_err(|e| ArtifactError::io(path, e))
    })
}

/// Reads the wide financial abstract.
///
/// # Errors
/// Fails if the file is unreadable or not a table.
pub fn read_abstract_table(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|source| ArtifactError::Table {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes the wide financial abstract.
///
/// # Errors
/// Fails if the file cannot be written.
pub fn write_abstract_table(path: &Path, table: &DataFrame) -> Result<()> {
    write_atomically(path, |path| {
        let mut file = std::fs::File::create(path).map_err(|e| ArtifactError::io(path, e))?;
        let mut table = table.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut table)
            .map_err(|source| ArtifactError::Table {
                path: path.to_path_buf(),
                source,
            })
    })
}

/// Reads share facts, sorted by effective date.
///
/// # Errors
/// Fails if the file is unreadable or a row has an invalid effective date.
pub fn read_share_facts(path: &Path) -> Result<Vec<ShareFact>> {
    let mut rdr = reader(path)?;
    let mut facts = Vec::new();
    for record in rdr.deserialize::<ShareRecord>() {
        let record = record.map_err(|e| ArtifactError::csv(path, e))?;
        let effective_date = parse_date(&record.effective_date).ok_or_else(|| {
            ArtifactError::malformed(
                path,
                format!("invalid effective date {:?}", record.effective_date),
            )
        })?;
        facts.push(ShareFact {
            effective_date,
            total_shares: record.total_shares,
            float_shares: record.float_shares,
            source_tag: record.source_tag,
        });
    }
    facts.sort_by_key(|fact| fact.effective_date);
    Ok(facts)
}

/// Writes share facts.
///
/// # Errors
/// Fails if the file cannot be written.
pub fn write_share_facts(path: &Path, facts: &[ShareFact]) -> Result<()> {
    write_atomically(path, |path| {
        let mut wtr = writer(path)?;
        for fact in facts {
            wtr.serialize(ShareRecord {
                effective_date: fact.effective_date.format("%Y-%m-%d").to_string(),
                total_shares: fact.total_shares,
                float_shares: fact.float_shares,
                source_tag: fact.source_tag.clone(),
            })
            .map_err(|e| ArtifactError::csv(path, e))?;
        }
        wtr.flush().map_err(|e| ArtifactError::io(path, e))
    })
}

/// Reads announcements in file order.
///
/// Rows with an unparseable publish time are skipped with a warning.
///
/// # Errors
/// Fails if the file is unreadable.
pub fn read_disclosures(path: &Path) -> Result<Vec<Disclosure>> {
    let mut rdr = reader(path)?;
    let mut items = Vec::new();
    let mut skipped = 0usize;
    for record in rdr.deserialize::<DisclosureRecord>() {
        let record = record.map_err(|e| ArtifactError::csv(path, e))?;
        let Some(publish_time) = parse_datetime(&record.publish_time) else {
            skipped += 1;
            continue;
        };
        items.push(Disclosure {
            publish_time,
            title: record.title,
            category: record.category.filter(|c| !c.is_empty()),
            url: record.url.filter(|u| !u.is_empty()),
        });
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "Skipped announcements without a valid publish time");
    }
    Ok(items)
}

/// Writes announcements.
///
/// # Errors
/// Fails if the file cannot be written.
pub fn write_disclosures(path: &Path, items: &[Disclosure]) -> Result<()> {
    write_atomically(path, |path| {
        let mut wtr = writer(path)?;
        for item in items {
            wtr.serialize(DisclosureRecord {
                publish_time: item.publish_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                title: item.title.clone(),
                category: item.category.clone(),
                url: item.url.clone(),
            })
            .map_err(|e| ArtifactError::csv(path, e))?;
        }
        wtr.flush().map_err(|e| ArtifactError::io(path, e))
    })
}
