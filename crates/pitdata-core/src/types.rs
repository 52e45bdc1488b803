//! Core data types stored in and served from the cache.
//!
//! - [`EntityIdentity`] - Normalized instrument identity (cache key root)
//! - [`PriceBar`] - Daily price bar
//! - [`FinancialRow`] - One reporting period of one financial statement
//! - [`StatementKind`] - Which statement a row belongs to
//! - [`ShareFact`] - Share count effective from a date
//! - [`Disclosure`] - Corporate announcement

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{DatasetError, Result};
use crate::kind::MarketClass;

/// Code prefixes of mainland exchange-traded funds.
const ETF_CODE_PREFIXES: [&str; 6] = ["51", "58", "15", "16", "50", "53"];

/// A normalized tradable instrument.
///
/// Built from a raw `CODE.SUFFIX` string such as `600000.sh` or `700.HK`.
/// Construction is deterministic, so the identity can root every cache path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityIdentity {
    code: String,
    suffix: String,
    market_class: MarketClass,
    calendar: String,
    display_name: String,
}

impl EntityIdentity {
    /// Parses and normalizes a raw symbol.
    ///
    /// # Errors
    /// Returns [`DatasetError::Validation`] when the symbol is not of the form
    /// `CODE.SUFFIX`, the code is not alphanumeric, or the suffix is unknown.
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned = raw.trim().to_uppercase();
        let Some((code, suffix)) = cleaned.split_once('.') else {
            return Err(DatasetError::Validation(format!(
                "symbol {raw:?} is invalid, expected CODE.SUFFIX such as 600000.SH or 00700.HK"
            )));
        };
        if code.is_empty() || suffix.is_empty() {
            return Err(DatasetError::Validation(format!(
                "symbol {raw:?} is missing its code or suffix"
            )));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DatasetError::Validation(format!(
                "symbol code {code:?} must be alphanumeric"
            )));
        }

        let (market_class, calendar) = match suffix {
            "SH" | "SZ" if ETF_CODE_PREFIXES.iter().any(|p| code.starts_with(p)) => {
                (MarketClass::CnEtf, "CN")
            }
            "SH" | "SZ" => (MarketClass::CnEquity, "CN"),
            "IDX" => (MarketClass::CnIndex, "CN"),
            "HK" => (MarketClass::HkEquity, "HK"),
            "US" => (MarketClass::UsEquity, "US"),
            other => {
                return Err(DatasetError::Validation(format!(
                    "unsupported suffix {other:?} in {raw:?}; allowed: HK, IDX, SH, SZ, US"
                )));
            }
        };

        let code = if market_class == MarketClass::HkEquity && code.chars().all(|c| c.is_ascii_digit())
        {
            format!("{code:0>5}")
        } else {
            code.to_string()
        };

        let display_name = format!("{code}.{suffix}");
        Ok(Self {
            code,
            suffix: suffix.to_string(),
            market_class,
            calendar: calendar.to_string(),
            display_name,
        })
    }

    /// Sets a human-readable name. Blank names are ignored.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            self.display_name = trimmed.to_string();
        }
        self
    }

    /// Exchange code without suffix (`600000`).
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Market suffix (`SH`, `SZ`, `HK`, `US`, `IDX`).
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Instrument class.
    #[must_use]
    pub const fn market_class(&self) -> MarketClass {
        self.market_class
    }

    /// Trading calendar id (`CN`, `HK`, `US`).
    #[must_use]
    pub fn calendar(&self) -> &str {
        &self.calendar
    }

    /// Human-readable name (defaults to the symbol).
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Normalized `CODE.SUFFIX` symbol.
    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}.{}", self.code, self.suffix)
    }

    /// Directory name grouping every per-entity cache of this instrument.
    #[must_use]
    pub fn bucket_id(&self) -> String {
        self.symbol()
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.code, self.suffix)
    }
}

impl FromStr for EntityIdentity {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Daily price bar, keyed by trade date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Trading day.
    pub trade_date: NaiveDate,
    /// Opening price.
    pub open: f64,
    /// Highest price of the day.
    pub high: f64,
    /// Lowest price of the day.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Traded volume.
    pub volume: f64,
    /// Turnover rate, when the provider reports it.
    pub turnover: Option<f64>,
}

impl PriceBar {
    /// Creates a bar with no turnover.
    #[must_use]
    pub const fn new(
        trade_date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            trade_date,
            open,
            high,
            low,
            close,
            volume,
            turnover: None,
        }
    }

    /// Sets the turnover rate.
    #[must_use]
    pub const fn with_turnover(mut self, turnover: f64) -> Self {
        self.turnover = Some(turnover);
        self
    }
}

/// Which financial statement a row belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    /// Income statement (profit sheet).
    Income,
    /// Balance sheet.
    Balance,
    /// Cash flow statement.
    CashFlow,
}

impl StatementKind {
    /// All statements in file order.
    pub const ALL: [Self; 3] = [Self::Income, Self::Balance, Self::CashFlow];

    /// File name of the statement inside the financials cache directory.
    #[must_use]
    pub const fn file_name(&self) -> &'static str {
        match self {
            Self::Income => "profit_sheet.csv",
            Self::Balance => "balance_sheet.csv",
            Self::CashFlow => "cash_flow_sheet.csv",
        }
    }
}

/// One reporting period of one financial statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialRow {
    /// Last day of the reporting period.
    pub report_period_end: NaiveDate,
    /// Public filing date, when the source records one.
    pub disclosure_date: Option<NaiveDate>,
    /// Statement items by name.
    pub values: BTreeMap<String, f64>,
}

impl FinancialRow {
    /// Creates a row with no items.
    #[must_use]
    pub const fn new(report_period_end: NaiveDate, disclosure_date: Option<NaiveDate>) -> Self {
        Self {
            report_period_end,
            disclosure_date,
            values: BTreeMap::new(),
        }
    }

    /// Adds a statement item.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Date from which this row may be seen.
    ///
    /// The disclosure date when present, never earlier than the period end.
    #[must_use]
    pub fn visibility_date(&self) -> NaiveDate {
        match self.disclosure_date {
            Some(disclosed) => disclosed.max(self.report_period_end),
            None => self.report_period_end,
        }
    }

    /// Returns true when the recorded disclosure precedes the period end.
    #[must_use]
    pub fn has_inverted_dates(&self) -> bool {
        self.disclosure_date
            .is_some_and(|disclosed| disclosed < self.report_period_end)
    }

    /// Looks up a statement item.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Share counts effective from a date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShareFact {
    /// First day these counts apply.
    pub effective_date: NaiveDate,
    /// Total shares outstanding.
    pub total_shares: f64,
    /// Freely tradable shares.
    pub float_shares: f64,
    /// Provider the fact came from.
    pub source_tag: String,
}

/// Corporate announcement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Disclosure {
    /// Publication time.
    pub publish_time: NaiveDateTime,
    /// Announcement title.
    pub title: String,
    /// Announcement category, if classified.
    pub category: Option<String>,
    /// Link to the full document.
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_normalizes_symbol() {
        let entity = EntityIdentity::parse("  600000.sh ").unwrap();
        assert_eq!(entity.symbol(), "600000.SH");
        assert_eq!(entity.market_class(), MarketClass::CnEquity);
        assert_eq!(entity.calendar(), "CN");
        assert_eq!(entity.display_name(), "600000.SH");
    }

    #[test]
    fn test_parse_pads_hk_codes() {
        let entity = EntityIdentity::parse("700.hk").unwrap();
        assert_eq!(entity.code(), "00700");
        assert_eq!(entity.market_class(), MarketClass::HkEquity);
    }

    #[test]
    fn test_parse_detects_etf_and_index() {
        assert_eq!(
            EntityIdentity::parse("510300.SH").unwrap().market_class(),
            MarketClass::CnEtf
        );
        assert_eq!(
            EntityIdentity::parse("000300.IDX").unwrap().market_class(),
            MarketClass::CnIndex
        );
        assert_eq!(
            EntityIdentity::parse("AAPL.US").unwrap().market_class(),
            MarketClass::UsEquity
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "600000", "600000.", ".SH", "60-000.SH", "600000.XX"] {
            let err = EntityIdentity::parse(raw).unwrap_err();
            assert!(matches!(err, DatasetError::Validation(_)), "{raw}");
        }
    }

    #[test]
    fn test_display_name_override() {
        let entity = EntityIdentity::parse("002415.SZ")
            .unwrap()
            .with_display_name(" Hikvision ");
        assert_eq!(entity.display_name(), "Hikvision");
        assert_eq!(entity.bucket_id(), "002415.SZ");
    }

    #[test]
    fn test_visibility_date_prefers_disclosure() {
        let row = FinancialRow::new(date(2024, 9, 30), Some(date(2024, 10, 28)));
        assert_eq!(row.visibility_date(), date(2024, 10, 28));

        let undated = FinancialRow::new(date(2024, 9, 30), None);
        assert_eq!(undated.visibility_date(), date(2024, 9, 30));
    }

    #[test]
    fn test_inverted_dates_never_become_visible_early() {
        let row = FinancialRow::new(date(2024, 9, 30), Some(date(2024, 9, 1)));
        assert!(row.has_inverted_dates());
        assert_eq!(row.visibility_date(), date(2024, 9, 30));
        assert!(row.visibility_date() >= row.disclosure_date.unwrap());
    }
}
