//! Cache kind and market class definitions.
//!
//! [`CacheKind`] enumerates the categories of cached datasets and
//! [`MarketClass`] the instrument classes. Which kinds apply to which class
//! is a fixed table ([`MarketClass::supports`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of cached dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Income, balance-sheet and cash-flow statements plus the financial abstract.
    Financials,
    /// Daily price bars.
    PriceSeries,
    /// Total/float share count history.
    ShareInfo,
    /// Corporate announcements.
    Disclosures,
    /// Market-wide basic information snapshot.
    BasicSnapshot,
}

impl CacheKind {
    /// Every kind, in registry order.
    pub const ALL: [Self; 5] = [
        Self::Financials,
        Self::PriceSeries,
        Self::ShareInfo,
        Self::Disclosures,
        Self::BasicSnapshot,
    ];

    /// Stable name used in policy files, metadata and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Financials => "financials",
            Self::PriceSeries => "price_series",
            Self::ShareInfo => "share_info",
            Self::Disclosures => "disclosures",
            Self::BasicSnapshot => "basic_snapshot",
        }
    }

    /// Position of this kind in [`CacheKind::ALL`].
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Financials => 0,
            Self::PriceSeries => 1,
            Self::ShareInfo => 2,
            Self::Disclosures => 3,
            Self::BasicSnapshot => 4,
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle)
            .ok_or_else(|| format!("unknown cache kind: {s}"))
    }
}

/// Instrument class, derived from the symbol suffix and code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketClass {
    /// Shanghai/Shenzhen listed equity.
    CnEquity,
    /// Shanghai/Shenzhen listed ETF or fund.
    CnEtf,
    /// Mainland index.
    CnIndex,
    /// Hong Kong listed equity.
    HkEquity,
    /// US listed equity.
    UsEquity,
}

impl MarketClass {
    /// Returns true if instruments of this class carry data of `kind`.
    ///
    /// Index and ETF instruments have no statements or share counts; kinds
    /// that do not apply are skipped, never treated as a freshness failure.
    #[must_use]
    pub const fn supports(&self, kind: CacheKind) -> bool {
        match kind {
            CacheKind::PriceSeries | CacheKind::BasicSnapshot => true,
            CacheKind::Financials => {
                matches!(self, Self::CnEquity | Self::HkEquity | Self::UsEquity)
            }
            CacheKind::ShareInfo => matches!(self, Self::CnEquity | Self::HkEquity),
            CacheKind::Disclosures => matches!(self, Self::CnEquity | Self::CnEtf | Self::HkEquity),
        }
    }

    /// Provider of record for share-count facts, if the class has one.
    #[must_use]
    pub const fn share_provider(&self) -> Option<&'static str> {
        match self {
            Self::CnEquity => Some("cninfo"),
            Self::HkEquity => Some("eastmoney"),
            Self::CnEtf | Self::CnIndex | Self::UsEquity => None,
        }
    }
}

impl fmt::Display for MarketClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CnEquity => "CN_A",
            Self::CnEtf => "CN_ETF",
            Self::CnIndex => "CN_INDEX",
            Self::HkEquity => "HK",
            Self::UsEquity => "US",
        };
        f.write_str(name)
    }
}
