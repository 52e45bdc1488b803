//! Cache policy and health types.
//!
//! This module defines the per-kind policy ([`CacheSpec`]), the read-only
//! health snapshot of a cache directory ([`CacheStatus`]), and the metadata
//! document written after every successful refresh ([`RefreshMetadata`]).

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::kind::CacheKind;

/// Name of the reserved metadata file inside every cache directory.
pub const META_FILENAME: &str = ".cache_registry_meta.json";

/// Legacy metadata key holding the oldest date requested from upstream (`YYYYMMDD`).
const LEGACY_REQUESTED_START: &str = "requested_start_date";

/// Policy for one cache kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSpec {
    /// Kind this policy applies to.
    pub kind: CacheKind,
    /// Directory name under the entity bucket (or the base dir for global kinds).
    pub subdirectory: String,
    /// Human-readable description.
    pub description: String,
    /// Maximum age in days; `None` means only integrity is checked.
    pub ttl_days: Option<u32>,
    /// Files that must exist for the cache to be usable.
    pub required_files: Vec<String>,
    /// Files that may exist.
    pub optional_files: Vec<String>,
    /// Whether the cache lives under an entity bucket.
    pub per_entity: bool,
}

impl CacheSpec {
    /// Maximum age as a duration, if the kind expires by time.
    #[must_use]
    pub fn ttl(&self) -> Option<TimeDelta> {
        self.ttl_days.map(|days| TimeDelta::days(i64::from(days)))
    }

    /// Returns true if a cache refreshed at `last_updated` is older than the TTL at `now`.
    #[must_use]
    pub fn is_expired(&self, last_updated: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.ttl()
            .is_some_and(|ttl| now.signed_duration_since(last_updated) > ttl)
    }
}

/// Health snapshot of one cache directory. Recomputed on every check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    /// Directory that was inspected.
    pub path: PathBuf,
    /// Whether the directory exists.
    pub exists: bool,
    /// Required files that are absent.
    pub missing_required_files: Vec<String>,
    /// Time of the last recorded refresh.
    pub last_updated: Option<DateTime<Utc>>,
    /// True if no metadata exists or the TTL has elapsed.
    pub stale: bool,
}

impl CacheStatus {
    /// Returns true if nothing is missing and the cache is fresh.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.exists && self.missing_required_files.is_empty() && !self.stale
    }
}

/// Metadata recorded after a successful refresh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefreshMetadata {
    /// When the refresh finished.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_updated: DateTime<Utc>,
    /// Oldest date the refresh asked upstream for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub furthest_history_reached: Option<NaiveDate>,
    /// Free-form fields supplied by the caller.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RefreshMetadata {
    /// Creates metadata stamped at `last_updated`.
    #[must_use]
    pub fn new(last_updated: DateTime<Utc>) -> Self {
        Self {
            last_updated,
            furthest_history_reached: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Oldest date previously requested from upstream.
    ///
    /// Falls back to the legacy `requested_start_date` field (`YYYYMMDD`).
    #[must_use]
    pub fn furthest_history(&self) -> Option<NaiveDate> {
        self.furthest_history_reached.or_else(|| {
            self.extra
                .get(LEGACY_REQUESTED_START)
                .and_then(|value| match value {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y%m%d").ok())
        })
    }
}

/// Parses an RFC 3339 timestamp, or a naive ISO-8601 timestamp taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw:?}")))
}
