//! Cache health reports over many entities.

use chrono::{DateTime, Utc};
use pitdata_core::{CacheKind, DatasetError, EntityIdentity, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::status::CacheStatusChecker;

/// Health of one (entity, kind) cache directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheHealthRow {
    /// Normalized symbol.
    pub symbol: String,
    /// Display name of the entity.
    pub name: String,
    /// Cache kind.
    pub kind: CacheKind,
    /// Directory inspected.
    pub path: PathBuf,
    /// Whether the directory exists.
    pub exists: bool,
    /// Required files that are absent.
    pub missing_files: Vec<String>,
    /// Time of the last recorded refresh.
    pub last_updated: Option<DateTime<Utc>>,
    /// Whether the cache is stale.
    pub stale: bool,
}

/// Parses a target list, one entity per line.
///
/// Lines are `SYMBOL`, `SYMBOL,NAME` or `SYMBOL NAME`; blank lines and lines
/// starting with `#` are ignored.
///
/// # Errors
/// Returns [`DatasetError::Validation`] for the first line whose symbol does not parse.
pub fn parse_targets(text: &str) -> Result<Vec<EntityIdentity>> {
    let mut targets = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (symbol, name) = match line.split_once(',') {
            Some((symbol, name)) => (symbol.trim(), Some(name.trim())),
            None => match line.split_once(char::is_whitespace) {
                Some((symbol, name)) => (symbol, Some(name.trim())),
                None => (line, None),
            },
        };
        let entity = EntityIdentity::parse(symbol).map_err(|e| {
            DatasetError::Validation(format!("line {}: {e}", lineno + 1))
        })?;
        targets.push(match name {
            Some(name) => entity.with_display_name(name),
            None => entity,
        });
    }
    Ok(targets)
}

impl CacheStatusChecker {
    /// Inspects `kinds` for every entity under `base_dir`.
    ///
    /// Kinds that do not apply to an entity's market class are left out;
    /// every other pair yields a row, unreadable locations included.
    #[must_use]
    pub fn health_rows(
        &self,
        base_dir: &Path,
        entities: &[EntityIdentity],
        kinds: &[CacheKind],
    ) -> Vec<CacheHealthRow> {
        let mut rows = Vec::with_capacity(entities.len() * kinds.len());
        for entity in entities {
            for &kind in kinds {
                if !entity.market_class().supports(kind) {
                    debug!(entity = %entity, kind = %kind, "Kind not applicable, skipping");
                    continue;
                }
                let path = self.registry().directory(base_dir, entity, kind);
                let status = self.check(&path, kind);
                rows.push(CacheHealthRow {
                    symbol: entity.symbol(),
                    name: entity.display_name().to_string(),
                    kind,
                    path,
                    exists: status.exists,
                    missing_files: status.missing_required_files,
                    last_updated: status.last_updated,
                    stale: status.stale,
                });
            }
        }
        rows
    }
}

/// Rows that fail the requested conditions.
#[must_use]
pub fn failing_rows(
    rows: &[CacheHealthRow],
    fail_on_missing: bool,
    fail_on_stale: bool,
) -> Vec<&CacheHealthRow> {
    rows.iter()
        .filter(|row| {
            (fail_on_missing && (!row.exists || !row.missing_files.is_empty()))
                || (fail_on_stale && row.stale)
        })
        .collect()
}
