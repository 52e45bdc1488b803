//! Cache status checks and refresh metadata.

use chrono::{DateTime, NaiveDate, Utc};
use pitdata_core::{CacheKind, CacheStatus, META_FILENAME, RefreshMetadata};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::registry::CacheRegistry;

/// Read-only inspector of cache directories.
///
/// Nothing here mutates the filesystem except [`record_refresh`], which the
/// orchestrator calls under the directory's refresh lock.
#[derive(Clone, Debug)]
pub struct CacheStatusChecker {
    registry: Arc<CacheRegistry>,
}

impl CacheStatusChecker {
    /// Creates a checker over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<CacheRegistry>) -> Self {
        Self { registry }
    }

    /// Policy table this checker consults.
    #[must_use]
    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    /// Inspects `dir` as a cache of `kind` at the current time.
    #[must_use]
    pub fn check(&self, dir: &Path, kind: CacheKind) -> CacheStatus {
        self.check_at(dir, kind, Utc::now())
    }

    /// Inspects `dir` as a cache of `kind`, judging staleness at `now`.
    #[must_use]
    pub fn check_at(&self, dir: &Path, kind: CacheKind, now: DateTime<Utc>) -> CacheStatus {
        let spec = self.registry.spec(kind);
        let exists = dir.is_dir();

        let missing_required_files: Vec<String> = spec
            .required_files
            .iter()
            .filter(|name| !dir.join(name.as_str()).is_file())
            .cloned()
            .collect();

        let last_updated = if exists {
            read_metadata(dir).map(|meta| meta.last_updated)
        } else {
            None
        };

        let stale = last_updated.is_none_or(|ts| spec.is_expired(ts, now));

        trace!(
            dir = %dir.display(),
            kind = %kind,
            exists,
            missing = missing_required_files.len(),
            stale,
            "Checked cache directory"
        );

        CacheStatus {
            path: dir.to_path_buf(),
            exists,
            missing_required_files,
            last_updated,
            stale,
        }
    }

    /// Returns true if `dir` must be refreshed before it can be read.
    #[must_use]
    pub fn should_refresh(&self, dir: &Path, kind: CacheKind, force: bool) -> bool {
        if force {
            debug!(dir = %dir.display(), kind = %kind, "Refresh forced");
            return true;
        }
        let status = self.check(dir, kind);
        let needed = !status.exists || !status.missing_required_files.is_empty() || status.stale;
        if needed {
            debug!(
                dir = %dir.display(),
                kind = %kind,
                exists = status.exists,
                missing = ?status.missing_required_files,
                stale = status.stale,
                "Cache needs refresh"
            );
        }
        needed
    }
}

/// Reads the metadata file of `dir`.
///
/// Returns `None` when the file is absent or unreadable; an unreadable file is
/// logged and treated like a missing one, which makes the cache stale.
#[must_use]
pub fn read_metadata(dir: &Path) -> Option<RefreshMetadata> {
    let path = dir.join(META_FILENAME);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read cache metadata");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed cache metadata");
            None
        }
    }
}

/// Writes `meta` as the metadata file of `dir`, replacing any previous one.
///
/// The document is written to a sibling temp file and renamed into place.
///
/// # Errors
/// Returns the I/O error if the file cannot be written.
pub fn write_metadata(dir: &Path, meta: &RefreshMetadata) -> io::Result<()> {
    let path = dir.join(META_FILENAME);
    let tmp = dir.join(format!("{META_FILENAME}.tmp"));
    let body = serde_json::to_vec_pretty(meta).map_err(io::Error::other)?;
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, &path)
}

/// Stamps `dir` as refreshed now.
///
/// # Errors
/// Returns the I/O error if the metadata file cannot be written.
pub fn record_refresh(
    dir: &Path,
    furthest_history_reached: Option<NaiveDate>,
    extra: serde_json::Map<String, serde_json::Value>,
) -> io::Result<RefreshMetadata> {
    let mut meta = RefreshMetadata::new(Utc::now());
    meta.furthest_history_reached = furthest_history_reached;
    meta.extra = extra;
    write_metadata(dir, &meta)?;
    debug!(dir = %dir.display(), furthest = ?furthest_history_reached, "Recorded cache refresh");
    Ok(meta)
}
