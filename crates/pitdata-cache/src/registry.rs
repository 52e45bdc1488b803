//! Cache policy table and directory resolution.
//!
//! The [`CacheRegistry`] holds exactly one [`CacheSpec`] per [`CacheKind`].
//! It is built once at startup from the built-in defaults, optionally merged
//! with a JSON override file, and shared read-only afterwards.

use pitdata_core::{CacheKind, CacheSpec, EntityIdentity};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors reading a policy override file.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The file exists but could not be read.
    #[error("Failed to read policy file {path}: {source}")]
    Read {
        /// Policy file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid policy document.
    #[error("Malformed policy file {path}: {source}")]
    Parse {
        /// Policy file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Override for one cache kind. Absent fields keep the built-in value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PolicyOverride {
    /// Replacement TTL in days.
    #[serde(default)]
    pub ttl_days: Option<u32>,
    /// Replacement subdirectory name.
    #[serde(default, alias = "subdir")]
    pub subdirectory: Option<String>,
}

/// Policy overrides keyed by cache kind name.
pub type PolicyOverrides = BTreeMap<String, PolicyOverride>;

/// Process-wide cache policy table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheRegistry {
    specs: [CacheSpec; 5],
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CacheRegistry {
    /// Registry with the built-in policy for every kind.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            specs: CacheKind::ALL.map(builtin_spec),
        }
    }

    /// Registry with `overrides` merged over the built-in policy.
    ///
    /// Unknown kind names and unusable subdirectory names are logged and ignored.
    #[must_use]
    pub fn with_overrides(overrides: &PolicyOverrides) -> Self {
        let mut registry = Self::builtin();
        for (key, policy) in overrides {
            let Some(kind) = kind_for_policy_key(key) else {
                warn!(key = %key, "Ignoring policy override for unknown cache kind");
                continue;
            };
            let spec = &mut registry.specs[kind.index()];
            if let Some(ttl_days) = policy.ttl_days {
                spec.ttl_days = Some(ttl_days);
            }
            if let Some(subdirectory) = &policy.subdirectory {
                if is_plain_dir_name(subdirectory) {
                    spec.subdirectory = subdirectory.clone();
                } else {
                    warn!(
                        kind = %kind,
                        subdirectory = %subdirectory,
                        "Ignoring policy subdirectory that is not a plain directory name"
                    );
                }
            }
            debug!(kind = %kind, ttl_days = ?spec.ttl_days, subdirectory = %spec.subdirectory, "Applied cache policy override");
        }
        registry
    }

    /// Loads overrides from `path`, failing on unreadable or malformed files.
    ///
    /// A missing file yields the built-in registry.
    ///
    /// # Errors
    /// Returns [`RegistryError`] when the file cannot be read or parsed.
    pub fn try_from_policy_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No cache policy file, using defaults");
            return Ok(Self::builtin());
        }
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let overrides: PolicyOverrides =
            serde_json::from_str(&text).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::with_overrides(&overrides))
    }

    /// Loads overrides from `path`, falling back to the defaults on any error.
    #[must_use]
    pub fn from_policy_file(path: impl AsRef<Path>) -> Self {
        Self::try_from_policy_file(path).unwrap_or_else(|e| {
            warn!(error = %e, "Cache policy file unusable, using built-in defaults");
            Self::builtin()
        })
    }

    /// Policy for `kind`.
    #[must_use]
    pub fn spec(&self, kind: CacheKind) -> &CacheSpec {
        &self.specs[kind.index()]
    }

    /// All policies in registry order.
    pub fn specs(&self) -> impl Iterator<Item = &CacheSpec> {
        self.specs.iter()
    }

    /// Root directory of every per-entity cache of `entity`.
    #[must_use]
    pub fn entity_root(base_dir: &Path, entity: &EntityIdentity) -> PathBuf {
        base_dir.join(entity.bucket_id())
    }

    /// Path of the directory holding `kind` for `entity`, without touching disk.
    ///
    /// Global kinds ignore `entity`.
    #[must_use]
    pub fn directory(&self, base_dir: &Path, entity: &EntityIdentity, kind: CacheKind) -> PathBuf {
        let spec = self.spec(kind);
        if spec.per_entity {
            Self::entity_root(base_dir, entity).join(&spec.subdirectory)
        } else {
            base_dir.join(&spec.subdirectory)
        }
    }

    /// Directory holding `kind` for `entity`.
    ///
    /// When `ensure` is set the directory is created; concurrent callers for
    /// the same path are safe.
    ///
    /// # Errors
    /// Returns the I/O error if the directory cannot be created.
    pub fn resolve_directory(
        &self,
        base_dir: &Path,
        entity: &EntityIdentity,
        kind: CacheKind,
        ensure: bool,
    ) -> std::io::Result<PathBuf> {
        let target = self.directory(base_dir, entity, kind);
        if ensure {
            std::fs::create_dir_all(&target)?;
        }
        Ok(target)
    }
}

/// Built-in policy of one kind.
fn builtin_spec(kind: CacheKind) -> CacheSpec {
    let (subdirectory, description, ttl_days, required, optional, per_entity): (
        &str,
        &str,
        Option<u32>,
        &[&str],
        &[&str],
        bool,
    ) = match kind {
        CacheKind::Financials => (
            "financials_cache",
            "Income, balance sheet and cash flow statements plus financial abstract",
            Some(7),
            &["profit_sheet.csv", "balance_sheet.csv", "cash_flow_sheet.csv"],
            &["financial_abstract.csv"],
            true,
        ),
        CacheKind::PriceSeries => (
            "prices",
            "Daily price bars with volume and turnover",
            Some(1),
            &["price.csv"],
            &[],
            true,
        ),
        CacheKind::ShareInfo => (
            "share_info",
            "Total and float share count history",
            Some(7),
            &["share_facts.csv"],
            &[],
            true,
        ),
        CacheKind::Disclosures => (
            "disclosures",
            "Listed company announcements index",
            Some(1),
            &["disclosures.csv"],
            &["index.json"],
            true,
        ),
        CacheKind::BasicSnapshot => (
            "basic_info_cache",
            "Market-wide basic information snapshot",
            Some(0),
            &[],
            &["basic_info.json"],
            false,
        ),
    };

    CacheSpec {
        kind,
        subdirectory: subdirectory.to_string(),
        description: description.to_string(),
        ttl_days,
        required_files: required.iter().map(|f| (*f).to_string()).collect(),
        optional_files: optional.iter().map(|f| (*f).to_string()).collect(),
        per_entity,
    }
}

/// Maps a policy file key to a kind, accepting legacy directory-style names.
fn kind_for_policy_key(key: &str) -> Option<CacheKind> {
    match key.trim() {
        "financials_cache" => Some(CacheKind::Financials),
        "prices" => Some(CacheKind::PriceSeries),
        "basic_info_cache" | "basic_info" => Some(CacheKind::BasicSnapshot),
        other => other.parse().ok(),
    }
}

fn is_plain_dir_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}
