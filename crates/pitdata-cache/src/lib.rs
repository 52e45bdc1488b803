#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/pitdata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cache registry and filesystem artifacts for point-in-time data.
//!
//! Layout on disk:
//!
//! ```text
//! <base_dir>/<entity-bucket>/<kind-subdirectory>/{data files, .cache_registry_meta.json}
//! <base_dir>/<kind-subdirectory>/...            (global kinds)
//! ```

/// CSV codecs for cached artifacts.
pub mod artifact;
/// In-memory fetcher for tests and development.
pub mod fixture;
/// Cache health reports over many entities.
pub mod health;
/// Per-directory refresh locks.
pub mod locks;
/// Fetcher that never reaches upstream.
pub mod offline;
/// Cache policy table and directory resolution.
pub mod registry;
/// Cache status checks and refresh metadata.
pub mod status;

// Re-export the core cache types for convenience
pub use pitdata_core::{CacheKind, CacheSpec, CacheStatus, RefreshMetadata};

pub use artifact::ArtifactError;
pub use fixture::{EntityFixture, FixtureFetcher};
pub use health::{CacheHealthRow, failing_rows, parse_targets};
pub use locks::{RefreshGuard, RefreshLocks};
pub use offline::OfflineFetcher;
pub use registry::{CacheRegistry, PolicyOverride, PolicyOverrides, RegistryError};
pub use status::{CacheStatusChecker, read_metadata, record_refresh, write_metadata};
