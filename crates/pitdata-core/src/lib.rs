#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/pitdata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the point-in-time data cache.
//!
//! - [`EntityIdentity`](types::EntityIdentity) - Normalized instrument identity
//! - [`CacheKind`](kind::CacheKind) / [`MarketClass`](kind::MarketClass) - Cache categories and instrument classes
//! - [`CacheSpec`](cache::CacheSpec) / [`CacheStatus`](cache::CacheStatus) - Cache policy and health snapshot
//! - [`Fetcher`](fetcher::Fetcher) - Upstream collaborator that refreshes a cache directory
//! - [`PreparedDataset`](dataset::PreparedDataset) - Immutable as-of dataset handed to callers

/// Cache policy, status, and refresh metadata types.
pub mod cache;
/// Immutable dataset types returned to callers.
pub mod dataset;
/// Error types for cache and dataset operations.
pub mod error;
/// Fetcher trait for refreshing cache directories from upstream.
pub mod fetcher;
/// Cache kind and market class definitions.
pub mod kind;
/// Core row types (entity identity, price bars, statement rows, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use cache::{CacheSpec, CacheStatus, META_FILENAME, RefreshMetadata};
pub use dataset::{DisclosureWindow, FinancialStatements, PreparedDataset, PriceSeries};
pub use error::{DatasetError, FetchError, Result};
pub use fetcher::{FetchOutcome, FetchRequest, Fetcher};
pub use kind::{CacheKind, MarketClass};
pub use types::{Disclosure, EntityIdentity, FinancialRow, PriceBar, ShareFact, StatementKind};
