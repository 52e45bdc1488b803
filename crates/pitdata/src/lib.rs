#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/pitdata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Point-in-time dataset preparation.
//!
//! This crate wires the cache layer to an upstream [`Fetcher`] and serves
//! as-of datasets. It re-exports the core types and the cache layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pitdata::{DatasetAssembler, DatasetConfig, FixtureFetcher, PrepareOptions};
//!
//! #[tokio::main]
//! async fn main() -> pitdata::Result<()> {
//!     let assembler = DatasetAssembler::builder(DatasetConfig::new("./cache"))
//!         .fetcher(Arc::new(FixtureFetcher::new()))
//!         .build();
//!
//!     let dataset = assembler
//!         .prepare_dataset("600519.SH", "2024-06-28", &PrepareOptions::default())
//!         .await?;
//!     println!("{} bars", dataset.prices().len());
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use pitdata_core::*;

// Cache layer
pub use pitdata_cache::{
    CacheHealthRow, CacheRegistry, CacheStatusChecker, EntityFixture, FixtureFetcher,
    OfflineFetcher, RefreshGuard, RefreshLocks, artifact, failing_rows, parse_targets, read_metadata,
    record_refresh, write_metadata,
};

mod assembler;
mod batch;
mod config;
pub mod cutoff;
mod orchestrator;

pub use assembler::{AssemblerBuilder, DatasetAssembler, PrepareOptions, parse_as_of};
pub use batch::{BatchOptions, BatchReport, BatchRunner};
pub use config::DatasetConfig;
pub use orchestrator::{EnsureFlags, EntityCacheOrchestrator, RefreshOutcome};
