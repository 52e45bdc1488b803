//! Batch preparation over many entities.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use pitdata_core::{DatasetError, PreparedDataset};

use crate::assembler::{DatasetAssembler, PrepareOptions, parse_as_of};

/// Options of a batch run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum entities prepared at once. `0` and `1` both mean sequential.
    pub max_workers: usize,
    /// Per-entity time limit.
    pub entity_timeout: Option<Duration>,
    /// Options applied to every entity.
    pub prepare: PrepareOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_workers: 4,
            entity_timeout: None,
            prepare: PrepareOptions::default(),
        }
    }
}

impl BatchOptions {
    /// Sets the worker count.
    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the per-entity time limit.
    #[must_use]
    pub const fn with_entity_timeout(mut self, timeout: Duration) -> Self {
        self.entity_timeout = Some(timeout);
        self
    }

    /// Sets the options applied to every entity.
    #[must_use]
    pub const fn with_prepare(mut self, prepare: PrepareOptions) -> Self {
        self.prepare = prepare;
        self
    }
}

/// Outcome of a batch: one entry per requested entity, in exactly one map.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Prepared datasets keyed by the requested entity string.
    pub results: BTreeMap<String, PreparedDataset>,
    /// Failures keyed by the requested entity string.
    pub errors: BTreeMap<String, DatasetError>,
}

impl BatchReport {
    /// Number of entities covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len() + self.errors.len()
    }

    /// Returns true if the batch was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.errors.is_empty()
    }

    /// Returns true if every entity succeeded.
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Prepares datasets for many entities without letting one failure abort the rest.
#[derive(Clone, Debug)]
pub struct BatchRunner {
    assembler: DatasetAssembler,
}

impl BatchRunner {
    /// Creates a runner over `assembler`.
    #[must_use]
    pub const fn new(assembler: DatasetAssembler) -> Self {
        Self { assembler }
    }

    /// Prepares every entity in `entities` as of `as_of`.
    ///
    /// Entity strings are trimmed and deduplicated; blank ones are ignored.
    /// Every remaining entity appears in exactly one of the report's maps.
    /// A malformed `as_of` is reported against every entity.
    pub async fn run_batch<S: AsRef<str>>(
        &self,
        entities: &[S],
        as_of: &str,
        options: &BatchOptions,
    ) -> BatchReport {
        let mut keys: Vec<String> = entities
            .iter()
            .map(|raw| raw.as_ref().trim().to_string())
            .filter(|raw| !raw.is_empty())
            .collect();
        keys.sort();
        keys.dedup();

        let mut report = BatchReport::default();
        let as_of = match parse_as_of(as_of) {
            Ok(date) => date,
            Err(e) => {
                for key in keys {
                    report
                        .errors
                        .insert(key, DatasetError::Validation(e.to_string()));
                }
                return report;
            }
        };
        let as_of = as_of.format("%Y-%m-%d").to_string();

        info!(
            entities = keys.len(),
            max_workers = options.max_workers,
            %as_of,
            "Starting batch"
        );

        if options.max_workers <= 1 || keys.len() <= 1 {
            for key in keys {
                let result = prepare_one(&self.assembler, &key, &as_of, options).await;
                record(&mut report, key, result);
            }
        } else {
            let tasks = keys.into_iter().map(|key| {
                let assembler = self.assembler.clone();
                let as_of = as_of.clone();
                let options = *options;
                async move {
                    let entity = key.clone();
                    let handle = tokio::spawn(async move {
                        prepare_one(&assembler, &entity, &as_of, &options).await
                    });
                    let result = handle.await.unwrap_or_else(|e| {
                        Err(DatasetError::Worker {
                            entity: key.clone(),
                            message: e.to_string(),
                        })
                    });
                    (key, result)
                }
            });

            let mut completed = stream::iter(tasks).buffer_unordered(options.max_workers);
            while let Some((key, result)) = completed.next().await {
                record(&mut report, key, result);
            }
        }

        info!(
            succeeded = report.results.len(),
            failed = report.errors.len(),
            "Batch finished"
        );
        report
    }
}

async fn prepare_one(
    assembler: &DatasetAssembler,
    entity: &str,
    as_of: &str,
    options: &BatchOptions,
) -> Result<PreparedDataset, DatasetError> {
    let prepare = assembler.prepare_dataset(entity, as_of, &options.prepare);
    match options.entity_timeout {
        Some(limit) => tokio::time::timeout(limit, prepare).await.unwrap_or_else(|_| {
            Err(DatasetError::Timeout {
                entity: entity.to_string(),
                elapsed: limit,
            })
        }),
        None => prepare.await,
    }
}

fn record(report: &mut BatchReport, key: String, result: Result<PreparedDataset, DatasetError>) {
    match result {
        Ok(dataset) => {
            debug!(entity = %key, "Entity prepared");
            report.results.insert(key, dataset);
        }
        Err(e) => {
            warn!(entity = %key, category = e.category(), error = %e, "Entity failed");
            report.errors.insert(key, e);
        }
    }
}
