//! Per-directory refresh locks.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

type LockTable = DashMap<PathBuf, Arc<Mutex<()>>>;

/// Keyed async mutexes, one per cache directory.
///
/// A cache directory is exactly one (entity, kind) pair, so holding its lock
/// serializes refreshes of that pair while leaving every other pair free.
/// Entries live only while someone holds or waits for them.
#[derive(Debug, Default)]
pub struct RefreshLocks {
    locks: Arc<LockTable>,
}

impl RefreshLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `dir`.
    ///
    /// The guard releases the lock when dropped.
    pub async fn acquire(&self, dir: &Path) -> RefreshGuard {
        // Clone the Arc out so no map shard stays locked across the await.
        let lock = self
            .locks
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        trace!(dir = %dir.display(), "Waiting for refresh lock");
        RefreshGuard {
            guard: Some(lock.lock_owned().await),
            table: Arc::clone(&self.locks),
            dir: dir.to_path_buf(),
        }
    }

    /// Number of directories currently locked or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if no directory is locked or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive hold on one cache directory.
///
/// Dropping the guard unlocks the directory and forgets its entry when no
/// other task is waiting on it.
#[derive(Debug)]
pub struct RefreshGuard {
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<LockTable>,
    dir: PathBuf,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        // Release first so our own Arc no longer counts.
        drop(self.guard.take());
        // The shard lock taken by remove_if excludes a concurrent acquire.
        let removed = self
            .table
            .remove_if(&self.dir, |_, lock| Arc::strong_count(lock) == 1)
            .is_some();
        if removed {
            trace!(dir = %self.dir.display(), "Dropped idle refresh lock");
        }
    }
}
