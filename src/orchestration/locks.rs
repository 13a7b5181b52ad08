//! Per-batch serialization.
//!
//! Every mutating orchestrator operation holds the batch's lock for its whole
//! read-modify-write, so a callback and a timer tick for the same batch never
//! interleave. Different batches never contend.
//!
//! Entries only live while someone holds or waits on them: releasing the last
//! guard removes the batch from the map.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

#[derive(Debug, Default)]
pub struct BatchLocks {
    locks: Arc<LockMap>,
}

/// Exclusive access to one batch; dropping it releases the lock
#[derive(Debug)]
pub struct BatchLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
    batch_id: String,
}

impl Drop for BatchLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters clone the Arc under the shard lock, so a count of one means
        // nobody else can reach this mutex.
        self.locks
            .remove_if(&self.batch_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl BatchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `batch_id`
    pub async fn acquire(&self, batch_id: &str) -> BatchLockGuard {
        let lock = self
            .locks
            .entry(batch_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        BatchLockGuard {
            guard: Some(guard),
            locks: self.locks.clone(),
            batch_id: batch_id.to_string(),
        }
    }

    /// Number of batches currently held or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
