//! In-process state store and timer backed by `DashMap`.
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use pipeline_core::state_store::{DurableTimer, MemoryTimer};
//!
//! # tokio_test::block_on(async {
//! let timer = MemoryTimer::new();
//! timer.set("batch-1", Utc::now() - Duration::seconds(1)).await.unwrap();
//! timer.set("batch-2", Utc::now() + Duration::hours(1)).await.unwrap();
//!
//! let lease_until = Utc::now() + Duration::seconds(30);
//! let due = timer.take_due(Utc::now(), lease_until, 10).await.unwrap();
//! assert_eq!(due, vec!["batch-1".to_string()]);
//! assert_eq!(timer.get("batch-1").await.unwrap(), Some(lease_until));
//! # });
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{DurableTimer, StateStore};
use crate::error::Result;
use crate::models::BatchState;

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: DashMap<String, BatchState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, batch_id: &str) -> Result<Option<BatchState>> {
        Ok(self.states.get(batch_id).map(|entry| entry.value().clone()))
    }

    async fn put(&self, state: &BatchState) -> Result<()> {
        self.states.insert(state.batch_id.clone(), state.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTimer {
    timers: DashMap<String, DateTime<Utc>>,
}

impl MemoryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of armed timers
    pub fn armed(&self) -> usize {
        self.timers.len()
    }
}

#[async_trait]
impl DurableTimer for MemoryTimer {
    async fn set(&self, batch_id: &str, fire_at: DateTime<Utc>) -> Result<()> {
        self.timers.insert(batch_id.to_string(), fire_at);
        Ok(())
    }

    async fn clear(&self, batch_id: &str) -> Result<()> {
        self.timers.remove(batch_id);
        Ok(())
    }

    async fn get(&self, batch_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.timers.get(batch_id).map(|entry| *entry.value()))
    }

    async fn take_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let mut due: Vec<(DateTime<Utc>, String)> = self
            .timers
            .iter()
            .filter(|entry| *entry.value() <= now)
            .map(|entry| (*entry.value(), entry.key().clone()))
            .collect();
        due.sort();
        due.truncate(limit);

        let mut taken = Vec::with_capacity(due.len());
        for (_, batch_id) in due {
            // cleared or re-armed to a later time since the scan: leave it
            if let Some(mut fire_at) = self.timers.get_mut(&batch_id) {
                if *fire_at <= now {
                    *fire_at = lease_until;
                    taken.push(batch_id);
                }
            }
        }
        Ok(taken)
    }
}
