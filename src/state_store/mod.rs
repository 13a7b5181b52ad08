//! # Durable State Store and Timer
//!
//! The persistence capabilities the orchestrator consumes:
//!
//! - [`StateStore`]: one full [`BatchState`] blob per batch id, read and
//!   written whole, plus a per-batch [`StoreLock`] that excludes other
//!   processes sharing the same store
//! - [`DurableTimer`]: at most one outstanding wake-up per batch id; setting
//!   a timer replaces any existing one
//!
//! [`memory`] keeps both in process (tests, single node). [`postgres`] keeps
//! both in PostgreSQL so batches and their timers survive restarts and several
//! orchestrator processes can share one database.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::BatchState;

pub use memory::{MemoryStateStore, MemoryTimer};
#[cfg(feature = "postgres")]
pub use postgres::PgBatchStore;

/// Exclusive hold on one batch inside the store, taken for a whole
/// read-modify-write
#[async_trait]
pub trait StoreLock: Send {
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Lock for stores that are never shared between processes
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStoreLock;

#[async_trait]
impl StoreLock for LocalStoreLock {
    async fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn get(&self, batch_id: &str) -> Result<Option<BatchState>>;

    /// Insert or overwrite the batch's state
    async fn put(&self, state: &BatchState) -> Result<()>;

    /// Block until no other process holds `batch_id`
    async fn lock_batch(&self, _batch_id: &str) -> Result<Box<dyn StoreLock>> {
        Ok(Box::new(LocalStoreLock))
    }
}

#[async_trait]
pub trait DurableTimer: Send + Sync + 'static {
    /// Arm the batch's timer, replacing any existing one
    async fn set(&self, batch_id: &str, fire_at: DateTime<Utc>) -> Result<()>;

    async fn clear(&self, batch_id: &str) -> Result<()>;

    async fn get(&self, batch_id: &str) -> Result<Option<DateTime<Utc>>>;

    /// Claim up to `limit` timers due at `now`, earliest first.
    ///
    /// Claimed timers are not removed: they are pushed back to `lease_until`,
    /// so a tick that ends without re-arming or clearing the timer fires
    /// again once the lease runs out.
    async fn take_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>>;
}
