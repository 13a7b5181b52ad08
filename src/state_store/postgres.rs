//! PostgreSQL-backed state store and timer.
//!
//! Batch states are stored as JSONB blobs keyed by batch id. Timers live in a
//! separate table; `take_due` leases rows with `FOR UPDATE SKIP LOCKED`, so
//! several orchestrator processes can poll the same database without firing
//! a timer twice while it is leased.
//!
//! Cross-process serialization of a batch uses a session-level advisory lock
//! held on a dedicated pooled connection for the whole operation. At most
//! half of the pool is ever spent on held locks, so the reads and writes made
//! under a lock always find a free connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use super::{DurableTimer, StateStore, StoreLock};
use crate::config::DatabaseConfig;
use crate::error::{PipelineError, Result};
use crate::models::BatchState;

const LOCK_KEY_PREFIX: &str = "pipeline_batch:";

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone)]
pub struct PgBatchStore {
    pool: PgPool,
    lock_permits: Arc<Semaphore>,
}

impl PgBatchStore {
    pub fn new(pool: PgPool) -> Self {
        let held_locks = (pool.options().get_max_connections() / 2).max(1);
        Self {
            pool,
            lock_permits: Arc::new(Semaphore::new(held_locks as usize)),
        }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!("Pipeline migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StateStore for PgBatchStore {
    async fn get(&self, batch_id: &str) -> Result<Option<BatchState>> {
        let row = sqlx::query("SELECT state FROM pipeline_batch_states WHERE batch_id = $1")
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("state")?;
                let state = serde_json::from_value(value).map_err(|e| {
                    PipelineError::storage("get", format!("corrupt state for {batch_id}: {e}"))
                })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, state: &BatchState) -> Result<()> {
        let value = serde_json::to_value(state)?;
        sqlx::query(
            r#"
            INSERT INTO pipeline_batch_states (batch_id, status, state, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (batch_id)
            DO UPDATE SET status = EXCLUDED.status,
                          state = EXCLUDED.state,
                          updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&state.batch_id)
        .bind(state.status.to_string())
        .bind(value)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(batch_id = %state.batch_id, status = %state.status, "Batch state persisted");
        Ok(())
    }

    async fn lock_batch(&self, batch_id: &str) -> Result<Box<dyn StoreLock>> {
        let permit = self
            .lock_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::storage("lock_batch", e.to_string()))?;

        let mut conn = self.pool.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock(hashtext($1))")
            .bind(lock_key(batch_id))
            .execute(&mut *conn)
            .await?;

        debug!(batch_id = %batch_id, "Advisory lock acquired");
        Ok(Box::new(PgAdvisoryLock {
            conn: Some(conn),
            batch_id: batch_id.to_string(),
            _permit: permit,
        }))
    }
}

fn lock_key(batch_id: &str) -> String {
    format!("{LOCK_KEY_PREFIX}{batch_id}")
}

/// Session-level advisory lock on one batch
#[derive(Debug)]
pub struct PgAdvisoryLock {
    conn: Option<PoolConnection<Postgres>>,
    batch_id: String,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl StoreLock for PgAdvisoryLock {
    async fn release(self: Box<Self>) -> Result<()> {
        let mut lock = self;
        let Some(mut conn) = lock.conn.take() else {
            return Ok(());
        };
        let unlocked = sqlx::query("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(lock_key(&lock.batch_id))
            .execute(&mut *conn)
            .await;
        if let Err(e) = unlocked {
            // closing the session drops every lock it holds
            drop(conn.detach());
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for PgAdvisoryLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(batch_id = %self.batch_id, "Advisory lock dropped unreleased, closing its session");
            drop(conn.detach());
        }
    }
}

#[async_trait]
impl DurableTimer for PgBatchStore {
    async fn set(&self, batch_id: &str, fire_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_batch_timers (batch_id, fire_at)
            VALUES ($1, $2)
            ON CONFLICT (batch_id) DO UPDATE SET fire_at = EXCLUDED.fire_at
            "#,
        )
        .bind(batch_id)
        .bind(fire_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, batch_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pipeline_batch_timers WHERE batch_id = $1")
            .bind(batch_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, batch_id: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT fire_at FROM pipeline_batch_timers WHERE batch_id = $1")
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("fire_at")?),
            None => None,
        })
    }

    async fn take_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            WITH due AS (
                SELECT batch_id, fire_at FROM pipeline_batch_timers
                WHERE fire_at <= $1
                ORDER BY fire_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE pipeline_batch_timers AS t
            SET fire_at = $3
            FROM due
            WHERE t.batch_id = due.batch_id
            RETURNING t.batch_id, due.fire_at AS due_at
            "#,
        )
        .bind(now)
        .bind(limit)
        .bind(lease_until)
        .fetch_all(&self.pool)
        .await?;

        let mut due = Vec::with_capacity(rows.len());
        for row in rows {
            let batch_id: String = row.try_get("batch_id")?;
            let due_at: DateTime<Utc> = row.try_get("due_at")?;
            due.push((due_at, batch_id));
        }
        due.sort();
        Ok(due.into_iter().map(|(_, batch_id)| batch_id).collect())
    }
}
