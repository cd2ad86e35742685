//! PostgreSQL session-level advisory locks.
//!
//! Each held lock pins one pooled connection, because session advisory
//! locks belong to the connection that took them. Waiters hold a connection
//! only for the duration of one `pg_try_advisory_lock` attempt. Keys are
//! hashed with `hashtext` into the lock id space. A guard dropped without
//! `release` closes its connection instead of returning it to the pool,
//! which ends the session and frees the lock.
//!
//! The provider should own a pool separate from the one structure loads and
//! saves run on (see [`crate::create_lock_pool`]); otherwise lock holders
//! can starve waiting for a connection to persist with.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::{debug, warn};

use folio_core::{Error, LockConfig, LockGuard, LockProvider, Result};

use crate::log_pool_metrics;

/// Lock provider backed by `pg_try_advisory_lock`.
#[derive(Clone)]
pub struct PgAdvisoryLockProvider {
    pool: PgPool,
    poll_interval: Duration,
}

impl PgAdvisoryLockProvider {
    pub fn new(pool: PgPool, config: &LockConfig) -> Self {
        Self {
            pool,
            poll_interval: config.poll_interval,
        }
    }

    async fn try_lock(conn: &mut PoolConnection<Postgres>, key: &str) -> Result<bool> {
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(key)
            .fetch_one(&mut **conn)
            .await
            .map_err(Error::Database)?;
        Ok(acquired)
    }
}

fn timed_out(key: &str, start: Instant) -> Error {
    let waited_ms = start.elapsed().as_millis() as u64;
    warn!(
        subsystem = "lock",
        component = "pg_advisory",
        op = "acquire",
        lock_key = key,
        duration_ms = waited_ms,
        "Advisory lock wait timed out"
    );
    Error::LockTimeout {
        key: key.to_string(),
        waited_ms,
    }
}

#[async_trait]
impl LockProvider for PgAdvisoryLockProvider {
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<Box<dyn LockGuard>> {
        let start = Instant::now();

        loop {
            // Pool exhaustion counts against the same deadline.
            let remaining = timeout.saturating_sub(start.elapsed());
            let mut conn = match tokio::time::timeout(remaining, self.pool.acquire()).await {
                Ok(Ok(conn)) => conn,
                Ok(Err(sqlx::Error::PoolTimedOut)) | Err(_) => {
                    log_pool_metrics(&self.pool);
                    return Err(timed_out(key, start));
                }
                Ok(Err(e)) => return Err(Error::Database(e)),
            };

            if Self::try_lock(&mut conn, key).await? {
                debug!(
                    subsystem = "lock",
                    component = "pg_advisory",
                    op = "acquire",
                    lock_key = key,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Advisory lock acquired"
                );
                return Ok(Box::new(PgAdvisoryLockGuard {
                    key: key.to_string(),
                    conn: Some(conn),
                }));
            }
            drop(conn);

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(timed_out(key, start));
            }
            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

struct PgAdvisoryLockGuard {
    key: String,
    conn: Option<PoolConnection<Postgres>>,
}

#[async_trait]
impl LockGuard for PgAdvisoryLockGuard {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let unlocked: std::result::Result<bool, sqlx::Error> =
            sqlx::query_scalar("SELECT pg_advisory_unlock(hashtext($1))")
                .bind(&self.key)
                .fetch_one(&mut *conn)
                .await;

        match unlocked {
            Ok(true) => {
                debug!(
                    subsystem = "lock",
                    component = "pg_advisory",
                    op = "release",
                    lock_key = %self.key,
                    "Advisory lock released"
                );
                Ok(())
            }
            Ok(false) => {
                conn.close_on_drop();
                Err(Error::Lock(format!(
                    "advisory lock {} was not held by this session",
                    self.key
                )))
            }
            Err(e) => {
                conn.close_on_drop();
                Err(Error::Database(e))
            }
        }
    }
}

impl Drop for PgAdvisoryLockGuard {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            warn!(
                subsystem = "lock",
                component = "pg_advisory",
                op = "drop",
                lock_key = %self.key,
                "Advisory lock guard dropped unreleased, closing its session"
            );
            conn.close_on_drop();
        }
    }
}
