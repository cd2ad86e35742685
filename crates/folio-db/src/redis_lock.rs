//! Redis-backed structure locks for deployments without a shared database
//! session.
//!
//! A lock is a key set with `SET NX PX` to a random token. Release deletes
//! the key only while it still holds that token, so a holder whose lock
//! expired cannot free someone else's.
//!
//! ## Configuration
//!
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
//! - `FOLIO_LOCK_TTL_MS`: key expiry, see [`LockConfig`]

use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info, warn};
use uuid::Uuid;

use folio_core::defaults::{REDIS_LOCK_PREFIX, REDIS_URL};
use folio_core::{Error, LockConfig, LockGuard, LockProvider, Result};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Lock provider backed by Redis keys with expiry.
#[derive(Clone)]
pub struct RedisLockProvider {
    conn: ConnectionManager,
    prefix: String,
    ttl: Duration,
    poll_interval: Duration,
}

impl RedisLockProvider {
    /// Connect to `redis_url`.
    pub async fn connect(redis_url: &str, config: &LockConfig) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(
            subsystem = "lock",
            component = "redis",
            op = "connect",
            ttl_ms = config.ttl.as_millis() as u64,
            "Redis lock provider connected"
        );
        Ok(Self::new(conn, config))
    }

    /// Connect to `REDIS_URL` (default: redis://localhost:6379).
    pub async fn from_env(config: &LockConfig) -> Result<Self> {
        let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| REDIS_URL.to_string());
        Self::connect(&redis_url, config).await
    }

    pub fn new(conn: ConnectionManager, config: &LockConfig) -> Self {
        Self {
            conn,
            prefix: REDIS_LOCK_PREFIX.to_string(),
            ttl: config.ttl,
            poll_interval: config.poll_interval,
        }
    }

    /// Use a key prefix other than the default.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Full Redis key for a lock name.
    pub fn redis_key(&self, key: &str) -> String {
        redis_key(&self.prefix, key)
    }

    async fn try_set(&self, redis_key: &str, token: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(redis_key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}

fn redis_key(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key)
}

#[async_trait]
impl LockProvider for RedisLockProvider {
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<Box<dyn LockGuard>> {
        let start = Instant::now();
        let full_key = self.redis_key(key);
        let token = Uuid::new_v4().to_string();

        loop {
            if self.try_set(&full_key, &token).await? {
                debug!(
                    subsystem = "lock",
                    component = "redis",
                    op = "acquire",
                    lock_key = key,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Redis lock acquired"
                );
                return Ok(Box::new(RedisLockGuard {
                    key: key.to_string(),
                    redis_key: full_key,
                    token,
                    conn: self.conn.clone(),
                    released: false,
                }));
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                let waited_ms = elapsed.as_millis() as u64;
                warn!(
                    subsystem = "lock",
                    component = "redis",
                    op = "acquire",
                    lock_key = key,
                    duration_ms = waited_ms,
                    "Redis lock wait timed out"
                );
                return Err(Error::LockTimeout {
                    key: key.to_string(),
                    waited_ms,
                });
            }
            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

struct RedisLockGuard {
    key: String,
    redis_key: String,
    token: String,
    conn: ConnectionManager,
    released: bool,
}

async fn delete_if_owner(mut conn: ConnectionManager, redis_key: &str, token: &str) -> Result<i64> {
    let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
        .key(redis_key)
        .arg(token)
        .invoke_async(&mut conn)
        .await?;
    Ok(deleted)
}

#[async_trait]
impl LockGuard for RedisLockGuard {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let deleted = delete_if_owner(self.conn.clone(), &self.redis_key, &self.token).await?;
        if deleted == 0 {
            return Err(Error::Lock(format!(
                "redis lock {} expired before release",
                self.key
            )));
        }
        debug!(
            subsystem = "lock",
            component = "redis",
            op = "release",
            lock_key = %self.key,
            "Redis lock released"
        );
        Ok(())
    }
}

impl Drop for RedisLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            subsystem = "lock",
            component = "redis",
            op = "drop",
            lock_key = %self.key,
            "Redis lock guard dropped unreleased"
        );
        // Without a runtime the key is left to expire.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let conn = self.conn.clone();
            let redis_key = std::mem::take(&mut self.redis_key);
            let token = std::mem::take(&mut self.token);
            handle.spawn(async move {
                if let Err(e) = delete_if_owner(conn, &redis_key, &token).await {
                    warn!(lock_key = %redis_key, error = %e, "Deferred redis lock release failed");
                }
            });
        }
    }
}
