//! Advisory lock abstraction for structure mutations.
//!
//! A [`LockProvider`] hands out named, cooperative locks with a bounded wait.
//! The in-process [`InMemoryLockProvider`] serves single-process deployments
//! and tests; `folio-db` provides PostgreSQL and Redis providers for
//! multi-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Source of named advisory locks.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Acquire the lock named `key`, waiting at most `timeout`.
    ///
    /// Fails with [`Error::LockTimeout`] when the wait expires.
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<Box<dyn LockGuard>>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// A held lock.
///
/// `release` is idempotent. Guards dropped without release free the lock on
/// a best-effort basis specific to each backend.
#[async_trait]
pub trait LockGuard: Send {
    fn key(&self) -> &str;

    async fn release(&mut self) -> Result<()>;
}

type SlotMap = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Per-key async mutexes held in process memory.
///
/// A key's slot lives only while someone holds or waits for it.
#[derive(Clone, Default)]
pub struct InMemoryLockProvider {
    slots: SlotMap,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| Error::Lock(format!("lock registry poisoned: {}", e)))?;
        Ok(slots.entry(key.to_string()).or_default().clone())
    }

    /// Whether `key` is currently held by someone.
    pub fn is_held(&self, key: &str) -> bool {
        match self.slots.lock() {
            Ok(slots) => slots
                .get(key)
                .map(|slot| slot.try_lock().is_err())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Number of keys with a live slot.
    pub fn slot_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }
}

// Drops the slot for `key` once no guard or waiter references it. Waiters
// clone the slot under the registry lock, so the count check cannot race them.
fn prune_slot(slots: &SlotMap, key: &str) {
    if let Ok(mut slots) = slots.lock() {
        if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(key);
        }
    }
}

#[async_trait]
impl LockProvider for InMemoryLockProvider {
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<Box<dyn LockGuard>> {
        let slot = self.slot(key)?;
        let start = Instant::now();

        let acquired = tokio::time::timeout(timeout, slot.lock_owned()).await;
        match acquired {
            Ok(guard) => {
                debug!(
                    subsystem = "lock",
                    component = "memory_lock",
                    op = "acquire",
                    lock_key = key,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Lock acquired"
                );
                Ok(Box::new(InMemoryLockGuard {
                    key: key.to_string(),
                    guard: Some(guard),
                    slots: self.slots.clone(),
                }))
            }
            Err(_) => {
                prune_slot(&self.slots, key);
                let waited_ms = start.elapsed().as_millis() as u64;
                warn!(
                    subsystem = "lock",
                    component = "memory_lock",
                    op = "acquire",
                    lock_key = key,
                    duration_ms = waited_ms,
                    "Lock wait timed out"
                );
                Err(Error::LockTimeout {
                    key: key.to_string(),
                    waited_ms,
                })
            }
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct InMemoryLockGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    slots: SlotMap,
}

#[async_trait]
impl LockGuard for InMemoryLockGuard {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(&mut self) -> Result<()> {
        if let Some(guard) = self.guard.take() {
            drop(guard);
            prune_slot(&self.slots, &self.key);
            debug!(
                subsystem = "lock",
                component = "memory_lock",
                op = "release",
                lock_key = %self.key,
                "Lock released"
            );
        }
        Ok(())
    }
}

impl Drop for InMemoryLockGuard {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            drop(guard);
            prune_slot(&self.slots, &self.key);
        }
    }
}
