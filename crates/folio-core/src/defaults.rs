//! Centralized default constants for folio.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// STRUCTURE LOCKING
// =============================================================================

/// Prefix of the advisory lock key guarding a collection's document structure.
///
/// The full key is `collection-{collection_id}`.
pub const STRUCTURE_LOCK_PREFIX: &str = "collection-";

/// Prefix of the advisory lock key serialising collection creation per team.
pub const TEAM_LOCK_PREFIX: &str = "team-";

/// Maximum time a structure mutation waits for its lock, in milliseconds.
pub const LOCK_TIMEOUT_MS: u64 = 5_000;

/// Interval between acquisition attempts for polling lock backends, in milliseconds.
pub const LOCK_POLL_INTERVAL_MS: u64 = 25;

/// Expiry of a distributed lock whose holder never released it, in milliseconds.
///
/// Must exceed the longest expected load/mutate/save cycle.
pub const LOCK_TTL_MS: u64 = 30_000;

/// Key prefix for Redis-backed locks.
pub const REDIS_LOCK_PREFIX: &str = "folio:lock:";

// =============================================================================
// COLLECTIONS
// =============================================================================

/// Length of the random slug used in collection URLs.
pub const URL_ID_LENGTH: usize = 10;

/// Title of the document seeded into a team's first atlas collection.
pub const WELCOME_TITLE: &str = "Welcome to Folio";

/// A team with fewer collections than this (after creation) gets a welcome document.
pub const WELCOME_COLLECTION_THRESHOLD: i64 = 2;

// =============================================================================
// BACKENDS
// =============================================================================

/// Default Redis URL when `REDIS_URL` is not set.
pub const REDIS_URL: &str = "redis://localhost:6379";

/// Slow structure-mutation threshold in milliseconds (logged at WARN).
pub const SLOW_MUTATION_MS: u64 = 500;
