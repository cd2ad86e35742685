//! Identifier helpers: time-ordered UUIDs, URL slugs, and lock keys.

use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use crate::defaults::{STRUCTURE_LOCK_PREFIX, TEAM_LOCK_PREFIX, URL_ID_LENGTH};

/// Generate a new UUIDv7 identifier.
///
/// UUIDv7 embeds a millisecond timestamp, so rows inserted later sort later.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Generate the random alphanumeric slug used in collection URLs.
pub fn generate_url_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(URL_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Advisory lock key guarding the document structure of `collection_id`.
pub fn structure_lock_key(collection_id: Uuid) -> String {
    format!("{}{}", STRUCTURE_LOCK_PREFIX, collection_id)
}

/// Advisory lock key serialising collection creation within a team.
pub fn team_lock_key(team_id: Uuid) -> String {
    format!("{}{}", TEAM_LOCK_PREFIX, team_id)
}
