//! # folio-core
//!
//! Core types, traits, and abstractions for folio collections.
//!
//! This crate provides the ordered [`DocumentTree`] each atlas collection
//! owns, the [`LockProvider`] seam that serialises structure mutations per
//! collection, the [`StructureStore`] persistence seam, and the
//! [`CollectionStructureService`] that ties them together. Storage back-ends
//! live in `folio-db`.

pub mod config;
pub mod defaults;
pub mod error;
pub mod ids;
pub mod lock;
pub mod logging;
pub mod memory;
pub mod models;
pub mod structure;
pub mod traits;
pub mod tree;

// Re-export commonly used types at crate root
pub use config::LockConfig;
pub use error::{Error, Result};
pub use ids::{generate_url_id, new_v7, structure_lock_key, team_lock_key};
pub use lock::{InMemoryLockProvider, LockGuard, LockProvider};
pub use models::*;
pub use structure::{
    initial_structure, needs_welcome, AddOptions, CollectionStructureService, RemoveOptions,
};
pub use traits::*;
pub use tree::{DocumentTree, NodePatch, TreeNode};
