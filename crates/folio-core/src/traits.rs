//! Repository traits implemented by storage back-ends.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{Collection, DocumentSummary, DocumentTree, NewCollection, NewDocument, Result};

// =============================================================================
// STRUCTURE STORE
// =============================================================================

/// Whole-tree persistence of a collection's document structure.
///
/// The tree is read and written as one opaque value; there is no per-node
/// storage.
#[async_trait]
pub trait StructureStore: Send + Sync {
    /// Load the current structure.
    ///
    /// `Ok(None)` means the collection exists but has no structure (journal).
    /// A missing collection is [`crate::Error::CollectionNotFound`].
    async fn load_structure(&self, collection_id: Uuid) -> Result<Option<DocumentTree>>;

    /// Replace the stored structure.
    async fn save_structure(&self, collection_id: Uuid, tree: &DocumentTree) -> Result<()>;
}

// =============================================================================
// COLLECTION & DOCUMENT REPOSITORIES
// =============================================================================

/// Repository for collection records.
#[async_trait]
pub trait CollectionRepository: Send + Sync {
    /// Create a collection, seeding its structure.
    async fn create(&self, req: NewCollection) -> Result<Collection>;

    /// Get a collection by ID (soft-deleted collections are excluded).
    async fn get(&self, id: Uuid) -> Result<Option<Collection>>;

    /// List a team's collections, oldest first.
    async fn list_for_team(&self, team_id: Uuid) -> Result<Vec<Collection>>;

    /// Soft-delete a collection and every document in it.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Repository for document records.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Create a document record. Does not touch any structure.
    async fn create(&self, req: NewDocument) -> Result<DocumentSummary>;

    /// Get the summary projection of a live document.
    async fn get_summary(&self, id: Uuid) -> Result<Option<DocumentSummary>>;

    /// Soft-delete documents by id; returns how many were live.
    async fn delete_documents(&self, ids: &[Uuid]) -> Result<u64>;

    /// Live documents below `roots` through `parent_document_id`, at any
    /// depth. The roots themselves are not included.
    async fn descendant_ids(&self, roots: &[Uuid]) -> Result<Vec<Uuid>>;
}
