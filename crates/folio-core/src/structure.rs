//! Locked read-modify-write of a collection's document structure.
//!
//! Every persisted mutation follows the same cycle: acquire the collection's
//! advisory lock, reload the structure from the store, apply the change,
//! save, release. The lock is released on every exit path. When a save
//! fails the in-memory collection keeps the mutated tree and the error is
//! returned; the caller must reload before retrying.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::defaults::{SLOW_MUTATION_MS, WELCOME_COLLECTION_THRESHOLD};
use crate::{
    structure_lock_key, Collection, CollectionType, DocumentRepository, DocumentTree, Error,
    LockConfig, LockProvider, NodePatch, Result, StructureStore, TreeNode,
};

/// Options for [`CollectionStructureService::add_document`].
#[derive(Debug, Clone)]
pub struct AddOptions {
    /// Lock, reload, and persist. When false the change is applied to the
    /// in-memory collection only and the enclosing operation owns locking
    /// and persistence.
    pub save: bool,
    /// Children to attach instead of the node's own, used to move a
    /// document together with its existing subtree.
    pub children: Option<Vec<TreeNode>>,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            save: true,
            children: None,
        }
    }
}

impl AddOptions {
    /// Apply in memory only.
    pub fn unsaved() -> Self {
        Self {
            save: false,
            children: None,
        }
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = Some(children);
        self
    }
}

/// Options for [`CollectionStructureService::remove_document`].
#[derive(Debug, Clone, Copy)]
pub struct RemoveOptions {
    pub save: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self { save: true }
    }
}

/// Whether a newly created collection gets a welcome document.
///
/// `team_collection_count` includes the new collection.
pub fn needs_welcome(collection_type: CollectionType, team_collection_count: i64) -> bool {
    collection_type.has_structure() && team_collection_count < WELCOME_COLLECTION_THRESHOLD
}

/// Structure a new collection starts with.
pub fn initial_structure(
    collection_type: CollectionType,
    welcome: Option<TreeNode>,
) -> Option<DocumentTree> {
    if !collection_type.has_structure() {
        return None;
    }
    Some(DocumentTree::from_roots(welcome.into_iter().collect()))
}

/// Applies structure mutations under the collection's advisory lock.
#[derive(Clone)]
pub struct CollectionStructureService {
    locks: Arc<dyn LockProvider>,
    store: Arc<dyn StructureStore>,
    config: LockConfig,
}

impl CollectionStructureService {
    pub fn new(
        locks: Arc<dyn LockProvider>,
        store: Arc<dyn StructureStore>,
        config: LockConfig,
    ) -> Self {
        Self {
            locks,
            store,
            config,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Place a document in the structure.
    ///
    /// Returns `false` for collections without a structure and when
    /// `parent_id` is not in the tree.
    pub async fn add_document(
        &self,
        collection: &mut Collection,
        node: TreeNode,
        parent_id: Option<Uuid>,
        index: Option<usize>,
        options: AddOptions,
    ) -> Result<bool> {
        let node = match options.children {
            Some(children) => node.with_children(children),
            None => node,
        };
        let placed = self
            .mutate(collection, "insert", node.id, options.save, move |tree| {
                tree.insert(node, parent_id, index)
            })
            .await?;
        Ok(placed.unwrap_or(false))
    }

    /// Refresh a document's title/url in the structure.
    pub async fn update_document(
        &self,
        collection: &mut Collection,
        id: Uuid,
        patch: NodePatch,
    ) -> Result<bool> {
        let updated = self
            .mutate(collection, "update", id, true, move |tree| tree.update(id, &patch))
            .await?;
        Ok(updated.unwrap_or(false))
    }

    /// Detach a document and its subtree from the structure.
    pub async fn remove_document(
        &self,
        collection: &mut Collection,
        id: Uuid,
        options: RemoveOptions,
    ) -> Result<Option<TreeNode>> {
        let removed = self
            .mutate(collection, "remove", id, options.save, move |tree| tree.remove(id))
            .await?;
        Ok(removed.flatten())
    }

    /// Move a document, with its subtree, under `parent_id` at `index`.
    ///
    /// Runs as one locked cycle with a single save. A missing document, a
    /// missing parent, or a parent inside the moved subtree leaves the tree
    /// unchanged and returns `false`.
    pub async fn move_document(
        &self,
        collection: &mut Collection,
        id: Uuid,
        parent_id: Option<Uuid>,
        index: Option<usize>,
    ) -> Result<bool> {
        let moved = self
            .mutate(collection, "move", id, true, move |tree| {
                let Some(current) = tree.find(id) else {
                    return false;
                };
                if let Some(parent_id) = parent_id {
                    if !tree.contains(parent_id) || current.subtree_ids().contains(&parent_id) {
                        return false;
                    }
                }
                match tree.remove(id) {
                    Some(node) => tree.insert(node, parent_id, index),
                    None => false,
                }
            })
            .await?;
        Ok(moved.unwrap_or(false))
    }

    /// Remove a document from the structure, then delete it and every
    /// descendant from the document store.
    ///
    /// Descendants are the detached subtree plus every document reachable
    /// through `parent_document_id`, so journal collections and documents
    /// missing from the structure cascade too. Fails with
    /// [`Error::DocumentNotFound`] when neither the structure nor the
    /// repository knows `id`.
    pub async fn delete_document(
        &self,
        collection: &mut Collection,
        id: Uuid,
        documents: &dyn DocumentRepository,
    ) -> Result<Option<TreeNode>> {
        let removed = self
            .remove_document(collection, id, RemoveOptions::default())
            .await?;
        let mut ids = match removed {
            Some(ref node) => node.subtree_ids(),
            None => {
                if documents.get_summary(id).await?.is_none() {
                    return Err(Error::DocumentNotFound(id));
                }
                vec![id]
            }
        };
        for descendant in documents.descendant_ids(&ids).await? {
            if !ids.contains(&descendant) {
                ids.push(descendant);
            }
        }
        let deleted = documents.delete_documents(&ids).await?;
        debug!(
            subsystem = "structure",
            op = "delete",
            collection_id = %collection.id,
            document_id = %id,
            deleted,
            "Documents deleted with structure entry"
        );
        Ok(removed)
    }

    /// Run `apply` against the collection's tree.
    ///
    /// `Ok(None)` means the collection has no structure.
    async fn mutate<T, F>(
        &self,
        collection: &mut Collection,
        op: &'static str,
        document_id: Uuid,
        save: bool,
        apply: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(&mut DocumentTree) -> T + Send,
        T: Send,
    {
        if !save {
            return Ok(collection.document_structure.as_mut().map(apply));
        }
        if collection.document_structure.is_none() {
            return Ok(None);
        }

        let key = structure_lock_key(collection.id);
        let start = Instant::now();
        let mut guard = self.locks.acquire(&key, self.config.timeout).await?;

        let outcome = self.locked_cycle(collection, apply).await;

        if let Err(e) = guard.release().await {
            error!(
                subsystem = "structure",
                op,
                lock_key = %key,
                backend = self.locks.backend(),
                error = %e,
                "Failed to release structure lock"
            );
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => {
                let node_count = collection
                    .document_structure
                    .as_ref()
                    .map(|t| t.len())
                    .unwrap_or(0);
                if duration_ms > SLOW_MUTATION_MS {
                    warn!(
                        subsystem = "structure",
                        op,
                        collection_id = %collection.id,
                        document_id = %document_id,
                        duration_ms,
                        slow = true,
                        "Slow structure mutation"
                    );
                }
                debug!(
                    subsystem = "structure",
                    op,
                    collection_id = %collection.id,
                    document_id = %document_id,
                    node_count,
                    duration_ms,
                    "Structure persisted"
                );
            }
            Err(e) => {
                warn!(
                    subsystem = "structure",
                    op,
                    collection_id = %collection.id,
                    document_id = %document_id,
                    duration_ms,
                    success = false,
                    error = %e,
                    "Structure mutation failed"
                );
            }
        }
        outcome
    }

    async fn locked_cycle<T, F>(&self, collection: &mut Collection, apply: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut DocumentTree) -> T + Send,
        T: Send,
    {
        let Some(mut tree) = self.store.load_structure(collection.id).await? else {
            collection.document_structure = None;
            return Ok(None);
        };
        let value = apply(&mut tree);
        let tree = collection.document_structure.insert(tree);
        self.store.save_structure(collection.id, tree).await?;
        Ok(Some(value))
    }
}
