//! In-memory store and repository for tests and single-process use.
//!
//! ## Usage
//!
//! ```rust
//! use folio_core::memory::InMemoryStructureStore;
//! use folio_core::DocumentTree;
//! use std::time::Duration;
//! use uuid::Uuid;
//!
//! let store = InMemoryStructureStore::new().with_latency(Duration::from_millis(5));
//! let collection_id = Uuid::new_v4();
//! store.insert_collection(collection_id, Some(DocumentTree::new()));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    DocumentRepository, DocumentSummary, DocumentTree, Error, NewDocument, Result, StructureStore,
};

/// Structure store keeping trees in a map.
///
/// Latency is applied after reading and before writing, which widens the
/// window between a load and its save the way a real database round trip
/// does.
#[derive(Clone, Default)]
pub struct InMemoryStructureStore {
    trees: Arc<Mutex<HashMap<Uuid, Option<DocumentTree>>>>,
    latency: Duration,
    fail_saves: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl InMemoryStructureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every load and save by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register a collection; `None` models a journal collection.
    pub fn insert_collection(&self, collection_id: Uuid, tree: Option<DocumentTree>) {
        if let Ok(mut trees) = self.trees.lock() {
            trees.insert(collection_id, tree);
        }
    }

    /// Make subsequent saves fail with [`Error::Persistence`].
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current stored tree of a collection.
    pub fn snapshot(&self, collection_id: Uuid) -> Option<DocumentTree> {
        self.trees
            .lock()
            .ok()
            .and_then(|trees| trees.get(&collection_id).cloned().flatten())
    }

    fn trees(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Option<DocumentTree>>>> {
        self.trees
            .lock()
            .map_err(|e| Error::Internal(format!("structure map poisoned: {}", e)))
    }
}

#[async_trait]
impl StructureStore for InMemoryStructureStore {
    async fn load_structure(&self, collection_id: Uuid) -> Result<Option<DocumentTree>> {
        let tree = self
            .trees()?
            .get(&collection_id)
            .cloned()
            .ok_or(Error::CollectionNotFound(collection_id))?;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(tree)
    }

    async fn save_structure(&self, collection_id: Uuid, tree: &DocumentTree) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Persistence(format!(
                "save of collection {} rejected",
                collection_id
            )));
        }
        let mut trees = self.trees()?;
        match trees.get_mut(&collection_id) {
            Some(slot) => {
                *slot = Some(tree.clone());
                self.saves.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(Error::CollectionNotFound(collection_id)),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    summary: DocumentSummary,
    deleted: bool,
}

/// Document repository keeping summaries in a map.
#[derive(Clone, Default)]
pub struct InMemoryDocumentRepository {
    docs: Arc<Mutex<HashMap<Uuid, StoredDocument>>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a document exists and has not been deleted.
    pub fn is_live(&self, id: Uuid) -> bool {
        self.docs
            .lock()
            .map(|docs| docs.get(&id).map(|d| !d.deleted).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Number of live documents in a collection.
    pub fn live_count(&self, collection_id: Uuid) -> usize {
        self.docs
            .lock()
            .map(|docs| {
                docs.values()
                    .filter(|d| !d.deleted && d.summary.collection_id == collection_id)
                    .count()
            })
            .unwrap_or(0)
    }

    fn docs(&self) -> Result<MutexGuard<'_, HashMap<Uuid, StoredDocument>>> {
        self.docs
            .lock()
            .map_err(|e| Error::Internal(format!("document map poisoned: {}", e)))
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn create(&self, req: NewDocument) -> Result<DocumentSummary> {
        let id = crate::new_v7();
        let url_id = crate::generate_url_id();
        let summary = DocumentSummary {
            id,
            url: DocumentSummary::url_for(&req.title, &url_id),
            title: req.title,
            collection_id: req.collection_id,
            parent_document_id: req.parent_document_id,
        };
        self.docs()?.insert(
            id,
            StoredDocument {
                summary: summary.clone(),
                deleted: false,
            },
        );
        Ok(summary)
    }

    async fn get_summary(&self, id: Uuid) -> Result<Option<DocumentSummary>> {
        Ok(self
            .docs()?
            .get(&id)
            .filter(|d| !d.deleted)
            .map(|d| d.summary.clone()))
    }

    async fn delete_documents(&self, ids: &[Uuid]) -> Result<u64> {
        let mut docs = self.docs()?;
        let mut deleted = 0;
        for id in ids {
            if let Some(doc) = docs.get_mut(id) {
                if !doc.deleted {
                    doc.deleted = true;
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn descendant_ids(&self, roots: &[Uuid]) -> Result<Vec<Uuid>> {
        let docs = self.docs()?;
        let mut found: Vec<Uuid> = Vec::new();
        let mut frontier: Vec<Uuid> = roots.to_vec();
        while let Some(parent) = frontier.pop() {
            for doc in docs.values() {
                let id = doc.summary.id;
                if !doc.deleted
                    && doc.summary.parent_document_id == Some(parent)
                    && !roots.contains(&id)
                    && !found.contains(&id)
                {
                    found.push(id);
                    frontier.push(id);
                }
            }
        }
        Ok(found)
    }
}
