//! Concurrency tests for structure mutations.
//!
//! Two requests mutating the same collection each hold their own in-memory
//! copy and read-modify-write the stored tree. Without the advisory lock the
//! later save overwrites the earlier one; with it both changes survive.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use folio_core::memory::InMemoryStructureStore;
use folio_core::{
    AddOptions, Collection, CollectionStructureService, CollectionType, DocumentTree,
    InMemoryLockProvider, LockConfig, LockGuard, LockProvider, Result, TreeNode,
};

/// Store round-trip latency; wide enough that two loads overlap.
const STORE_LATENCY: Duration = Duration::from_millis(20);

/// Grants every lock immediately, i.e. no mutual exclusion.
struct UnguardedLocks;

struct NoopGuard(String);

#[async_trait]
impl LockGuard for NoopGuard {
    fn key(&self) -> &str {
        &self.0
    }

    async fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl LockProvider for UnguardedLocks {
    async fn acquire(&self, key: &str, _timeout: Duration) -> Result<Box<dyn LockGuard>> {
        Ok(Box::new(NoopGuard(key.to_string())))
    }

    fn backend(&self) -> &'static str {
        "unguarded"
    }
}

fn atlas_collection() -> Collection {
    Collection {
        id: Uuid::new_v4(),
        url_id: folio_core::generate_url_id(),
        name: "Engineering".to_string(),
        description: Some("Team handbook".to_string()),
        color: None,
        private: false,
        collection_type: CollectionType::Atlas,
        team_id: Uuid::new_v4(),
        creator_id: Uuid::new_v4(),
        document_structure: Some(DocumentTree::new()),
        created_at_utc: Utc::now(),
        updated_at_utc: Utc::now(),
    }
}

fn leaf(title: &str) -> TreeNode {
    TreeNode::new(Uuid::new_v4(), title, format!("/doc/{}", title.to_lowercase()))
}

fn setup(locks: Arc<dyn LockProvider>) -> (CollectionStructureService, InMemoryStructureStore, Collection) {
    let store = InMemoryStructureStore::new().with_latency(STORE_LATENCY);
    let collection = atlas_collection();
    store.insert_collection(collection.id, collection.document_structure.clone());
    let config = LockConfig::new().timeout(Duration::from_secs(2));
    let service = CollectionStructureService::new(locks, Arc::new(store.clone()), config);
    (service, store, collection)
}

#[tokio::test]
async fn test_concurrent_inserts_without_lock_lose_an_update() {
    let (service, store, collection) = setup(Arc::new(UnguardedLocks));
    let mut first = collection.clone();
    let mut second = collection.clone();

    let (a, b) = tokio::join!(
        service.add_document(&mut first, leaf("First"), None, None, AddOptions::default()),
        service.add_document(&mut second, leaf("Second"), None, None, AddOptions::default()),
    );
    assert!(a.unwrap());
    assert!(b.unwrap());

    // Both saves succeeded, but only the last writer's tree is stored.
    assert_eq!(store.save_count(), 2);
    assert_eq!(store.snapshot(collection.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_inserts_with_lock_apply_both() {
    let (service, store, collection) = setup(Arc::new(InMemoryLockProvider::new()));
    let mut first = collection.clone();
    let mut second = collection.clone();
    let (x, y) = (leaf("First"), leaf("Second"));

    let (a, b) = tokio::join!(
        service.add_document(&mut first, x.clone(), None, None, AddOptions::default()),
        service.add_document(&mut second, y.clone(), None, None, AddOptions::default()),
    );
    assert!(a.unwrap());
    assert!(b.unwrap());

    let stored = store.snapshot(collection.id).unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.contains(x.id));
    assert!(stored.contains(y.id));
    // The later request saw the earlier one's insert after reloading.
    assert_eq!(second.document_structure.as_ref(), Some(&stored));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_spawned_inserts_all_survive() {
    let (service, store, collection) = setup(Arc::new(InMemoryLockProvider::new()));
    let mut handles = Vec::new();

    for i in 0..8 {
        let service = service.clone();
        let mut copy = collection.clone();
        handles.push(tokio::spawn(async move {
            let node = leaf(&format!("Doc{}", i));
            let id = node.id;
            service
                .add_document(&mut copy, node, None, None, AddOptions::default())
                .await
                .map(|_| id)
        }));
    }

    let mut ids = Vec::new();
    for handle in futures::future::join_all(handles).await {
        ids.push(handle.expect("task panicked").expect("insert failed"));
    }

    let stored = store.snapshot(collection.id).unwrap();
    assert_eq!(stored.len(), 8);
    for id in ids {
        assert!(stored.contains(id));
    }
    assert!(stored.validate().is_ok());
}

#[tokio::test]
async fn test_other_collection_not_blocked() {
    let locks = InMemoryLockProvider::new();
    let (service, store, mut busy) = setup(Arc::new(locks.clone()));
    let mut idle = atlas_collection();
    store.insert_collection(idle.id, Some(DocumentTree::new()));

    let _held = locks
        .acquire(&folio_core::structure_lock_key(busy.id), Duration::from_millis(10))
        .await
        .unwrap();

    let idle_result = service
        .add_document(&mut idle, leaf("Free"), None, None, AddOptions::default())
        .await;
    assert!(idle_result.unwrap());

    let quick = CollectionStructureService::new(
        Arc::new(locks.clone()),
        Arc::new(store.clone()),
        LockConfig::new().timeout(Duration::from_millis(30)),
    );
    let busy_result = quick
        .add_document(&mut busy, leaf("Blocked"), None, None, AddOptions::default())
        .await;
    match busy_result {
        Err(e) => assert!(e.is_retryable()),
        Ok(_) => panic!("busy collection should time out"),
    }
}
