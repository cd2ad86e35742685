//! Integration tests for collection structures stored in PostgreSQL.
//!
//! Run with a migrated-capable database:
//! `DATABASE_URL=postgres://... cargo test -p folio-db -- --ignored`

use std::sync::Arc;
use std::time::{Duration, Instant};

use folio_db::test_fixtures::{TestDatabase, TEST_MAX_CONNECTIONS};
use folio_db::{
    AddOptions, CollectionRepository, CollectionStructureService, CollectionType,
    DocumentRepository, Error, LockConfig, NewCollection, NewDocument, NodePatch, RemoveOptions,
    StructureStore, TreeNode,
};
use uuid::Uuid;

fn lock_config() -> LockConfig {
    LockConfig::new()
        .timeout(Duration::from_secs(5))
        .poll_interval(Duration::from_millis(10))
}

async fn setup() -> TestDatabase {
    let _ = dotenvy::dotenv();
    TestDatabase::new().await
}

async fn new_document(test_db: &TestDatabase, collection_id: Uuid, title: &str) -> TreeNode {
    new_child_document(test_db, collection_id, None, title).await
}

async fn new_child_document(
    test_db: &TestDatabase,
    collection_id: Uuid,
    parent_document_id: Option<Uuid>,
    title: &str,
) -> TreeNode {
    let summary = test_db
        .db
        .documents
        .create(NewDocument {
            collection_id,
            parent_document_id,
            team_id: test_db.team_id,
            user_id: test_db.user_id,
            title: title.to_string(),
            text: String::new(),
            publish: true,
        })
        .await
        .expect("Failed to create document");
    TreeNode::from(&summary)
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_first_collection_gets_welcome_document() {
    let test_db = setup().await;

    let first = test_db.create_collection("Handbook").await;
    let tree = first.document_structure.as_ref().expect("atlas has a structure");
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.roots()[0].title, "Welcome to Folio");

    let welcome = test_db
        .db
        .documents
        .get_summary(tree.roots()[0].id)
        .await
        .unwrap()
        .expect("welcome document persisted");
    assert_eq!(welcome.collection_id, first.id);

    let second = test_db.create_collection("Engineering").await;
    assert_eq!(second.document_structure.map(|t| t.len()), Some(0));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_journal_has_no_structure() {
    let test_db = setup().await;

    let journal = test_db
        .create_collection_of_type("Daily", CollectionType::Journal)
        .await;
    assert!(journal.document_structure.is_none());

    let stored = test_db
        .db
        .collections
        .load_structure(journal.id)
        .await
        .unwrap();
    assert!(stored.is_none());

    let service = test_db.db.structure_service(lock_config());
    let mut journal = journal;
    let node = TreeNode::new(Uuid::new_v4(), "Entry", "/doc/entry");
    let placed = service
        .add_document(&mut journal, node, None, None, AddOptions::default())
        .await
        .unwrap();
    assert!(!placed);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_structure_round_trips_through_jsonb() {
    let test_db = setup().await;
    let collection = test_db.create_collection("Handbook").await;
    let store = &test_db.db.collections;

    let mut tree = collection.document_structure.clone().unwrap();
    let child = TreeNode::new(Uuid::new_v4(), "Child", "/doc/child-1");
    let parent = TreeNode::new(Uuid::new_v4(), "Parent", "/doc/parent-1")
        .with_children(vec![child.clone()]);
    assert!(tree.insert(parent.clone(), None, Some(0)));
    store.save_structure(collection.id, &tree).await.unwrap();

    let loaded = store.load_structure(collection.id).await.unwrap().unwrap();
    assert_eq!(loaded, tree);
    assert_eq!(loaded.roots()[0].id, parent.id);
    assert_eq!(loaded.roots()[0].children[0].id, child.id);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_missing_collection_is_reported() {
    let test_db = setup().await;
    let missing = Uuid::new_v4();

    let err = test_db
        .db
        .collections
        .load_structure(missing)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CollectionNotFound(id) if id == missing));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_service_add_update_remove() {
    let test_db = setup().await;
    let mut collection = test_db.create_collection("Handbook").await;
    let service = test_db.db.structure_service(lock_config());

    let parent = new_document(&test_db, collection.id, "Guides").await;
    let child = new_document(&test_db, collection.id, "Setup").await;

    assert!(service
        .add_document(&mut collection, parent.clone(), None, None, AddOptions::default())
        .await
        .unwrap());
    assert!(service
        .add_document(
            &mut collection,
            child.clone(),
            Some(parent.id),
            None,
            AddOptions::default()
        )
        .await
        .unwrap());

    assert!(service
        .update_document(&mut collection, child.id, NodePatch::title("Installation"))
        .await
        .unwrap());

    let stored = test_db
        .db
        .collections
        .load_structure(collection.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.find(child.id).unwrap().title, "Installation");
    assert_eq!(Some(&stored), collection.document_structure.as_ref());

    let removed = service
        .remove_document(&mut collection, parent.id, RemoveOptions::default())
        .await
        .unwrap()
        .expect("parent removed");
    assert_eq!(removed.subtree_ids(), vec![parent.id, child.id]);

    let stored = test_db
        .db
        .collections
        .load_structure(collection.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.contains(parent.id));
    assert!(!stored.contains(child.id));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_service_move_and_delete() {
    let test_db = setup().await;
    let mut collection = test_db.create_collection("Handbook").await;
    let service = test_db.db.structure_service(lock_config());

    let a = new_document(&test_db, collection.id, "A").await;
    let b = new_document(&test_db, collection.id, "B").await;
    for node in [a.clone(), b.clone()] {
        service
            .add_document(&mut collection, node, None, None, AddOptions::default())
            .await
            .unwrap();
    }

    assert!(service
        .move_document(&mut collection, b.id, Some(a.id), None)
        .await
        .unwrap());
    let tree = collection.document_structure.as_ref().unwrap();
    assert_eq!(tree.locate(b.id), Some((Some(a.id), 0)));

    let removed = service
        .delete_document(&mut collection, a.id, &test_db.db.documents)
        .await
        .unwrap();
    assert!(removed.is_some());
    assert!(test_db.db.documents.get_summary(a.id).await.unwrap().is_none());
    assert!(test_db.db.documents.get_summary(b.id).await.unwrap().is_none());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_concurrent_inserts_all_survive() {
    let test_db = setup().await;
    let collection = test_db.create_collection("Handbook").await;
    let service = test_db.db.structure_service(lock_config());
    let before = collection.document_structure.as_ref().map_or(0, |t| t.len());

    let mut handles = Vec::new();
    for i in 0..6 {
        let service = service.clone();
        let mut local = collection.clone();
        handles.push(tokio::spawn(async move {
            let node = TreeNode::new(Uuid::new_v4(), format!("Doc {}", i), format!("/doc/{}", i));
            service
                .add_document(&mut local, node, None, None, AddOptions::default())
                .await
        }));
    }
    for result in futures::future::join_all(handles).await {
        assert!(result.unwrap().unwrap());
    }

    let stored = test_db
        .db
        .collections
        .load_structure(collection.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.len(), before + 6);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_deleted_collection_rejects_saves() {
    let test_db = setup().await;
    let mut collection = test_db.create_collection("Handbook").await;
    let service: CollectionStructureService = test_db.db.structure_service_with_locks(
        Arc::new(folio_db::InMemoryLockProvider::new()),
        lock_config(),
    );

    test_db.db.collections.delete(collection.id).await.unwrap();
    assert!(test_db.db.collections.get(collection.id).await.unwrap().is_none());

    let err = service
        .add_document(
            &mut collection,
            TreeNode::new(Uuid::new_v4(), "Late", "/doc/late"),
            None,
            None,
            AddOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CollectionNotFound(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_concurrent_first_creates_seed_one_welcome() {
    let test_db = setup().await;

    let mut handles = Vec::new();
    for i in 0..4 {
        let collections = test_db.db.collections.clone();
        let req = NewCollection::new(
            format!("Team space {}", i),
            test_db.team_id,
            test_db.user_id,
        );
        handles.push(tokio::spawn(async move { collections.create(req).await }));
    }
    let created: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let seeded = created
        .iter()
        .filter(|c| c.document_structure.as_ref().map_or(0, |t| t.len()) == 1)
        .count();
    assert_eq!(seeded, 1);
    assert_eq!(
        test_db
            .db
            .collections
            .list_for_team(test_db.team_id)
            .await
            .unwrap()
            .len(),
        4
    );

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_mutations_beyond_pool_size_complete() {
    let test_db = setup().await;
    let service = test_db.db.structure_service(lock_config());
    let count = TEST_MAX_CONNECTIONS as usize * 2;

    let mut collections = Vec::new();
    for i in 0..count {
        collections.push(test_db.create_collection(&format!("Space {}", i)).await);
    }

    let start = Instant::now();
    let mut handles = Vec::new();
    for mut collection in collections.clone() {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let node = TreeNode::new(Uuid::new_v4(), "Notes", "/doc/notes");
            service
                .add_document(&mut collection, node, None, None, AddOptions::default())
                .await
        }));
    }
    for result in futures::future::join_all(handles).await {
        assert!(result.unwrap().unwrap());
    }
    assert!(start.elapsed() < lock_config().timeout);

    for collection in &collections {
        let before = collection.document_structure.as_ref().map_or(0, |t| t.len());
        let stored = test_db
            .db
            .collections
            .load_structure(collection.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.len(), before + 1);
    }

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_delete_in_journal_cascades_to_children() {
    let test_db = setup().await;
    let mut journal = test_db
        .create_collection_of_type("Daily", CollectionType::Journal)
        .await;
    let service = test_db.db.structure_service(lock_config());

    let entry = new_document(&test_db, journal.id, "Monday").await;
    let note = new_child_document(&test_db, journal.id, Some(entry.id), "Standup").await;
    let detail = new_child_document(&test_db, journal.id, Some(note.id), "Blockers").await;

    let removed = service
        .delete_document(&mut journal, entry.id, &test_db.db.documents)
        .await
        .unwrap();
    assert!(removed.is_none());
    for id in [entry.id, note.id, detail.id] {
        assert!(test_db.db.documents.get_summary(id).await.unwrap().is_none());
    }

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_delete_outside_structure_cascades_to_children() {
    let test_db = setup().await;
    let mut collection = test_db.create_collection("Handbook").await;
    let service = test_db.db.structure_service(lock_config());

    let draft = new_document(&test_db, collection.id, "Draft").await;
    let child = new_child_document(&test_db, collection.id, Some(draft.id), "Outline").await;
    let sibling = new_document(&test_db, collection.id, "Published").await;

    let removed = service
        .delete_document(&mut collection, draft.id, &test_db.db.documents)
        .await
        .unwrap();
    assert!(removed.is_none());
    assert!(test_db.db.documents.get_summary(draft.id).await.unwrap().is_none());
    assert!(test_db.db.documents.get_summary(child.id).await.unwrap().is_none());
    assert!(test_db.db.documents.get_summary(sibling.id).await.unwrap().is_some());

    let descendants = test_db
        .db
        .documents
        .descendant_ids(&[draft.id])
        .await
        .unwrap();
    assert!(descendants.is_empty());

    test_db.cleanup().await;
}
