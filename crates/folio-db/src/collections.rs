//! Collection repository and structure store implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use folio_core::defaults::WELCOME_TITLE;
use folio_core::{
    generate_url_id, initial_structure, needs_welcome, new_v7, team_lock_key, Collection,
    CollectionRepository, DocumentTree, Error, NewCollection, NewDocument, Result,
    StructureStore, TreeNode,
};

use crate::documents::{welcome_text, PgDocumentRepository};

const COLLECTION_COLUMNS: &str = "id, url_id, name, description, color, private, collection_type,
     team_id, creator_id, document_structure, created_at_utc, updated_at_utc";

/// PostgreSQL implementation of CollectionRepository and StructureStore.
#[derive(Clone)]
pub struct PgCollectionRepository {
    pool: Pool<Postgres>,
    documents: PgDocumentRepository,
}

impl PgCollectionRepository {
    /// Create a new PgCollectionRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            documents: PgDocumentRepository::new(pool.clone()),
            pool,
        }
    }

    /// Count a team's live collections inside a transaction.
    async fn team_collection_count_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        team_id: Uuid,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM collection WHERE team_id = $1 AND deleted_at IS NULL",
        )
        .bind(team_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    /// Replace the stored structure inside a transaction.
    pub async fn save_structure_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        collection_id: Uuid,
        tree: &DocumentTree,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE collection SET document_structure = $2, updated_at_utc = $3
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(collection_id)
        .bind(tree.to_json()?)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::CollectionNotFound(collection_id));
        }
        Ok(())
    }
}

fn collection_from_row(row: &PgRow) -> Result<Collection> {
    let collection_type: String = row.try_get("collection_type")?;
    let structure: Option<serde_json::Value> = row.try_get("document_structure")?;
    Ok(Collection {
        id: row.try_get("id")?,
        url_id: row.try_get("url_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        color: row.try_get("color")?,
        private: row.try_get("private")?,
        collection_type: collection_type.parse()?,
        team_id: row.try_get("team_id")?,
        creator_id: row.try_get("creator_id")?,
        document_structure: structure.map(DocumentTree::from_json).transpose()?,
        created_at_utc: row.try_get("created_at_utc")?,
        updated_at_utc: row.try_get("updated_at_utc")?,
    })
}

#[async_trait]
impl CollectionRepository for PgCollectionRepository {
    async fn create(&self, req: NewCollection) -> Result<Collection> {
        let id = new_v7();
        let now = Utc::now();
        let url_id = req.url_id.clone().unwrap_or_else(generate_url_id);
        let empty = initial_structure(req.collection_type, None);
        let empty_json = empty.as_ref().map(DocumentTree::to_json).transpose()?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Serializes creates per team until commit, so only the first
        // collection counts itself alone and gets the welcome document.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(team_lock_key(req.team_id))
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO collection (id, url_id, name, description, color, private,
                                     collection_type, team_id, creator_id,
                                     document_structure, created_at_utc, updated_at_utc)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)",
        )
        .bind(id)
        .bind(&url_id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.color)
        .bind(req.private)
        .bind(req.collection_type.to_string())
        .bind(req.team_id)
        .bind(req.creator_id)
        .bind(empty_json)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let team_count = self.team_collection_count_tx(&mut tx, req.team_id).await?;
        let mut structure = empty;
        if needs_welcome(req.collection_type, team_count) {
            let welcome = self
                .documents
                .create_tx(
                    &mut tx,
                    NewDocument {
                        collection_id: id,
                        parent_document_id: None,
                        team_id: req.team_id,
                        user_id: req.creator_id,
                        title: WELCOME_TITLE.to_string(),
                        text: welcome_text(&format!("/collections/{}", id)),
                        publish: true,
                    },
                )
                .await?;
            let seeded = initial_structure(req.collection_type, Some(TreeNode::from(&welcome)));
            if let Some(ref tree) = seeded {
                self.save_structure_tx(&mut tx, id, tree).await?;
            }
            structure = seeded;
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "collections",
            op = "create",
            collection_id = %id,
            collection_type = %req.collection_type,
            node_count = structure.as_ref().map(|t| t.len()).unwrap_or(0),
            "Collection created"
        );

        Ok(Collection {
            id,
            url_id,
            name: req.name,
            description: req.description,
            color: req.color,
            private: req.private,
            collection_type: req.collection_type,
            team_id: req.team_id,
            creator_id: req.creator_id,
            document_structure: structure,
            created_at_utc: now,
            updated_at_utc: now,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<Collection>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM collection WHERE id = $1 AND deleted_at IS NULL",
            COLLECTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(collection_from_row).transpose()
    }

    async fn list_for_team(&self, team_id: Uuid) -> Result<Vec<Collection>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM collection
             WHERE team_id = $1 AND deleted_at IS NULL
             ORDER BY created_at_utc, id",
            COLLECTION_COLUMNS
        ))
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(collection_from_row).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Discard the structure with the collection
        let result = sqlx::query(
            "UPDATE collection SET deleted_at = $2, document_structure = NULL, updated_at_utc = $2
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::CollectionNotFound(id));
        }

        let documents = sqlx::query(
            "UPDATE document SET deleted_at = $2, updated_at_utc = $2
             WHERE collection_id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "collections",
            op = "delete",
            collection_id = %id,
            documents = documents.rows_affected(),
            "Collection deleted"
        );
        Ok(())
    }
}

#[async_trait]
impl StructureStore for PgCollectionRepository {
    async fn load_structure(&self, collection_id: Uuid) -> Result<Option<DocumentTree>> {
        let row: Option<(Option<serde_json::Value>,)> = sqlx::query_as(
            "SELECT document_structure FROM collection WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(collection_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some((Some(value),)) => Ok(Some(DocumentTree::from_json(value)?)),
            Some((None,)) => Ok(None),
            None => Err(Error::CollectionNotFound(collection_id)),
        }
    }

    async fn save_structure(&self, collection_id: Uuid, tree: &DocumentTree) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        self.save_structure_tx(&mut tx, collection_id, tree).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}

