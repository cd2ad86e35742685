//! Document repository implementation.
//!
//! Only the projection the collection structure needs is read back; full
//! document bodies are written on create and otherwise left alone.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use folio_core::{
    generate_url_id, new_v7, DocumentRepository, DocumentSummary, Error, NewDocument, Result,
};

/// PostgreSQL implementation of DocumentRepository.
#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    /// Create a new PgDocumentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a document inside an existing transaction.
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        req: NewDocument,
    ) -> Result<DocumentSummary> {
        let id = new_v7();
        let url_id = generate_url_id();
        let now = Utc::now();
        let published_at = req.publish.then_some(now);

        sqlx::query(
            "INSERT INTO document (id, url_id, collection_id, parent_document_id, team_id,
                                   created_by_id, last_modified_by_id, title, text,
                                   published_at, created_at_utc, updated_at_utc)
             VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8, $9, $10, $10)",
        )
        .bind(id)
        .bind(&url_id)
        .bind(req.collection_id)
        .bind(req.parent_document_id)
        .bind(req.team_id)
        .bind(req.user_id)
        .bind(&req.title)
        .bind(&req.text)
        .bind(published_at)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(DocumentSummary {
            id,
            url: DocumentSummary::url_for(&req.title, &url_id),
            title: req.title,
            collection_id: req.collection_id,
            parent_document_id: req.parent_document_id,
        })
    }
}

fn summary_from_row(row: &PgRow) -> Result<DocumentSummary> {
    let title: String = row.try_get("title")?;
    let url_id: String = row.try_get("url_id")?;
    Ok(DocumentSummary {
        id: row.try_get("id")?,
        url: DocumentSummary::url_for(&title, &url_id),
        title,
        collection_id: row.try_get("collection_id")?,
        parent_document_id: row.try_get("parent_document_id")?,
    })
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn create(&self, req: NewDocument) -> Result<DocumentSummary> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let summary = self.create_tx(&mut tx, req).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(summary)
    }

    async fn get_summary(&self, id: Uuid) -> Result<Option<DocumentSummary>> {
        let row = sqlx::query(
            "SELECT id, url_id, title, collection_id, parent_document_id
             FROM document
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(summary_from_row).transpose()
    }

    async fn delete_documents(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE document SET deleted_at = $2, updated_at_utc = $2
             WHERE id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(ids)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn descendant_ids(&self, roots: &[Uuid]) -> Result<Vec<Uuid>> {
        if roots.is_empty() {
            return Ok(Vec::new());
        }
        // UNION rather than UNION ALL stops on parent cycles.
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "WITH RECURSIVE descendants AS (
                 SELECT id FROM document
                 WHERE parent_document_id = ANY($1) AND deleted_at IS NULL
                 UNION
                 SELECT d.id FROM document d
                 JOIN descendants p ON d.parent_document_id = p.id
                 WHERE d.deleted_at IS NULL
             )
             SELECT id FROM descendants WHERE NOT (id = ANY($1))",
        )
        .bind(roots)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(ids)
    }
}

/// Body of the document seeded into a team's first collection.
pub fn welcome_text(collection_url: &str) -> String {
    format!(
        "# Welcome\n\n\
         Documents in this collection appear in the sidebar in the order you arrange them.\n\n\
         - Create a document with **New document**.\n\
         - Drag documents onto each other to nest them.\n\
         - Share the collection from [its page]({}).\n",
        collection_url
    )
}
