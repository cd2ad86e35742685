//! # folio-db
//!
//! PostgreSQL persistence for folio collections.
//!
//! This crate provides:
//! - Connection pool management
//! - Collection and document repositories
//! - JSONB storage for each collection's document structure
//! - PostgreSQL advisory and Redis structure locks
//!
//! ## Example
//!
//! ```rust,ignore
//! use folio_db::{Database, LockConfig, TreeNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/folio").await?;
//!     db.migrate().await?;
//!
//!     let service = db.structure_service(LockConfig::from_env()?);
//!     let mut collection = db.collections.get(collection_id).await?.unwrap();
//!     service
//!         .add_document(&mut collection, TreeNode::new(doc_id, "Notes", "/doc/notes-x"), None, None, Default::default())
//!         .await?;
//!     Ok(())
//! }
//! ```
pub mod advisory_lock;
pub mod collections;
pub mod documents;
pub mod pool;
pub mod redis_lock;
pub mod schema;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::sync::Arc;

// Re-export core types
pub use folio_core::*;

pub use advisory_lock::PgAdvisoryLockProvider;
pub use collections::PgCollectionRepository;
pub use documents::{welcome_text, PgDocumentRepository};
pub use pool::{
    create_lock_pool, create_pool, create_pool_with_config, log_pool_metrics, PoolConfig,
    DEFAULT_LOCK_CONNECTIONS,
};
pub use redis_lock::RedisLockProvider;
pub use schema::validate_schema_name;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Pool that structure locks are held on, sharing no connections with
    /// `pool`.
    lock_pool: sqlx::Pool<sqlx::Postgres>,
    /// Collection repository, also the structure store.
    pub collections: PgCollectionRepository,
    /// Document repository.
    pub documents: PgDocumentRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    ///
    /// Must be called inside a Tokio runtime: the lock pool is created here.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self::with_lock_connections(pool, DEFAULT_LOCK_CONNECTIONS)
    }

    /// Like [`Database::new`] with an explicit lock pool size.
    pub fn with_lock_connections(pool: sqlx::Pool<sqlx::Postgres>, lock_connections: u32) -> Self {
        Self {
            collections: PgCollectionRepository::new(pool.clone()),
            documents: PgDocumentRepository::new(pool.clone()),
            lock_pool: create_lock_pool(&pool, lock_connections),
            pool,
        }
    }

    /// Connect to the database and create a new Database instance.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let lock_connections = config.lock_connections;
        let pool = create_pool_with_config(database_url, config).await?;
        Ok(Self::with_lock_connections(pool, lock_connections))
    }

    /// Run the embedded schema migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Get a reference to the advisory-lock pool.
    pub fn lock_pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.lock_pool
    }

    /// Structure service locking through PostgreSQL advisory locks.
    pub fn structure_service(&self, config: LockConfig) -> CollectionStructureService {
        let locks = Arc::new(PgAdvisoryLockProvider::new(self.lock_pool.clone(), &config));
        self.structure_service_with_locks(locks, config)
    }

    /// Structure service locking through an arbitrary provider.
    pub fn structure_service_with_locks(
        &self,
        locks: Arc<dyn LockProvider>,
        config: LockConfig,
    ) -> CollectionStructureService {
        CollectionStructureService::new(locks, Arc::new(self.collections.clone()), config)
    }
}
