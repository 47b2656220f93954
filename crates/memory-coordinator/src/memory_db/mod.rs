//! Memory database module - SQLite-backed registry, context log, tombstones and primary progress
pub mod schema;
pub mod migration;
pub mod registry_store;
pub mod context_store;
pub mod tombstone_store;
pub mod progress_store;
pub use schema::*;
pub use migration::MigrationManager;
pub use registry_store::RegistryStore;
pub use context_store::{ContextStore, NewContextEntry};
pub use tombstone_store::TombstoneStore;
pub use progress_store::ProgressStore;
use std::path::Path;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

pub type DbPool = Arc<Pool<SqliteConnectionManager>>;

/// All relational state of the memory subsystem behind one connection pool
pub struct MemoryDatabase {
    pub registry: RegistryStore,
    pub contexts: ContextStore,
    pub tombstones: TombstoneStore,
    pub progress: ProgressStore,
    pool: DbPool,
}

impl MemoryDatabase {
    /// Open (or create) the database file and bring the schema up to date
    pub fn new(db_path: &Path, pool_size: u32) -> anyhow::Result<Self> {
        info!("Opening memory database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            .with_init(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;",
                )
            });
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let mut conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        info!("Memory database initialized successfully");
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// Private in-memory database. A single pooled connection holds the data,
    /// so it is never recycled and every statement is serialized through it.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        Ok(Self::from_pool(Arc::new(pool)))
    }

    fn from_pool(pool: DbPool) -> Self {
        Self {
            registry: RegistryStore::new(Arc::clone(&pool)),
            contexts: ContextStore::new(Arc::clone(&pool)),
            tombstones: TombstoneStore::new(Arc::clone(&pool)),
            progress: ProgressStore::new(Arc::clone(&pool)),
            pool,
        }
    }

    /// Shared pool, for collaborators that keep their tables in the same file
    pub fn pool(&self) -> DbPool {
        Arc::clone(&self.pool)
    }

    pub fn get_stats(&self) -> anyhow::Result<DatabaseStats> {
        let conn = self.pool.get()?;
        Ok(migration::get_database_stats(&conn)?)
    }
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}
