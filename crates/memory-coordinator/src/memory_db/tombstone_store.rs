//! Logical deletes, scoped by memory space and content locator
use chrono::Utc;
use crate::memory_db::schema::*;
use crate::memory_db::DbPool;
use rusqlite::params;
use std::collections::HashSet;
use tracing::info;

pub struct TombstoneStore {
    pool: DbPool,
}

impl TombstoneStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool.get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// Record a delete. Repeated deletes of the same locator add rows but
    /// change nothing observable.
    pub fn mark_deleted(&self, memory_id: &str, content_ref: &str) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO mem_tombstones (memory_id, content_ref, deleted_at) VALUES (?1, ?2, ?3)",
            params![memory_id, content_ref, Utc::now().to_rfc3339()],
        )?;
        info!("Tombstoned {} in {}", content_ref, memory_id);
        Ok(())
    }

    pub fn is_deleted(&self, memory_id: &str, content_ref: &str) -> anyhow::Result<bool> {
        let conn = self.get_conn()?;
        let found: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM mem_tombstones WHERE memory_id = ?1 AND content_ref = ?2)",
            params![memory_id, content_ref],
            |row| row.get(0),
        )?;
        Ok(found != 0)
    }

    /// All tombstones of a space, newest first
    pub fn list_deleted(&self, memory_id: &str) -> anyhow::Result<Vec<Tombstone>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, memory_id, content_ref, deleted_at FROM mem_tombstones
             WHERE memory_id = ?1 ORDER BY id DESC",
        )?;
        let mut rows = stmt.query([memory_id])?;
        let mut tombstones = Vec::new();
        while let Some(row) = rows.next()? {
            let deleted_at: String = row.get(3)?;
            tombstones.push(Tombstone {
                id: row.get(0)?,
                memory_id: row.get(1)?,
                content_ref: row.get(2)?,
                deleted_at: parse_timestamp(&deleted_at)?,
            });
        }
        Ok(tombstones)
    }

    pub fn deleted_refs(&self, memory_id: &str) -> anyhow::Result<HashSet<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT content_ref FROM mem_tombstones WHERE memory_id = ?1",
        )?;
        let refs = stmt
            .query_map([memory_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(refs)
    }
}
