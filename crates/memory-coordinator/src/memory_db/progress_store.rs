//! Primary memory progress: summary pointer plus turn counters
use chrono::Utc;
use crate::memory_db::schema::*;
use crate::memory_db::DbPool;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

pub struct ProgressStore {
    pool: DbPool,
}

impl ProgressStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool.get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// Create the zeroed progress row if it does not exist yet
    pub fn init(&self, memory_id: &str) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO mem_primary (memory_id, created_at, updated_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(memory_id) DO NOTHING",
            params![memory_id, now],
        )?;
        Ok(())
    }

    pub fn get(&self, memory_id: &str) -> anyhow::Result<Option<PrimaryProgress>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                "SELECT memory_id, summary_ref, summary_version, recent_qa_count, total_qa_count,
                 last_summary_index, last_summary_at, created_at, updated_at
                 FROM mem_primary WHERE memory_id = ?1",
                [memory_id],
                |row| Ok(RawProgress::from_row(row)),
            )
            .optional()?;
        raw.transpose()?.map(RawProgress::into_progress).transpose()
    }

    /// Add `delta` to both the total and the since-last-summary counters
    pub fn bump_counts(&self, memory_id: &str, delta: i64) -> anyhow::Result<PrimaryProgress> {
        self.init(memory_id)?;
        {
            let conn = self.get_conn()?;
            conn.execute(
                "UPDATE mem_primary
                 SET total_qa_count = total_qa_count + ?2,
                     recent_qa_count = recent_qa_count + ?2,
                     updated_at = ?3
                 WHERE memory_id = ?1",
                params![memory_id, delta, Utc::now().to_rfc3339()],
            )?;
        }
        let progress = self.require(memory_id)?;
        debug!(
            "Progress for {}: total={} recent={}",
            memory_id, progress.total_qa_count, progress.recent_qa_count
        );
        Ok(progress)
    }

    /// Point at a new summary: bump the version, reset the recent counter
    /// and move the watermark to the current total.
    pub fn complete_summary(&self, memory_id: &str, summary_ref: &str) -> anyhow::Result<PrimaryProgress> {
        self.init(memory_id)?;
        {
            let conn = self.get_conn()?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE mem_primary
                 SET summary_ref = ?2,
                     summary_version = summary_version + 1,
                     recent_qa_count = 0,
                     last_summary_index = total_qa_count,
                     last_summary_at = ?3,
                     updated_at = ?3
                 WHERE memory_id = ?1",
                params![memory_id, summary_ref, now],
            )?;
        }
        let progress = self.require(memory_id)?;
        info!(
            "Summary v{} for {} covers {} turns",
            progress.summary_version, memory_id, progress.last_summary_index
        );
        Ok(progress)
    }

    fn require(&self, memory_id: &str) -> anyhow::Result<PrimaryProgress> {
        self.get(memory_id)?
            .ok_or_else(|| anyhow::anyhow!("Missing progress row for {}", memory_id))
    }
}

struct RawProgress {
    memory_id: String,
    summary_ref: Option<String>,
    summary_version: i64,
    recent_qa_count: i64,
    total_qa_count: i64,
    last_summary_index: i64,
    last_summary_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawProgress {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            memory_id: row.get(0)?,
            summary_ref: row.get(1)?,
            summary_version: row.get(2)?,
            recent_qa_count: row.get(3)?,
            total_qa_count: row.get(4)?,
            last_summary_index: row.get(5)?,
            last_summary_at: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_progress(self) -> anyhow::Result<PrimaryProgress> {
        Ok(PrimaryProgress {
            last_summary_at: parse_optional_timestamp(self.last_summary_at)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            memory_id: self.memory_id,
            summary_ref: self.summary_ref,
            summary_version: self.summary_version,
            recent_qa_count: self.recent_qa_count,
            total_qa_count: self.total_qa_count,
            last_summary_index: self.last_summary_index,
        })
    }
}
