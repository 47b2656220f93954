//! Append-only context log
use chrono::Utc;
use crate::memory_db::schema::*;
use crate::memory_db::DbPool;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

const ENTRY_COLUMNS: &str = "uid, memory_id, app, description, content_ref, content_hash,
     qa_count, is_summarized, summarized_at, created_at, updated_at";

/// LIMIT/OFFSET value; counts past `i64::MAX` clamp instead of wrapping
/// negative, which SQLite would read as "no limit"
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Fields supplied by the caller when appending a turn
#[derive(Debug, Clone)]
pub struct NewContextEntry {
    pub memory_id: String,
    pub app: String,
    pub content_ref: String,
    pub content_hash: String,
    pub description: Option<String>,
}

pub struct ContextStore {
    pool: DbPool,
}

impl ContextStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool.get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// Append unless the space already holds an entry with the same hash.
    /// The flag is true only when a row was written.
    pub fn insert_or_get(&self, entry: &NewContextEntry) -> anyhow::Result<(ContextEntry, bool)> {
        let conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT INTO mem_contexts
             (uid, memory_id, app, description, content_ref, content_hash,
              qa_count, is_summarized, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, FALSE, ?7, ?7)
             ON CONFLICT(memory_id, content_hash) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                &entry.memory_id,
                &entry.app,
                &entry.description,
                &entry.content_ref,
                &entry.content_hash,
                now,
            ],
        )? > 0;

        let stored = conn
            .query_row(
                &format!(
                    "SELECT {} FROM mem_contexts WHERE memory_id = ?1 AND content_hash = ?2",
                    ENTRY_COLUMNS
                ),
                params![&entry.memory_id, &entry.content_hash],
                |row| Ok(RawEntry::from_row(row)),
            )??
            .into_entry()?;

        if inserted {
            debug!("Appended context {} to {}", stored.uid, stored.memory_id);
        } else {
            debug!("Context {} already present in {}", stored.content_ref, stored.memory_id);
        }
        Ok((stored, inserted))
    }

    pub fn get_by_uid(&self, uid: &str) -> anyhow::Result<Option<ContextEntry>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM mem_contexts WHERE uid = ?1", ENTRY_COLUMNS),
                [uid],
                |row| Ok(RawEntry::from_row(row)),
            )
            .optional()?;
        raw.transpose()?.map(RawEntry::into_entry).transpose()
    }

    pub fn get_by_hash(&self, memory_id: &str, content_hash: &str) -> anyhow::Result<Option<ContextEntry>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM mem_contexts WHERE memory_id = ?1 AND content_hash = ?2",
                    ENTRY_COLUMNS
                ),
                params![memory_id, content_hash],
                |row| Ok(RawEntry::from_row(row)),
            )
            .optional()?;
        raw.transpose()?.map(RawEntry::into_entry).transpose()
    }

    /// Most recent entries of a space, newest first. Tombstoned and
    /// summarized entries are included.
    pub fn list_recent(&self, memory_id: &str, limit: usize, offset: usize) -> anyhow::Result<Vec<ContextEntry>> {
        self.query_entries(
            &format!(
                "SELECT {} FROM mem_contexts WHERE memory_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
                ENTRY_COLUMNS
            ),
            params![memory_id, sql_count(limit), sql_count(offset)],
        )
    }

    /// Newest-first entries of an app across all of its spaces
    pub fn list_by_app(&self, app: &str, limit: usize, offset: usize) -> anyhow::Result<Vec<ContextEntry>> {
        self.query_entries(
            &format!(
                "SELECT {} FROM mem_contexts WHERE app = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
                ENTRY_COLUMNS
            ),
            params![app, sql_count(limit), sql_count(offset)],
        )
    }

    pub fn mark_summarized(&self, uids: &[String]) -> anyhow::Result<usize> {
        if uids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE mem_contexts SET is_summarized = TRUE, summarized_at = ?2, updated_at = ?2
                 WHERE uid = ?1",
            )?;
            for uid in uids {
                updated += stmt.execute(params![uid, &now])?;
            }
        }
        tx.commit()?;
        debug!("Marked {} context entries as summarized", updated);
        Ok(updated)
    }

    pub fn bump_qa_count(&self, uid: &str, delta: i64) -> anyhow::Result<bool> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE mem_contexts SET qa_count = qa_count + ?2, updated_at = ?3 WHERE uid = ?1",
            params![uid, delta, Utc::now().to_rfc3339()],
        )?;
        Ok(updated > 0)
    }

    pub fn update_description(&self, uid: &str, description: Option<&str>) -> anyhow::Result<bool> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE mem_contexts SET description = ?2, updated_at = ?3 WHERE uid = ?1",
            params![uid, description, Utc::now().to_rfc3339()],
        )?;
        Ok(updated > 0)
    }

    fn query_entries(&self, sql: &str, args: impl rusqlite::Params) -> anyhow::Result<Vec<ContextEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(args)?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(RawEntry::from_row(row)?.into_entry()?);
        }
        Ok(entries)
    }
}

struct RawEntry {
    uid: String,
    memory_id: String,
    app: String,
    description: Option<String>,
    content_ref: String,
    content_hash: String,
    qa_count: i64,
    is_summarized: bool,
    summarized_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            uid: row.get(0)?,
            memory_id: row.get(1)?,
            app: row.get(2)?,
            description: row.get(3)?,
            content_ref: row.get(4)?,
            content_hash: row.get(5)?,
            qa_count: row.get(6)?,
            is_summarized: row.get(7)?,
            summarized_at: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_entry(self) -> anyhow::Result<ContextEntry> {
        Ok(ContextEntry {
            summarized_at: parse_optional_timestamp(self.summarized_at)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            uid: self.uid,
            memory_id: self.memory_id,
            app: self.app,
            description: self.description,
            content_ref: self.content_ref,
            content_hash: self.content_hash,
            qa_count: self.qa_count,
            is_summarized: self.is_summarized,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::MemoryDatabase;

    fn setup() -> (MemoryDatabase, String) {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let space = db.registry.create("chat", &Default::default()).unwrap();
        (db, space.memory_id)
    }

    fn new_entry(memory_id: &str, content_ref: &str) -> NewContextEntry {
        NewContextEntry {
            memory_id: memory_id.to_string(),
            app: "chat".to_string(),
            content_ref: content_ref.to_string(),
            content_hash: format!("hash-{}", content_ref),
            description: None,
        }
    }

    #[test]
    fn test_insert_is_idempotent_per_hash() {
        let (db, memory_id) = setup();
        let (first, inserted) = db.contexts.insert_or_get(&new_entry(&memory_id, "a.json")).unwrap();
        assert!(inserted);

        let (second, inserted) = db.contexts.insert_or_get(&new_entry(&memory_id, "a.json")).unwrap();
        assert!(!inserted);
        assert_eq!(first, second);
        assert_eq!(db.contexts.list_recent(&memory_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_same_hash_in_other_space_is_separate() {
        let (db, memory_id) = setup();
        let other = db.registry.create("chat", &Default::default()).unwrap().memory_id;

        db.contexts.insert_or_get(&new_entry(&memory_id, "a.json")).unwrap();
        let (_, inserted) = db.contexts.insert_or_get(&new_entry(&other, "a.json")).unwrap();
        assert!(inserted);
    }

    #[test]
    fn test_list_recent_is_newest_first() {
        let (db, memory_id) = setup();
        for name in ["a", "b", "c"] {
            db.contexts.insert_or_get(&new_entry(&memory_id, name)).unwrap();
        }

        let refs: Vec<_> = db
            .contexts
            .list_recent(&memory_id, 2, 0)
            .unwrap()
            .into_iter()
            .map(|e| e.content_ref)
            .collect();
        assert_eq!(refs, vec!["c", "b"]);
    }

    #[test]
    fn test_oversized_limits_are_clamped() {
        let (db, memory_id) = setup();
        for name in ["a", "b"] {
            db.contexts.insert_or_get(&new_entry(&memory_id, name)).unwrap();
        }

        assert_eq!(db.contexts.list_recent(&memory_id, usize::MAX, 0).unwrap().len(), 2);
        assert!(db.contexts.list_recent(&memory_id, usize::MAX, usize::MAX).unwrap().is_empty());
        assert_eq!(db.contexts.list_by_app("chat", usize::MAX, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_summarized_sets_flag_and_time() {
        let (db, memory_id) = setup();
        let (entry, _) = db.contexts.insert_or_get(&new_entry(&memory_id, "a")).unwrap();
        assert!(!entry.is_summarized);

        assert_eq!(db.contexts.mark_summarized(&[entry.uid.clone()]).unwrap(), 1);
        let loaded = db.contexts.get_by_uid(&entry.uid).unwrap().unwrap();
        assert!(loaded.is_summarized);
        assert!(loaded.summarized_at.is_some());
        assert_eq!(db.contexts.mark_summarized(&[]).unwrap(), 0);
    }

    #[test]
    fn test_lookup_helpers() {
        let (db, memory_id) = setup();
        let mut fresh = new_entry(&memory_id, "a");
        fresh.description = Some("first turn".into());
        let (entry, _) = db.contexts.insert_or_get(&fresh).unwrap();
        assert_eq!(entry.qa_count, 1);

        let by_hash = db.contexts.get_by_hash(&memory_id, "hash-a").unwrap().unwrap();
        assert_eq!(by_hash.uid, entry.uid);
        assert!(db.contexts.get_by_hash(&memory_id, "hash-z").unwrap().is_none());

        assert!(db.contexts.bump_qa_count(&entry.uid, 2).unwrap());
        assert!(db.contexts.update_description(&entry.uid, Some("edited")).unwrap());
        let loaded = db.contexts.get_by_uid(&entry.uid).unwrap().unwrap();
        assert_eq!(loaded.qa_count, 3);
        assert_eq!(loaded.description.as_deref(), Some("edited"));

        assert_eq!(db.contexts.list_by_app("chat", 10, 0).unwrap().len(), 1);
        assert!(db.contexts.list_by_app("notes", 10, 0).unwrap().is_empty());
    }
}
