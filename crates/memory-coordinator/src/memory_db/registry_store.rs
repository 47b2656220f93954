//! Registry of memory spaces
use chrono::Utc;
use crate::memory::params::{InvalidParams, MemoryParams};
use crate::memory_db::schema::*;
use crate::memory_db::DbPool;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

const MEMORY_ID_SUFFIX_LEN: usize = 12;

pub struct RegistryStore {
    pool: DbPool,
}

impl RegistryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool.get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// Register a new active memory space for `app`
    pub fn create(&self, app: &str, params: &MemoryParams) -> anyhow::Result<MemorySpace> {
        if app.trim().is_empty() {
            return Err(InvalidParams("app must not be empty".to_string()).into());
        }
        params.validate()?;

        let memory_id = new_memory_id(app);
        let now = Utc::now();
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO mem_registry (memory_id, app, params_json, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                &memory_id,
                app,
                serde_json::to_string(params)?,
                MemoryStatus::Active.as_str(),
                now.to_rfc3339(),
            ],
        )?;

        info!("Created memory space {} for app {}", memory_id, app);
        Ok(MemorySpace {
            memory_id,
            app: app.to_string(),
            params: params.clone(),
            status: MemoryStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, memory_id: &str) -> anyhow::Result<Option<MemorySpace>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT memory_id, app, params_json, status, created_at, updated_at
             FROM mem_registry WHERE memory_id = ?1",
        )?;
        let row = stmt
            .query_row([memory_id], |row| Ok(RawSpace::from_row(row)))
            .optional()?;
        row.transpose()?.map(RawSpace::into_space).transpose()
    }

    /// Replace the params record. Returns false when the space is unknown.
    pub fn update_params(&self, memory_id: &str, params: &MemoryParams) -> anyhow::Result<bool> {
        params.validate()?;
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE mem_registry SET params_json = ?2, updated_at = ?3 WHERE memory_id = ?1",
            params![memory_id, serde_json::to_string(params)?, Utc::now().to_rfc3339()],
        )?;
        debug!("Updated params for memory space {} ({} rows)", memory_id, updated);
        Ok(updated > 0)
    }

    pub fn set_status(&self, memory_id: &str, status: MemoryStatus) -> anyhow::Result<bool> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE mem_registry SET status = ?2, updated_at = ?3 WHERE memory_id = ?1",
            params![memory_id, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        if updated > 0 {
            info!("Memory space {} is now {}", memory_id, status);
        }
        Ok(updated > 0)
    }

    /// Spaces owned by `app`, newest first
    pub fn list_by_app(&self, app: &str, limit: usize, offset: usize) -> anyhow::Result<Vec<MemorySpace>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT memory_id, app, params_json, status, created_at, updated_at
             FROM mem_registry WHERE app = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let mut rows = stmt.query(params![app, limit as i64, offset as i64])?;
        let mut spaces = Vec::new();
        while let Some(row) = rows.next()? {
            spaces.push(RawSpace::from_row(row)?.into_space()?);
        }
        Ok(spaces)
    }
}

fn new_memory_id(app: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", app, &suffix[..MEMORY_ID_SUFFIX_LEN])
}

/// Column values as read, before JSON and timestamp parsing
struct RawSpace {
    memory_id: String,
    app: String,
    params_json: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl RawSpace {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            memory_id: row.get(0)?,
            app: row.get(1)?,
            params_json: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_space(self) -> anyhow::Result<MemorySpace> {
        Ok(MemorySpace {
            params: MemoryParams::from_json(&self.params_json)?,
            status: self.status.parse()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            memory_id: self.memory_id,
            app: self.app,
        })
    }
}
