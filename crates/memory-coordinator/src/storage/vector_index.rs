//! Semantic index over embedded turns.
//!
//! Records carry exact-match tags (`memory_id`, `app`, `content_ref`, `role`)
//! plus free-form metadata. Search returns cosine distance, so smaller is
//! closer; callers convert to similarity themselves.
use crate::memory_db::DbPool;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("vector index backend error: {0}")]
    Backend(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<anyhow::Error> for VectorError {
    fn from(e: anyhow::Error) -> Self {
        VectorError::Backend(e.to_string())
    }
}

impl From<rusqlite::Error> for VectorError {
    fn from(e: rusqlite::Error) -> Self {
        VectorError::Backend(e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub memory_id: String,
    pub app: String,
    pub content_ref: String,
    pub role: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    pub vector: Vec<f32>,
}

/// Exact-match scope. `content_ref` narrows to a single blob when set.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFilter {
    pub memory_id: String,
    pub app: String,
    pub content_ref: Option<String>,
}

impl VectorFilter {
    pub fn space(memory_id: &str, app: &str) -> Self {
        Self { memory_id: memory_id.to_string(), app: app.to_string(), content_ref: None }
    }

    pub fn content(memory_id: &str, app: &str, content_ref: &str) -> Self {
        Self { content_ref: Some(content_ref.to_string()), ..Self::space(memory_id, app) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorHit {
    pub id: String,
    pub content_ref: String,
    pub role: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    /// Cosine distance in [0, 2]
    pub distance: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<Vec<String>, VectorError>;

    /// Nearest records within `filter`, closest first
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>, VectorError>;

    /// Physically remove every record matching `filter`
    async fn delete_by_filter(&self, filter: &VectorFilter) -> Result<usize, VectorError>;
}

/// Vector index kept in the `aux_vectors` table. Search is an exact scan of
/// the filtered scope.
pub struct SqliteVectorIndex {
    pool: DbPool,
}

impl SqliteVectorIndex {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool.get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn count(&self, filter: &VectorFilter) -> Result<usize, VectorError> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM aux_vectors
             WHERE memory_id = ?1 AND app = ?2 AND (?3 IS NULL OR content_ref = ?3)",
            params![&filter.memory_id, &filter.app, &filter.content_ref],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<Vec<String>, VectorError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(first) = records.first() {
            let expected = first.vector.len();
            if let Some(bad) = records.iter().find(|r| r.vector.len() != expected) {
                return Err(VectorError::DimensionMismatch { expected, actual: bad.vector.len() });
            }
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut ids = Vec::with_capacity(records.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO aux_vectors
                 (id, memory_id, app, content_ref, role, text, metadata, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for record in &records {
                let id = Uuid::new_v4().to_string();
                let embedding = bincode::serialize(&record.vector)
                    .map_err(|e| VectorError::Backend(format!("Bincode error: {}", e)))?;
                let metadata = serde_json::to_string(&record.metadata)
                    .map_err(|e| VectorError::Backend(e.to_string()))?;
                stmt.execute(params![
                    &id,
                    &record.memory_id,
                    &record.app,
                    &record.content_ref,
                    &record.role,
                    &record.text,
                    metadata,
                    embedding,
                    &now,
                ])?;
                ids.push(id);
            }
        }
        tx.commit()?;
        debug!("Indexed {} vectors", ids.len());
        Ok(ids)
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>, VectorError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, content_ref, role, text, metadata, embedding FROM aux_vectors
             WHERE memory_id = ?1 AND app = ?2 AND (?3 IS NULL OR content_ref = ?3)",
        )?;
        let mut rows = stmt.query(params![&filter.memory_id, &filter.app, &filter.content_ref])?;

        let mut hits = Vec::new();
        let mut skipped = 0;
        while let Some(row) = rows.next()? {
            let embedding_bytes: Vec<u8> = row.get(5)?;
            let embedding: Vec<f32> = bincode::deserialize(&embedding_bytes)
                .map_err(|e| VectorError::Backend(format!("Bincode error: {}", e)))?;
            // left behind by an earlier embedding model
            if embedding.len() != vector.len() {
                skipped += 1;
                continue;
            }
            let metadata: String = row.get(4)?;
            hits.push(VectorHit {
                id: row.get(0)?,
                content_ref: row.get(1)?,
                role: row.get(2)?,
                text: row.get(3)?,
                metadata: serde_json::from_str(&metadata)
                    .map_err(|e| VectorError::Backend(e.to_string()))?,
                distance: 1.0 - cosine_similarity(vector, &embedding),
            });
        }

        if skipped > 0 {
            warn!(
                "Skipped {} vectors in {}/{} whose dimension differs from the {}-d query",
                skipped,
                filter.app,
                filter.memory_id,
                vector.len()
            );
        }

        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_by_filter(&self, filter: &VectorFilter) -> Result<usize, VectorError> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM aux_vectors
             WHERE memory_id = ?1 AND app = ?2 AND (?3 IS NULL OR content_ref = ?3)",
            params![&filter.memory_id, &filter.app, &filter.content_ref],
        )?;
        info!("Deleted {} vectors from {}/{}", deleted, filter.app, filter.memory_id);
        Ok(deleted)
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() { return 0.0; }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 { 0.0 } else { dot / (norm_a * norm_b) }
}
