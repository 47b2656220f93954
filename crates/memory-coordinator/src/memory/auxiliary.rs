//! Auxiliary memory: semantic recall over embedded turns
use crate::error::{MemoryError, MemoryResult};
use crate::llm::Embedder;
use crate::memory_db::MemorySpace;
use crate::storage::{BlobStore, VectorFilter, VectorIndex, VectorRecord};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_ROLE: &str = "user";

/// One semantic recall result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallHit {
    pub content: String,
    pub content_ref: String,
    pub role: String,
    /// Cosine similarity; higher is closer
    pub score: f32,
}

/// A dialogue turn found in a blob
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Turn {
    pub role: String,
    pub content: String,
}

/// Split blob text into turns. Accepts a JSON list of `{role, content}`
/// objects or an object holding such a list under `qa`; anything else is a
/// single user turn. Turns with blank content are dropped.
pub(crate) fn parse_turns(raw: &str) -> Vec<Turn> {
    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Object(mut object)) if object.get("qa").is_some_and(Value::is_array) => {
            match object.remove("qa") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        }
        _ => {
            return if raw.trim().is_empty() {
                Vec::new()
            } else {
                vec![Turn { role: DEFAULT_ROLE.to_string(), content: raw.to_string() }]
            };
        }
    };

    items
        .iter()
        .filter_map(|item| {
            let content = item.get("content")?.as_str()?;
            if content.trim().is_empty() {
                return None;
            }
            let role = item.get("role").and_then(Value::as_str).unwrap_or(DEFAULT_ROLE);
            Some(Turn { role: role.to_string(), content: content.to_string() })
        })
        .collect()
}

pub struct AuxiliaryMemory {
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl AuxiliaryMemory {
    pub fn new(blobs: Arc<dyn BlobStore>, index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { blobs, index, embedder }
    }

    /// Embed every non-empty turn of the blob and index it with the space
    /// tags plus `metadata`. Returns the record ids.
    pub async fn add(
        &self,
        space: &MemorySpace,
        content_ref: &str,
        metadata: Option<&Map<String, Value>>,
    ) -> MemoryResult<Vec<String>> {
        let raw = self.blobs.get_text(content_ref).await?;
        let turns = parse_turns(&raw);
        if turns.is_empty() {
            debug!("No indexable turns in {}", content_ref);
            return Ok(Vec::new());
        }

        let texts: Vec<String> = turns.iter().map(|t| t.content.clone()).collect();
        let vectors = self
            .embedder
            .embed_documents(&texts, space.params.embedding_model.as_deref())
            .await
            .map_err(MemoryError::Embedding)?;

        let records = turns
            .into_iter()
            .zip(vectors)
            .map(|(turn, vector)| {
                let mut meta = metadata.cloned().unwrap_or_default();
                meta.insert("content_ref".to_string(), Value::String(content_ref.to_string()));
                meta.insert("role".to_string(), Value::String(turn.role.clone()));
                VectorRecord {
                    memory_id: space.memory_id.clone(),
                    app: space.app.clone(),
                    content_ref: content_ref.to_string(),
                    role: turn.role,
                    text: turn.content,
                    metadata: meta,
                    vector,
                }
            })
            .collect();

        let ids = self.index.add(records).await?;
        debug!("Indexed {} turns of {} for {}", ids.len(), content_ref, space.memory_id);
        Ok(ids)
    }

    /// Nearest turns to `query` within the space. `top_k` and
    /// `score_threshold` fall back to the space params.
    pub async fn search(
        &self,
        space: &MemorySpace,
        query: &str,
        top_k: Option<usize>,
        score_threshold: Option<f32>,
    ) -> MemoryResult<Vec<RecallHit>> {
        let top_k = top_k.unwrap_or(space.params.aux_top_k as usize);
        let threshold = score_threshold.or(space.params.aux_score_threshold);
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed_query(query, space.params.embedding_model.as_deref())
            .await
            .map_err(MemoryError::Embedding)?;
        let filter = VectorFilter::space(&space.memory_id, &space.app);

        let hits = self
            .index
            .search(&vector, top_k, &filter)
            .await?
            .into_iter()
            .map(|hit| RecallHit {
                content: hit.text,
                content_ref: hit.content_ref,
                role: hit.role,
                score: 1.0 - hit.distance,
            })
            .filter(|hit| threshold.map_or(true, |t| hit.score >= t))
            .collect();
        Ok(hits)
    }

    /// Physically remove every indexed turn of one blob
    pub async fn delete(&self, space: &MemorySpace, content_ref: &str) -> MemoryResult<usize> {
        let filter = VectorFilter::content(&space.memory_id, &space.app, content_ref);
        Ok(self.index.delete_by_filter(&filter).await?)
    }

    /// Physically remove every indexed turn of the space
    pub async fn clear(&self, space: &MemorySpace) -> MemoryResult<usize> {
        let deleted = self
            .index
            .delete_by_filter(&VectorFilter::space(&space.memory_id, &space.app))
            .await?;
        info!("Cleared {} auxiliary records of {}", deleted, space.memory_id);
        Ok(deleted)
    }
}
