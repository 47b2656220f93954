//! Memory coordinator: the single entry point that keeps primary and
//! auxiliary memory in step.
use super::auxiliary::{AuxiliaryMemory, RecallHit};
use super::params::{MemoryParams, DEFAULT_AUX_TOP_K};
use super::primary::PrimaryMemory;
use crate::error::{MemoryError, MemoryResult};
use crate::memory_db::{ContextEntry, MemoryDatabase, MemorySpace};
use crate::utils::retry_linear;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Attempts made by `safe_push`, including the first
    pub push_retries: u32,
    pub push_retry_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { push_retries: 3, push_retry_delay: Duration::from_millis(100) }
    }
}

/// Knobs for `get_context`
#[derive(Debug, Clone, PartialEq)]
pub struct GetContextOptions {
    pub summary_k: usize,
    pub recent_k: usize,
    /// Defaults to 5; `None` uses the space's `aux_top_k`
    pub aux_top_k: Option<usize>,
    /// `None` uses the space's `aux_score_threshold`
    pub aux_threshold: Option<f32>,
}

impl Default for GetContextOptions {
    fn default() -> Self {
        Self {
            summary_k: 1,
            recent_k: 6,
            aux_top_k: Some(DEFAULT_AUX_TOP_K as usize),
            aux_threshold: None,
        }
    }
}

/// Unresolved context for one query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextRefs {
    pub summary_refs: Vec<String>,
    pub recent_refs: Vec<String>,
    pub retrieved: Vec<RecallHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushOutcome {
    pub entry: ContextEntry,
    /// False when the locator was already logged for this space
    pub inserted: bool,
    pub summary_ref: Option<String>,
    pub aux_ids: Vec<String>,
}

pub struct MemoryCoordinator {
    primary: PrimaryMemory,
    auxiliary: AuxiliaryMemory,
    config: CoordinatorConfig,
    space_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryCoordinator {
    pub fn new(primary: PrimaryMemory, auxiliary: AuxiliaryMemory, config: CoordinatorConfig) -> Self {
        Self { primary, auxiliary, config, space_locks: DashMap::new() }
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.primary.db
    }

    /// Callers resolve the space first so unknown ids never get a lock
    fn space_lock(&self, memory_id: &str) -> Arc<Mutex<()>> {
        self.space_locks
            .entry(memory_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a memory space and return its id. `None` takes default params.
    pub fn create_memory(&self, app: &str, params: Option<MemoryParams>) -> MemoryResult<String> {
        let params = params.unwrap_or_default();
        params.validate()?;
        let space = self.primary.create_memory(app, &params)?;
        Ok(space.memory_id)
    }

    pub fn get_memory(&self, memory_id: &str, app: &str) -> MemoryResult<MemorySpace> {
        self.primary.resolve_space(memory_id, app)
    }

    /// Append a turn, run the summarization trigger, then index the turn for
    /// semantic recall.
    ///
    /// Re-pushing a logged locator returns the existing entry without touching
    /// the counters. The trigger still runs so a summary left pending by an
    /// earlier failure is retried, and the auxiliary records of the locator
    /// are replaced rather than duplicated. Tombstoned locators are not
    /// re-indexed. Nothing is rolled back when a later step fails.
    pub async fn push_message(
        &self,
        memory_id: &str,
        app: &str,
        content_ref: &str,
        description: Option<&str>,
        metadata: Option<&Map<String, Value>>,
    ) -> MemoryResult<PushOutcome> {
        self.primary.resolve_active_space(memory_id, app)?;
        let lock = self.space_lock(memory_id);
        let _guard = lock.lock().await;

        // status may have changed while waiting for the lock
        let space = self.primary.resolve_active_space(memory_id, app)?;
        let (entry, inserted) = self.primary.append(&space, content_ref, description)?;
        let summary_ref = self.primary.maybe_summarize(&space).await?;

        let aux_ids = if self.primary.db.tombstones.is_deleted(memory_id, content_ref)? {
            debug!("Skipping auxiliary index for deleted {}", content_ref);
            Vec::new()
        } else {
            if !inserted {
                self.auxiliary.delete(&space, content_ref).await?;
            }
            self.auxiliary.add(&space, content_ref, metadata).await?
        };

        info!(
            "Pushed {} into {} (new: {}, summary: {}, aux records: {})",
            content_ref,
            memory_id,
            inserted,
            summary_ref.is_some(),
            aux_ids.len()
        );
        Ok(PushOutcome { entry, inserted, summary_ref, aux_ids })
    }

    /// `push_message` with linear-backoff retries on transient failures.
    /// Caller errors such as an unknown space fail immediately.
    pub async fn safe_push(
        &self,
        memory_id: &str,
        app: &str,
        content_ref: &str,
        description: Option<&str>,
        metadata: Option<&Map<String, Value>>,
    ) -> MemoryResult<PushOutcome> {
        retry_linear(
            self.config.push_retries,
            self.config.push_retry_delay,
            MemoryError::is_transient,
            || self.push_message(memory_id, app, content_ref, description, metadata),
        )
        .await
    }

    /// Tombstone the turn in primary memory and physically remove its
    /// auxiliary records. Returns the number of records removed.
    pub async fn delete_message(&self, memory_id: &str, app: &str, content_ref: &str) -> MemoryResult<usize> {
        self.primary.resolve_active_space(memory_id, app)?;
        let lock = self.space_lock(memory_id);
        let _guard = lock.lock().await;

        // status may have changed while waiting for the lock
        let space = self.primary.resolve_active_space(memory_id, app)?;
        self.primary.delete_message(&space, content_ref)?;
        self.auxiliary.delete(&space, content_ref).await
    }

    /// Drop every auxiliary record of the space. Primary memory is left as
    /// is. Returns the number of records removed.
    pub async fn clear_memory(&self, memory_id: &str, app: &str) -> MemoryResult<usize> {
        let space = self.primary.resolve_space(memory_id, app)?;
        let lock = self.space_lock(memory_id);
        let _guard = lock.lock().await;

        self.auxiliary.clear(&space).await
    }

    /// Summary pointer, recent turns and recall hits for `query`. Locators
    /// are returned as is; nothing is read from the blob store.
    pub async fn get_context(
        &self,
        memory_id: &str,
        app: &str,
        query: &str,
        options: &GetContextOptions,
    ) -> MemoryResult<ContextRefs> {
        let space = self.primary.resolve_space(memory_id, app)?;
        let primary = self.primary.get_refs(memory_id, options.summary_k, options.recent_k)?;
        let retrieved = self
            .auxiliary
            .search(&space, query, options.aux_top_k, options.aux_threshold)
            .await?;

        Ok(ContextRefs {
            summary_refs: primary.summary_refs,
            recent_refs: primary.recent_refs,
            retrieved,
        })
    }
}
