//! Primary memory: the context log, its counters and the rolling summary
use crate::error::{MemoryError, MemoryResult};
use crate::llm::TextGenerator;
use crate::memory_db::{ContextEntry, MemoryDatabase, MemorySpace, MemoryStatus, NewContextEntry};
use crate::storage::BlobStore;
use crate::utils::content_hash;
use std::sync::Arc;
use tracing::{debug, info};

/// Summary and recent-turn locators for one memory space
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct PrimaryRefs {
    pub summary_refs: Vec<String>,
    pub recent_refs: Vec<String>,
}

pub struct PrimaryMemory {
    pub(crate) db: Arc<MemoryDatabase>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) generator: Arc<dyn TextGenerator>,
}

impl PrimaryMemory {
    pub fn new(
        db: Arc<MemoryDatabase>,
        blobs: Arc<dyn BlobStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self { db, blobs, generator }
    }

    /// Register a space and its zeroed progress row
    pub fn create_memory(&self, app: &str, params: &crate::memory::MemoryParams) -> MemoryResult<MemorySpace> {
        let space = self.db.registry.create(app, params)?;
        self.db.progress.init(&space.memory_id)?;
        Ok(space)
    }

    /// Look up a space owned by `app`. Spaces of other apps are reported as
    /// missing.
    pub fn resolve_space(&self, memory_id: &str, app: &str) -> MemoryResult<MemorySpace> {
        match self.db.registry.get(memory_id)? {
            Some(space) if space.app == app => Ok(space),
            _ => Err(MemoryError::NotFound(memory_id.to_string())),
        }
    }

    /// Like `resolve_space`, but only active spaces are accepted
    pub fn resolve_active_space(&self, memory_id: &str, app: &str) -> MemoryResult<MemorySpace> {
        let space = self.resolve_space(memory_id, app)?;
        if space.status != MemoryStatus::Active {
            return Err(MemoryError::Inactive {
                memory_id: space.memory_id,
                status: space.status.to_string(),
            });
        }
        Ok(space)
    }

    /// Append a turn. A locator already present in the space returns the
    /// existing entry and leaves the counters alone.
    pub fn append(
        &self,
        space: &MemorySpace,
        content_ref: &str,
        description: Option<&str>,
    ) -> MemoryResult<(ContextEntry, bool)> {
        let (entry, inserted) = self.db.contexts.insert_or_get(&NewContextEntry {
            memory_id: space.memory_id.clone(),
            app: space.app.clone(),
            content_ref: content_ref.to_string(),
            content_hash: content_hash(content_ref),
            description: description.map(str::to_string),
        })?;

        if inserted {
            self.db.progress.bump_counts(&space.memory_id, 1)?;
        } else {
            debug!("Duplicate push of {} into {}", content_ref, space.memory_id);
        }
        Ok((entry, inserted))
    }

    /// Latest summary (when `summary_k > 0`) and up to `recent_k` live,
    /// unsummarized turns, newest first.
    pub fn get_refs(&self, memory_id: &str, summary_k: usize, recent_k: usize) -> MemoryResult<PrimaryRefs> {
        let mut refs = PrimaryRefs::default();

        if summary_k > 0 {
            if let Some(summary_ref) = self.db.progress.get(memory_id)?.and_then(|p| p.summary_ref) {
                refs.summary_refs.push(summary_ref);
            }
        }

        if recent_k > 0 {
            let deleted = self.db.tombstones.deleted_refs(memory_id)?;
            refs.recent_refs = self
                .db
                .contexts
                .list_recent(memory_id, recent_k.saturating_mul(2), 0)?
                .into_iter()
                .filter(|e| !e.is_summarized && !deleted.contains(&e.content_ref))
                .take(recent_k)
                .map(|e| e.content_ref)
                .collect();
        }
        Ok(refs)
    }

    /// Logically delete a turn. The log row stays; it is hidden from recent
    /// context and from future summaries.
    pub fn delete_message(&self, space: &MemorySpace, content_ref: &str) -> MemoryResult<()> {
        self.db.tombstones.mark_deleted(&space.memory_id, content_ref)?;
        info!("Deleted {} from primary memory {}", content_ref, space.memory_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, LlmError};
    use crate::memory::MemoryParams;
    use crate::storage::InMemoryBlobStore;
    use async_trait::async_trait;

    struct NoopGenerator;

    #[async_trait]
    impl TextGenerator for NoopGenerator {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
            Ok(String::new())
        }
    }

    fn primary() -> PrimaryMemory {
        PrimaryMemory::new(
            Arc::new(MemoryDatabase::new_in_memory().unwrap()),
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(NoopGenerator),
        )
    }

    #[test]
    fn test_resolve_space_checks_app_and_status() {
        let primary = primary();
        let space = primary.create_memory("chat", &MemoryParams::default()).unwrap();

        assert!(primary.resolve_space(&space.memory_id, "chat").is_ok());
        assert!(matches!(
            primary.resolve_space(&space.memory_id, "notes"),
            Err(MemoryError::NotFound(_))
        ));

        primary.db.registry.set_status(&space.memory_id, MemoryStatus::Disabled).unwrap();
        assert!(primary.resolve_space(&space.memory_id, "chat").is_ok());
        assert!(matches!(
            primary.resolve_active_space(&space.memory_id, "chat"),
            Err(MemoryError::Inactive { .. })
        ));
    }

    #[test]
    fn test_duplicate_append_keeps_counters() {
        let primary = primary();
        let space = primary.create_memory("chat", &MemoryParams::default()).unwrap();

        let (first, inserted) = primary.append(&space, "chat/t1.json", Some("greeting")).unwrap();
        assert!(inserted);
        let (again, inserted) = primary.append(&space, "chat/t1.json", None).unwrap();
        assert!(!inserted);
        assert_eq!(first.uid, again.uid);

        let progress = primary.db.progress.get(&space.memory_id).unwrap().unwrap();
        assert_eq!(progress.total_qa_count, 1);
        assert_eq!(progress.recent_qa_count, 1);
    }

    #[test]
    fn test_refs_skip_tombstoned_turns() {
        let primary = primary();
        let space = primary.create_memory("chat", &MemoryParams::default()).unwrap();
        for name in ["t1", "t2", "t3"] {
            primary.append(&space, name, None).unwrap();
        }
        primary.delete_message(&space, "t2").unwrap();

        let refs = primary.get_refs(&space.memory_id, 1, 6).unwrap();
        assert!(refs.summary_refs.is_empty());
        assert_eq!(refs.recent_refs, vec!["t3", "t1"]);

        let refs = primary.get_refs(&space.memory_id, 1, 1).unwrap();
        assert_eq!(refs.recent_refs, vec!["t3"]);
        assert!(primary.get_refs(&space.memory_id, 0, 0).unwrap().recent_refs.is_empty());
    }

    #[test]
    fn test_unbounded_recent_k_returns_every_live_turn() {
        let primary = primary();
        let space = primary.create_memory("chat", &MemoryParams::default()).unwrap();
        for name in ["t1", "t2"] {
            primary.append(&space, name, None).unwrap();
        }

        let refs = primary.get_refs(&space.memory_id, usize::MAX, usize::MAX).unwrap();
        assert_eq!(refs.recent_refs, vec!["t2", "t1"]);
    }

    #[test]
    fn test_invalid_params_are_reported_as_such() {
        let primary = primary();
        let err = primary
            .create_memory("chat", &MemoryParams::default().with_summary_every_n(0))
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidParams(_)));
    }
}
