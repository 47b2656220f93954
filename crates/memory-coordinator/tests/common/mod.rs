#![allow(dead_code)]

use async_trait::async_trait;
use memory_coordinator::{
    llm::{CompletionRequest, HashingEmbedder, LlmError, TextGenerator},
    memory_db::MemoryDatabase,
    storage::{BlobStore, InMemoryBlobStore, SqliteVectorIndex},
    Collaborators, Config, MemorySystem,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Generator that answers with numbered summaries and records every request.
/// The first `fail_first` calls fail with a transport error.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
    fail_first: usize,
}

impl ScriptedGenerator {
    pub fn failing_first(n: usize) -> Self {
        Self { fail_first: n, ..Default::default() }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|r| r.prompt.clone()).collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(LlmError::Transport("backend unavailable".into()));
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        Ok(format!("generated #{}", requests.len()))
    }
}

pub struct Harness {
    pub system: MemorySystem,
    pub blobs: Arc<InMemoryBlobStore>,
    pub generator: Arc<ScriptedGenerator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_generator(ScriptedGenerator::default(), Config::default())
    }

    pub fn with_generator(generator: ScriptedGenerator, mut config: Config) -> Self {
        config.push_retry_delay_ms = 1;
        let database = Arc::new(MemoryDatabase::new_in_memory().unwrap());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let generator = Arc::new(generator);
        let system = MemorySystem::with_collaborators(
            config,
            Collaborators {
                index: Arc::new(SqliteVectorIndex::new(database.pool())),
                database,
                blobs: blobs.clone(),
                embedder: Arc::new(HashingEmbedder::default()),
                generator: generator.clone(),
            },
        );
        Self { system, blobs, generator }
    }

    /// Store `text` as a blob and return its locator
    pub async fn blob(&self, key: &str, text: &str) -> String {
        self.blobs.put_text(key, text).await.unwrap()
    }
}
