//! Wiring of the memory subsystem from explicit configuration

use std::sync::Arc;
use tracing::info;

use crate::{
    config::{Config, EmbeddingBackend},
    context_engine::{ContextAssembler, ContextOrchestrator},
    llm::{Embedder, HashingEmbedder, OpenAiClient, TextGenerator},
    memory::{AuxiliaryMemory, MemoryCoordinator, PrimaryMemory},
    memory_db::MemoryDatabase,
    storage::{BlobStore, FsBlobStore, SqliteVectorIndex, VectorIndex},
};

/// Every component of a running memory subsystem
pub struct MemorySystem {
    pub config: Arc<Config>,
    pub database: Arc<MemoryDatabase>,
    pub blobs: Arc<dyn BlobStore>,
    pub coordinator: Arc<MemoryCoordinator>,
    pub orchestrator: ContextOrchestrator,
}

/// Collaborators that can be swapped out, mainly for tests and embedding
pub struct Collaborators {
    pub database: Arc<MemoryDatabase>,
    pub blobs: Arc<dyn BlobStore>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn TextGenerator>,
}

impl MemorySystem {
    /// Open the database file, the filesystem blob store and the LLM client
    /// described by `config`
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let database = Arc::new(MemoryDatabase::new(&config.db_path, config.db_pool_size)?);
        let client = Arc::new(OpenAiClient::new(config.openai_config())?);
        let embedder: Arc<dyn Embedder> = match config.embedding_backend {
            EmbeddingBackend::Remote => client.clone(),
            EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::default()),
        };

        let collaborators = Collaborators {
            index: Arc::new(SqliteVectorIndex::new(database.pool())),
            blobs: Arc::new(FsBlobStore::new(config.blob_root.clone())),
            database,
            embedder,
            generator: client,
        };
        Ok(Self::with_collaborators(config, collaborators))
    }

    pub fn with_collaborators(config: Config, parts: Collaborators) -> Self {
        let primary = PrimaryMemory::new(parts.database.clone(), parts.blobs.clone(), parts.generator.clone());
        let auxiliary = AuxiliaryMemory::new(parts.blobs.clone(), parts.index, parts.embedder);
        let coordinator = Arc::new(MemoryCoordinator::new(primary, auxiliary, config.coordinator_config()));
        let orchestrator = ContextOrchestrator::new(
            coordinator.clone(),
            ContextAssembler::new(parts.blobs.clone(), config.assembler_config()),
            parts.generator,
            config.orchestrator_config(),
        );

        info!("Memory system ready");
        Self {
            config: Arc::new(config),
            database: parts.database,
            blobs: parts.blobs,
            coordinator,
            orchestrator,
        }
    }
}
