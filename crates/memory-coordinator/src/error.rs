//! Error type for memory operations
use crate::llm::LlmError;
use crate::memory::params::InvalidParams;
use crate::storage::{BlobError, VectorError};

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Errors surfaced by the coordinator and its components.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Unknown memory space, or one owned by another app
    #[error("memory space not found: {0}")]
    NotFound(String),

    /// Writes are only accepted on active spaces
    #[error("memory space {memory_id} is {status}")]
    Inactive { memory_id: String, status: String },

    #[error(transparent)]
    InvalidParams(#[from] InvalidParams),

    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("vector index error: {0}")]
    VectorIndex(#[from] VectorError),

    #[error("embedding failed: {0}")]
    Embedding(#[source] LlmError),

    #[error("generation failed: {0}")]
    Generation(#[source] LlmError),

    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for MemoryError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<InvalidParams>() {
            Ok(invalid) => MemoryError::InvalidParams(invalid),
            Err(e) => MemoryError::Storage(e),
        }
    }
}

impl MemoryError {
    /// True for failures that may succeed when retried
    pub fn is_transient(&self) -> bool {
        match self {
            MemoryError::Embedding(e) | MemoryError::Generation(e) => e.is_retryable(),
            MemoryError::Storage(_) | MemoryError::Blob(BlobError::Io { .. }) | MemoryError::VectorIndex(_) => true,
            _ => false,
        }
    }
}
