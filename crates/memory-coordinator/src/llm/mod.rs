//! Text generation and embedding collaborators
pub mod hashing_embedder;
pub mod openai_client;

pub use hashing_embedder::HashingEmbedder;
pub use openai_client::{OpenAiClient, OpenAiConfig};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status with the response body
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            LlmError::InvalidResponse(_) => false,
        }
    }
}

/// Single-turn completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), system: None, temperature: 0.7, max_tokens: 512 }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// `model` overrides the embedder's default model when set
    async fn embed_query(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>, LlmError>;

    async fn embed_documents(&self, texts: &[String], model: Option<&str>) -> Result<Vec<Vec<f32>>, LlmError>;
}
