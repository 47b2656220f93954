use anyhow::Result;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::context_engine::{ContextAssemblerConfig, OrchestratorConfig};
use crate::llm::OpenAiConfig;
use crate::memory::CoordinatorConfig;

/// Where embeddings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// The OpenAI-compatible `/v1/embeddings` endpoint
    Remote,
    /// Local feature hashing, no server needed
    Hashing,
}

impl FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "remote" | "openai" => Ok(EmbeddingBackend::Remote),
            "hashing" | "local" => Ok(EmbeddingBackend::Hashing),
            other => Err(anyhow::anyhow!("Unknown embedding backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub db_pool_size: u32,
    pub blob_root: PathBuf,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub embedding_backend: EmbeddingBackend,
    pub embedding_model: String,
    pub llm_timeout_seconds: u64,
    pub llm_max_retries: u32,
    pub llm_retry_delay_ms: u64,
    pub push_retries: u32,
    pub push_retry_delay_ms: u64,
    pub context_max_chars: usize,
    pub answer_max_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/memory.db"),
            db_pool_size: 8,
            blob_root: PathBuf::from("./data/blobs"),
            llm_base_url: "http://127.0.0.1:8080".to_string(),
            llm_api_key: None,
            llm_model: "local-llm".to_string(),
            embedding_backend: EmbeddingBackend::Remote,
            embedding_model: "local-embedding".to_string(),
            llm_timeout_seconds: 120,
            llm_max_retries: 3,
            llm_retry_delay_ms: 800,
            push_retries: 3,
            push_retry_delay_ms: 100,
            context_max_chars: 4000,
            answer_max_tokens: 800,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let text = |key: &str, default: String| lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default);

        let config = Self {
            db_path: PathBuf::from(text("MEMORY_DB_PATH", defaults.db_path.display().to_string())),
            db_pool_size: parse_or(&lookup, "MEMORY_DB_POOL_SIZE", defaults.db_pool_size),
            blob_root: PathBuf::from(text("BLOB_ROOT", defaults.blob_root.display().to_string())),
            llm_base_url: text("LLM_BASE_URL", defaults.llm_base_url),
            llm_api_key: lookup("LLM_API_KEY").filter(|v| !v.trim().is_empty()),
            llm_model: text("LLM_MODEL", defaults.llm_model),
            embedding_backend: match lookup("EMBEDDING_BACKEND") {
                Some(value) => value.parse()?,
                None => defaults.embedding_backend,
            },
            embedding_model: text("EMBEDDING_MODEL", defaults.embedding_model),
            llm_timeout_seconds: parse_or(&lookup, "LLM_TIMEOUT_SECONDS", defaults.llm_timeout_seconds),
            llm_max_retries: parse_or(&lookup, "LLM_MAX_RETRIES", defaults.llm_max_retries),
            llm_retry_delay_ms: parse_or(&lookup, "LLM_RETRY_DELAY_MS", defaults.llm_retry_delay_ms),
            push_retries: parse_or(&lookup, "PUSH_RETRIES", defaults.push_retries),
            push_retry_delay_ms: parse_or(&lookup, "PUSH_RETRY_DELAY_MS", defaults.push_retry_delay_ms),
            context_max_chars: parse_or(&lookup, "CONTEXT_MAX_CHARS", defaults.context_max_chars),
            answer_max_tokens: parse_or(&lookup, "ANSWER_MAX_TOKENS", defaults.answer_max_tokens),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_pool_size == 0 {
            anyhow::bail!("MEMORY_DB_POOL_SIZE must be at least 1");
        }
        if !(self.llm_base_url.starts_with("http://") || self.llm_base_url.starts_with("https://")) {
            anyhow::bail!("LLM_BASE_URL must be an http(s) URL, got {}", self.llm_base_url);
        }
        if self.llm_max_retries == 0 || self.push_retries == 0 {
            anyhow::bail!("retry counts must be at least 1");
        }
        if self.context_max_chars == 0 {
            anyhow::bail!("CONTEXT_MAX_CHARS must be positive");
        }
        if self.answer_max_tokens == 0 {
            anyhow::bail!("ANSWER_MAX_TOKENS must be positive");
        }
        Ok(())
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Database: {} (pool {})", self.db_path.display(), self.db_pool_size);
        info!("- Blob Root: {}", self.blob_root.display());
        info!("- LLM Backend: {} (model {})", self.llm_base_url, self.llm_model);
        info!("- LLM API Key: {}", if self.llm_api_key.is_some() { "set" } else { "not set" });
        info!("- Embeddings: {:?} (model {})", self.embedding_backend, self.embedding_model);
        info!("- LLM Retries: {} x {}ms", self.llm_max_retries, self.llm_retry_delay_ms);
        info!("- Push Retries: {} x {}ms", self.push_retries, self.push_retry_delay_ms);
        info!("- Context Budget: {} chars", self.context_max_chars);
        info!("- Answer Max Tokens: {}", self.answer_max_tokens);
    }

    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.llm_base_url.clone(),
            api_key: self.llm_api_key.clone(),
            model: self.llm_model.clone(),
            embedding_model: self.embedding_model.clone(),
            timeout: Duration::from_secs(self.llm_timeout_seconds),
            max_retries: self.llm_max_retries,
            retry_delay: Duration::from_millis(self.llm_retry_delay_ms),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            push_retries: self.push_retries,
            push_retry_delay: Duration::from_millis(self.push_retry_delay_ms),
        }
    }

    pub fn assembler_config(&self) -> ContextAssemblerConfig {
        ContextAssemblerConfig { max_chars: self.context_max_chars }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig { answer_max_tokens: self.answer_max_tokens, ..Default::default() }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {}={:?} ({}); using {}", key, raw, e, default);
            default
        }),
        None => default,
    }
}
