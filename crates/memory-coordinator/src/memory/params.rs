//! Typed per-space tunables, stored as versioned JSON in the registry
use serde::{Deserialize, Serialize};

pub const PARAMS_VERSION: u32 = 1;

pub const DEFAULT_SUMMARY_EVERY_N: u32 = 5;
pub const DEFAULT_MAX_SUMMARY_TOKENS: u32 = 512;
pub const DEFAULT_AUX_TOP_K: u32 = 5;

const MAX_SUMMARY_EVERY_N: u32 = 10_000;
const MIN_SUMMARY_TOKENS: u32 = 16;
const MAX_SUMMARY_TOKENS: u32 = 32_768;
const MAX_AUX_TOP_K: u32 = 1_000;
const MAX_MODEL_NAME_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLanguage {
    #[default]
    Zh,
    En,
}

/// Rejected parameter record
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid memory params: {0}")]
pub struct InvalidParams(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryParams {
    pub version: u32,
    /// Unsummarized turns that trigger a new rolled-up summary
    pub summary_every_n: u32,
    pub max_summary_tokens: u32,
    pub summary_language: SummaryLanguage,
    pub aux_top_k: u32,
    /// Minimum similarity for recall hits; `None` keeps every hit
    pub aux_score_threshold: Option<f32>,
    /// Embedding model used for this space instead of the embedder default
    pub embedding_model: Option<String>,
}

impl Default for MemoryParams {
    fn default() -> Self {
        Self {
            version: PARAMS_VERSION,
            summary_every_n: DEFAULT_SUMMARY_EVERY_N,
            max_summary_tokens: DEFAULT_MAX_SUMMARY_TOKENS,
            summary_language: SummaryLanguage::default(),
            aux_top_k: DEFAULT_AUX_TOP_K,
            aux_score_threshold: None,
            embedding_model: None,
        }
    }
}

impl MemoryParams {
    pub fn with_summary_every_n(mut self, n: u32) -> Self {
        self.summary_every_n = n;
        self
    }

    pub fn with_summary_language(mut self, language: SummaryLanguage) -> Self {
        self.summary_language = language;
        self
    }

    pub fn with_aux_score_threshold(mut self, threshold: f32) -> Self {
        self.aux_score_threshold = Some(threshold);
        self
    }

    pub fn validate(&self) -> Result<(), InvalidParams> {
        if self.version == 0 || self.version > PARAMS_VERSION {
            return Err(InvalidParams(format!(
                "unsupported params version {} (latest is {})",
                self.version, PARAMS_VERSION
            )));
        }
        if self.summary_every_n == 0 || self.summary_every_n > MAX_SUMMARY_EVERY_N {
            return Err(InvalidParams(format!(
                "summary_every_n must be between 1 and {}",
                MAX_SUMMARY_EVERY_N
            )));
        }
        if !(MIN_SUMMARY_TOKENS..=MAX_SUMMARY_TOKENS).contains(&self.max_summary_tokens) {
            return Err(InvalidParams(format!(
                "max_summary_tokens must be between {} and {}",
                MIN_SUMMARY_TOKENS, MAX_SUMMARY_TOKENS
            )));
        }
        if self.aux_top_k == 0 || self.aux_top_k > MAX_AUX_TOP_K {
            return Err(InvalidParams(format!(
                "aux_top_k must be between 1 and {}",
                MAX_AUX_TOP_K
            )));
        }
        if let Some(threshold) = self.aux_score_threshold {
            if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
                return Err(InvalidParams(
                    "aux_score_threshold must be a similarity in [-1.0, 1.0]".to_string(),
                ));
            }
        }
        if let Some(model) = &self.embedding_model {
            if model.trim().is_empty() || model.len() > MAX_MODEL_NAME_LEN {
                return Err(InvalidParams(format!(
                    "embedding_model must be 1..={} characters",
                    MAX_MODEL_NAME_LEN
                )));
            }
        }
        Ok(())
    }

    /// Parse stored JSON. Missing fields take their defaults; older records
    /// are upgraded to the current version.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let mut params: MemoryParams = serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("Failed to parse memory params: {}", e))?;
        if params.version < PARAMS_VERSION {
            params.version = PARAMS_VERSION;
        }
        Ok(params)
    }
}
