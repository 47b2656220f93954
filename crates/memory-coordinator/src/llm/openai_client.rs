//! HTTP client for OpenAI-compatible chat completion and embedding endpoints
use super::{CompletionRequest, Embedder, LlmError, TextGenerator};
use crate::utils::retry_linear;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Server root, without the `/v1` suffix
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            api_key: None,
            model: "local-llm".to_string(),
            embedding_model: "local-embedding".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_delay: Duration::from_millis(800),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

pub struct OpenAiClient {
    config: OpenAiConfig,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        info!("LLM client initialized with backend: {}", config.base_url);
        Ok(Self { config, http_client })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.config.base_url.trim_end_matches('/'))
    }

    async fn post_json<B: Serialize + ?Sized, R: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, LlmError> {
        let mut request = self.http_client.post(url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }
        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>>,
    {
        retry_linear(self.config.max_retries, self.config.retry_delay, LlmError::is_retryable, op).await
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage { role: "system".to_string(), content: system.clone() });
        }
        messages.push(ChatMessage { role: "user".to_string(), content: request.prompt.clone() });

        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };
        debug!("Requesting completion ({} prompt chars)", request.prompt.len());

        let url = self.completions_url();
        let completion: ChatCompletionResponse =
            self.with_retry(|| self.post_json(&url, &body)).await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("completion has no choices".to_string()))
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed_query(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>, LlmError> {
        let mut embeddings = self.embed_documents(&[text.to_string()], model).await?;
        embeddings
            .pop()
            .ok_or_else(|| LlmError::InvalidResponse("no embedding returned".to_string()))
    }

    async fn embed_documents(&self, texts: &[String], model: Option<&str>) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: model.unwrap_or(&self.config.embedding_model),
            input: texts,
        };
        debug!("Generating embeddings for {} text(s)", texts.len());

        let url = self.embeddings_url();
        let response: EmbeddingResponse = self.with_retry(|| self.post_json(&url, &body)).await?;
        if response.data.len() != texts.len() {
            return Err(LlmError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
