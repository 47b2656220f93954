//! Object storage for turn content and summaries, addressed by string locators
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("blob io error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Build a locator of the form `{app}/{memory_id}/{timestamp}_{random}.{ext}`
pub fn blob_key(app: &str, memory_id: &str, ext: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
    let random: u32 = rand::thread_rng().gen();
    format!("{}/{}/{}_{:08x}.{}", app, memory_id, timestamp, random, ext.trim_start_matches('.'))
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get_text(&self, key: &str) -> Result<String, BlobError>;

    /// Store `text` under `key` and return the locator
    async fn put_text(&self, key: &str, text: &str) -> Result<String, BlobError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobError>;

    fn make_key(&self, app: &str, memory_id: &str, ext: Option<&str>) -> String {
        blob_key(app, memory_id, ext.unwrap_or("json"))
    }
}

/// Blobs as files below a root directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys are relative paths without parent or root components
    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get_text(&self, key: &str) -> Result<String, BlobError> {
        let path = self.resolve(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(source) => Err(BlobError::Io { key: key.to_string(), source }),
        }
    }

    async fn put_text(&self, key: &str, text: &str) -> Result<String, BlobError> {
        let path = self.resolve(key)?;
        let io_err = |source| BlobError::Io { key: key.to_string(), source };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, text).await.map_err(io_err)?;
        debug!("Wrote {} bytes to blob {}", text.len(), key);
        Ok(key.to_string())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.resolve(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| BlobError::Io { key: key.to_string(), source })
    }
}

/// Process-local blob store
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, String>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get_text(&self, key: &str) -> Result<String, BlobError> {
        self.blobs
            .get(key)
            .map(|text| text.value().clone())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn put_text(&self, key: &str, text: &str) -> Result<String, BlobError> {
        self.blobs.insert(key.to_string(), text.to_string());
        Ok(key.to_string())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        Ok(self.blobs.contains_key(key))
    }
}
