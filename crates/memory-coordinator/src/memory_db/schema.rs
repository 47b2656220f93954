//! Row types for the memory database
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use crate::memory::params::MemoryParams;

/// Lifecycle of a memory space. Spaces are archived or disabled, never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    Active,
    Archived,
    Disabled,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStatus::Active => "active",
            MemoryStatus::Archived => "archived",
            MemoryStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MemoryStatus::Active),
            "archived" => Ok(MemoryStatus::Archived),
            "disabled" => Ok(MemoryStatus::Disabled),
            other => Err(anyhow::anyhow!("Unknown memory status: {}", other)),
        }
    }
}

/// Registry row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySpace {
    pub memory_id: String,
    pub app: String,
    pub params: MemoryParams,
    pub status: MemoryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One pushed turn. `content_ref` points into the blob store; the text itself
/// is never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub uid: String,
    pub memory_id: String,
    pub app: String,
    pub description: Option<String>,
    pub content_ref: String,
    pub content_hash: String,
    pub qa_count: i64,
    pub is_summarized: bool,
    pub summarized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tombstone {
    pub id: i64,
    pub memory_id: String,
    pub content_ref: String,
    pub deleted_at: DateTime<Utc>,
}

/// Summary pointer and counters for one memory space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryProgress {
    pub memory_id: String,
    pub summary_ref: Option<String>,
    pub summary_version: i64,
    pub recent_qa_count: i64,
    pub total_qa_count: i64,
    pub last_summary_index: i64,
    pub last_summary_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_memory_spaces: i64,
    pub total_contexts: i64,
    pub total_tombstones: i64,
    pub total_summarized: i64,
    pub total_aux_vectors: i64,
    pub database_size_bytes: i64,
}

/// Parses the RFC 3339 timestamps written by the stores.
pub(crate) fn parse_timestamp(value: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow::anyhow!("Failed to parse timestamp '{}': {}", value, e))
}

pub(crate) fn parse_optional_timestamp(value: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}
