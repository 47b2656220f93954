//! Resolves context locators and packs them into a bounded payload

use crate::memory::ContextRefs;
use crate::storage::BlobStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

const SEPARATOR: &str = "\n\n";

/// Resolves and packs context
pub struct ContextAssembler {
    blobs: Arc<dyn BlobStore>,
    config: ContextAssemblerConfig,
}

/// Configuration for context assembly
#[derive(Debug, Clone)]
pub struct ContextAssemblerConfig {
    /// Character budget for the packed context, separators included
    pub max_chars: usize,
}

impl Default for ContextAssemblerConfig {
    fn default() -> Self {
        Self { max_chars: 4000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSource {
    Summary,
    Recent,
    Recall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextItem {
    pub source: ContextSource,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub included: usize,
    /// Items left out because the budget ran out
    pub dropped: usize,
}

/// Pack `items` in order, stopping at the first one that no longer fits.
/// Each item is either included whole or not at all.
pub fn pack(items: &[ContextItem], max_chars: usize) -> AssembledContext {
    let mut text = String::new();
    let mut used = 0;
    let mut included = 0;

    for item in items {
        let sep = if included == 0 { 0 } else { SEPARATOR.len() };
        let len = item.text.chars().count();
        if used + sep + len > max_chars {
            break;
        }
        if included > 0 {
            text.push_str(SEPARATOR);
        }
        text.push_str(&item.text);
        used += sep + len;
        included += 1;
    }

    AssembledContext { text, included, dropped: items.len() - included }
}

impl ContextAssembler {
    pub fn new(blobs: Arc<dyn BlobStore>, config: ContextAssemblerConfig) -> Self {
        Self { blobs, config }
    }

    pub fn config(&self) -> &ContextAssemblerConfig {
        &self.config
    }

    /// Read summaries and recent turns, then append recall hits. Unreadable
    /// blobs become inline `[read failed: ...]` markers.
    pub async fn resolve(&self, refs: &ContextRefs) -> Vec<ContextItem> {
        let mut items = Vec::with_capacity(
            refs.summary_refs.len() + refs.recent_refs.len() + refs.retrieved.len(),
        );
        for summary_ref in &refs.summary_refs {
            items.push(ContextItem { source: ContextSource::Summary, text: self.read(summary_ref).await });
        }
        for recent_ref in &refs.recent_refs {
            items.push(ContextItem { source: ContextSource::Recent, text: self.read(recent_ref).await });
        }
        for hit in &refs.retrieved {
            items.push(ContextItem { source: ContextSource::Recall, text: hit.content.clone() });
        }
        items
    }

    async fn read(&self, key: &str) -> String {
        match self.blobs.get_text(key).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Context blob {} unreadable: {}", key, e);
                format!("[read failed: {}, {}]", key, e)
            }
        }
    }

    pub async fn assemble(&self, refs: &ContextRefs) -> AssembledContext {
        let items = self.resolve(refs).await;
        let assembled = pack(&items, self.config.max_chars);
        debug!(
            "Assembled context: {} items, {} dropped, {} chars",
            assembled.included,
            assembled.dropped,
            assembled.text.chars().count()
        );
        assembled
    }
}
