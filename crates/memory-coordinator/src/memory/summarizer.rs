//! Rolling summarization of the context log
use super::params::SummaryLanguage;
use super::primary::PrimaryMemory;
use crate::error::{MemoryError, MemoryResult};
use crate::llm::CompletionRequest;
use crate::memory_db::MemorySpace;
use tracing::{debug, info, warn};

const SUMMARY_TEMPERATURE: f32 = 0.2;
const TURN_SEPARATOR: &str = "\n\n---\n\n";

fn system_prompt(language: SummaryLanguage) -> &'static str {
    match language {
        SummaryLanguage::Zh => "你是一个严谨的摘要助手。",
        SummaryLanguage::En => "You are a precise summarization assistant.",
    }
}

fn instruction(language: SummaryLanguage) -> &'static str {
    match language {
        SummaryLanguage::Zh => {
            "请对以下多轮对话做简洁的总结，保留重要事实、实体和关键决策，忽略闲聊与重复内容。输出一段摘要。"
        }
        SummaryLanguage::En => {
            "Summarize the following multi-turn conversation concisely. Keep important facts, \
             entities and key decisions; ignore small talk and repetition. Output one summary."
        }
    }
}

fn unreadable_summary(language: SummaryLanguage) -> String {
    match language {
        SummaryLanguage::Zh => "[读取旧摘要失败]".to_string(),
        SummaryLanguage::En => "[failed to read previous summary]".to_string(),
    }
}

fn unreadable_turn(language: SummaryLanguage, content_ref: &str) -> String {
    match language {
        SummaryLanguage::Zh => format!("[读取失败: {}]", content_ref),
        SummaryLanguage::En => format!("[read failed: {}]", content_ref),
    }
}

pub(crate) fn build_summary_prompt(language: SummaryLanguage, texts: &[String]) -> String {
    format!("{}\n\n{}", instruction(language), texts.join(TURN_SEPARATOR))
}

impl PrimaryMemory {
    /// Fold the previous summary and the unsummarized tail into a new summary
    /// once `summary_every_n` turns have accumulated. Returns the new summary
    /// locator, or `None` when nothing was due.
    pub async fn maybe_summarize(&self, space: &MemorySpace) -> MemoryResult<Option<String>> {
        let params = &space.params;
        let threshold = params.summary_every_n as i64;
        let language = params.summary_language;

        let progress = self
            .db
            .progress
            .get(&space.memory_id)?
            .ok_or_else(|| MemoryError::NotFound(space.memory_id.clone()))?;
        if progress.recent_qa_count < threshold {
            return Ok(None);
        }

        let mut texts = Vec::new();
        if let Some(summary_ref) = &progress.summary_ref {
            match self.blobs.get_text(summary_ref).await {
                Ok(text) => texts.push(text),
                Err(e) => {
                    warn!("Previous summary {} unreadable: {}", summary_ref, e);
                    texts.push(unreadable_summary(language));
                }
            }
        }

        let deleted = self.db.tombstones.deleted_refs(&space.memory_id)?;
        let mut window: Vec<_> = self
            .db
            .contexts
            .list_recent(&space.memory_id, (threshold as usize).saturating_mul(2), 0)?
            .into_iter()
            .filter(|e| !e.is_summarized && !deleted.contains(&e.content_ref))
            .collect();
        if window.is_empty() && texts.is_empty() {
            debug!("Nothing to summarize for {}", space.memory_id);
            return Ok(None);
        }
        window.reverse();

        for entry in &window {
            match self.blobs.get_text(&entry.content_ref).await {
                Ok(text) => texts.push(text),
                Err(e) => {
                    warn!("Turn {} unreadable during summarization: {}", entry.content_ref, e);
                    texts.push(unreadable_turn(language, &entry.content_ref));
                }
            }
        }

        let request = CompletionRequest::new(build_summary_prompt(language, &texts))
            .with_system(system_prompt(language))
            .with_temperature(SUMMARY_TEMPERATURE)
            .with_max_tokens(params.max_summary_tokens);
        let summary = self.generator.complete(request).await.map_err(MemoryError::Generation)?;

        let key = self.blobs.make_key(&space.app, &space.memory_id, Some("md"));
        let summary_ref = self.blobs.put_text(&key, &summary).await?;

        let progress = self.db.progress.complete_summary(&space.memory_id, &summary_ref)?;
        let uids: Vec<String> = window.into_iter().map(|e| e.uid).collect();
        self.db.contexts.mark_summarized(&uids)?;

        info!(
            "Summarized {} turns of {} into {} (v{})",
            uids.len(),
            space.memory_id,
            summary_ref,
            progress.summary_version
        );
        Ok(Some(summary_ref))
    }
}
