//! Answer pipeline: fetch context, assemble it, ask the generator
use super::assembler::{AssembledContext, ContextAssembler};
use crate::error::{MemoryError, MemoryResult};
use crate::llm::{CompletionRequest, TextGenerator};
use crate::memory::{ContextRefs, GetContextOptions, MemoryCoordinator, SummaryLanguage};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub answer_temperature: f32,
    pub answer_max_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { answer_temperature: 0.3, answer_max_tokens: 800 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub context_used: ContextRefs,
    pub assembled: AssembledContext,
}

pub struct ContextOrchestrator {
    coordinator: Arc<MemoryCoordinator>,
    assembler: ContextAssembler,
    generator: Arc<dyn TextGenerator>,
    config: OrchestratorConfig,
}

fn answer_system_prompt(language: SummaryLanguage) -> &'static str {
    match language {
        SummaryLanguage::Zh => "你是一个严谨的助手，会结合历史上下文回答用户问题。",
        SummaryLanguage::En => {
            "You are a careful assistant that answers the user's question using the conversation history."
        }
    }
}

pub(crate) fn build_answer_prompt(language: SummaryLanguage, context: &str, query: &str) -> String {
    match language {
        SummaryLanguage::Zh => format!(
            "以下是与用户相关的历史对话与信息，请结合它们回答用户问题。\n\
             --- 上下文开始 ---\n{}\n--- 上下文结束 ---\n\n\
             用户问题：{}\n请用简洁、准确的方式回答。",
            context, query
        ),
        SummaryLanguage::En => format!(
            "Below are past conversation turns and facts about the user. Use them to answer the question.\n\
             --- context start ---\n{}\n--- context end ---\n\n\
             Question: {}\nAnswer concisely and accurately.",
            context, query
        ),
    }
}

impl ContextOrchestrator {
    pub fn new(
        coordinator: Arc<MemoryCoordinator>,
        assembler: ContextAssembler,
        generator: Arc<dyn TextGenerator>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { coordinator, assembler, generator, config }
    }

    /// Answer `query` from the memory space's context. The prompt language
    /// follows the space's summary language.
    pub async fn answer(
        &self,
        memory_id: &str,
        app: &str,
        query: &str,
        options: &GetContextOptions,
    ) -> MemoryResult<Answer> {
        let space = self.coordinator.get_memory(memory_id, app)?;
        let language = space.params.summary_language;

        let refs = self.coordinator.get_context(memory_id, app, query, options).await?;
        let assembled = self.assembler.assemble(&refs).await;

        let request = CompletionRequest::new(build_answer_prompt(language, &assembled.text, query))
            .with_system(answer_system_prompt(language))
            .with_temperature(self.config.answer_temperature)
            .with_max_tokens(self.config.answer_max_tokens);
        let answer = self.generator.complete(request).await.map_err(MemoryError::Generation)?;

        info!(
            "Answered query for {} with {} context items ({} dropped)",
            memory_id, assembled.included, assembled.dropped
        );
        Ok(Answer { answer, context_used: refs, assembled })
    }
}
