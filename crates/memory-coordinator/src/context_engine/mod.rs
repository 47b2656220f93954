//! Context engine: turns context locators into a bounded prompt payload

pub mod assembler;
pub mod orchestrator;

pub use assembler::{pack, AssembledContext, ContextAssembler, ContextAssemblerConfig, ContextItem, ContextSource};
pub use orchestrator::{Answer, ContextOrchestrator, OrchestratorConfig};
