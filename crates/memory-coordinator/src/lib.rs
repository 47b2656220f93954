//! Memory coordination for retrieval chat.
//!
//! Turns are appended to a per-space context log as blob locators, folded
//! into a rolling summary every `summary_every_n` turns, and embedded for
//! semantic recall. [`memory::MemoryCoordinator`] is the entry point;
//! [`context_engine::ContextOrchestrator`] turns its output into an answer.

pub mod config;
pub mod context_engine;
pub mod error;
pub mod llm;
pub mod memory;
pub mod memory_db;
pub mod shared_state;
pub mod storage;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use error::{MemoryError, MemoryResult};
pub use memory::{ContextRefs, GetContextOptions, MemoryCoordinator, MemoryParams, PushOutcome, RecallHit};
pub use shared_state::{Collaborators, MemorySystem};
