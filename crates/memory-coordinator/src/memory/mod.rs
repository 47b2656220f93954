//! Primary and auxiliary memory plus the coordinator that drives both
pub mod auxiliary;
pub mod coordinator;
pub mod params;
pub mod primary;
mod summarizer;

pub use auxiliary::{AuxiliaryMemory, RecallHit};
pub use coordinator::{ContextRefs, CoordinatorConfig, GetContextOptions, MemoryCoordinator, PushOutcome};
pub use params::{InvalidParams, MemoryParams, SummaryLanguage};
pub use primary::{PrimaryMemory, PrimaryRefs};
