//! Context engine module - prompt building and per-turn memory orchestration

pub mod context_builder;
pub mod orchestrator;

pub use context_builder::ContextBuilder;
pub use orchestrator::{
    CharacterSession, MemoryOrchestrator, OrchestratorConfig, PersistenceLag, StoreKind, TurnOutcome,
};

