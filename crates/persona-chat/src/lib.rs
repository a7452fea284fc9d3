// persona-chat/crates/persona-chat/src/lib.rs

pub mod characters;
pub mod config;
pub mod context_engine;
pub mod error;
pub mod game;
pub mod memory;
pub mod memory_db;
pub mod model_runtime;
pub mod shared_state;
pub mod telemetry;
pub mod utils;
pub mod worker_threads;

// Public API exports
pub use characters::{Character, CharacterCatalog};
pub use config::Config;
pub use context_engine::{CharacterSession, MemoryOrchestrator, OrchestratorConfig, TurnOutcome};
pub use error::{GameError, MemoryError, MemoryResult};
pub use memory::{Exchange, Role};
pub use memory_db::MemoryDatabase;
pub use shared_state::SharedState;
pub use worker_threads::{ConversationHandle, ConversationWorker};
