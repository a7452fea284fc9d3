//! Shared state wiring
//!
//! Builds every long-lived component once from [`Config`] and hands out the
//! conversation worker that owns the active session.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    characters::CharacterCatalog,
    config::Config,
    context_engine::{MemoryOrchestrator, OrchestratorConfig},
    memory_db::MemoryDatabase,
    model_runtime::{ChatModel, Embedder, HashingEmbedder, PromptedClassifier, SentimentClassifier},
    worker_threads::{ConversationHandle, ConversationWorker, HttpEmbedder, LLMWorker},
};

/// Core shared system state container
pub struct SharedSystemState {
    /// Configuration (read-only after initialization)
    pub config: Arc<Config>,

    pub memory: Arc<MemoryDatabase>,

    pub catalog: Arc<CharacterCatalog>,

    pub orchestrator: Arc<MemoryOrchestrator>,

    /// Emotion labels for persona replies, backed by the chat model
    pub classifier: Arc<dyn SentimentClassifier>,
}

impl SharedSystemState {
    /// Wire the HTTP model backend described by `config`
    pub fn new(config: Config) -> Result<Self> {
        info!("Initializing shared system state");

        let llm_worker = Arc::new(LLMWorker::from_config(&config));
        let embedder: Arc<dyn Embedder> = if config.uses_hashing_embedder() {
            Arc::new(HashingEmbedder::default())
        } else {
            Arc::new(HttpEmbedder::new(llm_worker.clone()))
        };
        let catalog = CharacterCatalog::load(&config.characters_path)?;

        Self::with_components(config, llm_worker, embedder, catalog)
    }

    /// Wire arbitrary collaborators; used by tests and alternative front ends
    pub fn with_components(
        config: Config,
        model: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        catalog: CharacterCatalog,
    ) -> Result<Self> {
        info!("Embedding model: {}", embedder.model_name());
        let memory = Arc::new(
            MemoryDatabase::open(&config.data_dir, config.buffer_size, embedder)
                .with_context(|| format!("Failed to open memory at {}", config.data_dir.display()))?,
        );
        let catalog = Arc::new(catalog);
        let orchestrator = Arc::new(MemoryOrchestrator::new(
            memory.clone(),
            model.clone(),
            catalog.clone(),
            OrchestratorConfig::from_config(&config),
        ));

        Ok(Self {
            config: Arc::new(config),
            memory,
            catalog,
            orchestrator,
            classifier: Arc::new(PromptedClassifier::new(model)),
        })
    }

    /// Requested name, then `DEFAULT_CHARACTER`, then the first catalog entry
    pub fn initial_character(&self, requested: Option<&str>) -> Result<String> {
        requested
            .map(str::to_string)
            .or_else(|| self.config.default_character.clone())
            .or_else(|| self.catalog.names().first().map(|n| n.to_string()))
            .context("Character list is empty")
    }

    /// Start the conversation worker on `character`
    pub fn spawn_conversation(
        &self,
        character: &str,
        classify_sentiment: bool,
    ) -> Result<(ConversationHandle, JoinHandle<()>)> {
        let classifier = classify_sentiment.then(|| self.classifier.clone());
        ConversationWorker::spawn(self.orchestrator.clone(), character, classifier)
            .with_context(|| format!("Failed to open a session with {}", character))
    }
}

// Re-exports for convenience
pub use self::SharedSystemState as SharedState;
