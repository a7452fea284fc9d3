#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use persona_chat::characters::CharacterCatalog;
use persona_chat::context_engine::{MemoryOrchestrator, OrchestratorConfig};
use persona_chat::memory::Exchange;
use persona_chat::memory_db::MemoryDatabase;
use persona_chat::model_runtime::{BackendKind, ChatModel, HashingEmbedder};
use tempfile::TempDir;

pub const CHARACTERS: &str = r#"{
    "Goku": {"platform_type": "anime", "platform_name": "Dragon Ball Z"},
    "Mario": {"platform_type": "video game", "platform_name": "Super Mario Bros."}
}"#;

/// Replays canned replies in order and records every prompt it was given
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<Vec<Exchange>>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    pub fn slow(replies: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn prompts(&self) -> Vec<Vec<Exchange>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn backend(&self) -> BackendKind {
        BackendKind::LocalModel
    }

    async fn generate(&self, prompt: &[Exchange]) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }
}

pub fn orchestrator(dir: &TempDir, buffer_size: usize, model: Arc<ScriptedModel>) -> Arc<MemoryOrchestrator> {
    let memory = MemoryDatabase::open(dir.path(), buffer_size, Arc::new(HashingEmbedder::default())).unwrap();
    let catalog = CharacterCatalog::from_json(CHARACTERS).unwrap();
    Arc::new(MemoryOrchestrator::new(
        Arc::new(memory),
        model,
        Arc::new(catalog),
        OrchestratorConfig::default(),
    ))
}
