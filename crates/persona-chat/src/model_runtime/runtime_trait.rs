use crate::memory::Exchange;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which kind of OpenAI-compatible endpoint serves completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// llama-server on the local machine, no key
    LocalModel,
    /// Hosted API with a bearer key
    HostedApi,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::LocalModel => "llama-cpp",
            BackendKind::HostedApi => "openai",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            BackendKind::LocalModel => "http://127.0.0.1:8081",
            BackendKind::HostedApi => "https://api.openai.com",
        }
    }

    pub fn default_temperature(&self) -> f32 {
        match self {
            BackendKind::LocalModel => 0.4,
            BackendKind::HostedApi => 0.7,
        }
    }

    /// Stop sequences sent with every completion request
    pub fn stop_tokens(&self) -> &'static [&'static str] {
        match self {
            BackendKind::LocalModel => &["<|end_of_turn|>"],
            BackendKind::HostedApi => &[],
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, BackendKind::HostedApi)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llama-cpp" | "llama_cpp" | "llamacpp" | "local" => Ok(BackendKind::LocalModel),
            "openai" | "hosted" => Ok(BackendKind::HostedApi),
            other => Err(anyhow::anyhow!(
                "Unknown LLM backend '{}', expected 'openai' or 'llama-cpp'",
                other
            )),
        }
    }
}

/// Prompt in, text out. Implementations do not retry.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn backend(&self) -> BackendKind;

    async fn generate(&self, prompt: &[Exchange]) -> anyhow::Result<String>;
}
