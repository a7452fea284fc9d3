use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

use crate::model_runtime::BackendKind;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub characters_path: PathBuf,
    pub user_name: String,
    pub default_character: Option<String>,
    pub buffer_size: usize,
    pub num_query_results: usize,
    pub llm_backend: BackendKind,
    pub llm_base_url: String,
    pub api_key: Option<String>,
    pub llm_model: String,
    /// Empty selects the offline hashing embedder
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub generate_timeout_seconds: u64,
    pub max_game_steps: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset and blank values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let llm_backend: BackendKind = get("LLM_BACKEND")
            .unwrap_or_else(|| "openai".into())
            .parse()
            .context("Invalid LLM_BACKEND")?;

        let api_key = get("OPENAI_API_KEY");
        if llm_backend.requires_api_key() && api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; requests to the hosted API will be rejected");
        }

        let buffer_size: usize = parse_or(&get, "BUFFER_SIZE", 10)?;
        if buffer_size == 0 {
            return Err(anyhow::anyhow!("BUFFER_SIZE must be at least 1"));
        }

        Ok(Self {
            data_dir: get("DATA_DIR").unwrap_or_else(|| "./history_logs".into()).into(),
            characters_path: get("CHARACTERS_PATH")
                .unwrap_or_else(|| "./characters.json".into())
                .into(),
            user_name: get("USER_NAME").unwrap_or_else(|| "Halil".into()),
            default_character: get("DEFAULT_CHARACTER"),
            buffer_size,
            num_query_results: parse_or(&get, "NUM_QUERY_RESULTS", 2)?,
            llm_base_url: get("LLM_BASE_URL")
                .unwrap_or_else(|| llm_backend.default_base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            llm_model: get("LLM_MODEL").unwrap_or_else(|| "gpt-3.5-turbo".into()),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or_default(),
            temperature: parse_or(&get, "TEMPERATURE", llm_backend.default_temperature())?,
            max_tokens: parse_or(&get, "MAX_TOKENS", 2000)?,
            generate_timeout_seconds: parse_or(&get, "GENERATE_TIMEOUT_SECONDS", 300)?,
            max_game_steps: parse_or(&get, "MAX_GAME_STEPS", 4)?,
            llm_backend,
        })
    }

    pub fn buffer_dir(&self) -> PathBuf {
        self.data_dir.join(crate::memory_db::SUMMARY_BUFFER_DIR)
    }

    pub fn vector_store_path(&self) -> PathBuf {
        self.data_dir.join(crate::memory_db::VECTOR_STORE_FILE)
    }

    pub fn uses_hashing_embedder(&self) -> bool {
        self.embedding_model.is_empty()
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Data Dir: {}", self.data_dir.display());
        info!("- Characters: {}", self.characters_path.display());
        info!("- User Name: {}", self.user_name);
        info!("- Buffer Size: {}", self.buffer_size);
        info!("- Query Results: {}", self.num_query_results);
        info!("- Backend: {} ({})", self.llm_backend, self.llm_base_url);
        info!("- Model: {}", self.llm_model);
        info!(
            "- Embeddings: {}",
            if self.uses_hashing_embedder() { "offline hashing" } else { self.embedding_model.as_str() }
        );
        info!("- Temperature: {}", self.temperature);
        info!("- Max Tokens: {}", self.max_tokens);
        info!("- Generate Timeout: {}s", self.generate_timeout_seconds);
        info!("- API Key: {}", if self.api_key.is_some() { "set" } else { "not set" });
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
