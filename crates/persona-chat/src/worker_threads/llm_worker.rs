//! LLM worker
//!
//! Handles inference by calling an OpenAI-compatible HTTP endpoint: a local
//! llama-server or a hosted API with a bearer key.
use crate::config::Config;
use crate::memory::Exchange;
use crate::model_runtime::{BackendKind, ChatModel, Embedder};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Exchange],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [&'a str]>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LLMWorkerSettings {
    pub backend: BackendKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl LLMWorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            backend: config.llm_backend,
            base_url: config.llm_base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.llm_model.clone(),
            embedding_model: config.embedding_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.generate_timeout_seconds),
        }
    }
}

pub struct LLMWorker {
    settings: LLMWorkerSettings,
    http_client: reqwest::Client,
}

impl LLMWorker {
    pub fn new(settings: LLMWorkerSettings) -> Self {
        info!(
            "LLM worker initialized with {} backend: {}",
            settings.backend, settings.base_url
        );
        Self {
            http_client: reqwest::Client::builder()
                .timeout(settings.timeout)
                .build()
                .unwrap_or_default(),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(LLMWorkerSettings::from_config(config))
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.settings.base_url)
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.settings.base_url)
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let request = self.http_client.post(url);
        match (&self.settings.api_key, self.settings.backend) {
            (Some(key), BackendKind::HostedApi) => request.bearer_auth(key),
            _ => request,
        }
    }

    pub async fn generate_response(&self, messages: &[Exchange]) -> anyhow::Result<String> {
        debug!("LLM worker generating response for {} messages", messages.len());
        let request = ChatCompletionRequest {
            model: &self.settings.model,
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stream: false,
            stop: Some(self.settings.backend.stop_tokens()).filter(|s| !s.is_empty()),
        };
        let response = self
            .post(self.completions_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("LLM backend request failed: {}", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("LLM backend returned {}: {}", status, body));
        }
        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse LLM response: {}", e))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| anyhow::anyhow!("LLM backend returned no choices"))?;
        Ok(content.trim().to_string())
    }

    pub async fn generate_embeddings(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Generating embeddings for {} text(s)", texts.len());
        let request = EmbeddingRequest {
            model: &self.settings.embedding_model,
            input: texts,
        };
        let response = self
            .post(self.embeddings_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Embedding request failed: {}", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Embedding endpoint returned {}: {}", status, body));
        }
        let mut embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse embedding response: {}", e))?;
        embedding_response.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        let embeddings: Vec<Vec<f32>> = embedding_response
            .data
            .into_iter()
            .map(|d| d.embedding)
            .collect();
        if embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Embedding endpoint returned {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            ));
        }
        debug!(
            "Generated {} embeddings (dim={})",
            embeddings.len(),
            embeddings.first().map(|e| e.len()).unwrap_or(0)
        );
        Ok(embeddings)
    }
}

#[async_trait]
impl ChatModel for LLMWorker {
    fn backend(&self) -> BackendKind {
        self.settings.backend
    }

    async fn generate(&self, prompt: &[Exchange]) -> anyhow::Result<String> {
        self.generate_response(prompt).await
    }
}

/// Embeddings from the worker's `/v1/embeddings` endpoint
pub struct HttpEmbedder {
    worker: Arc<LLMWorker>,
}

impl HttpEmbedder {
    pub fn new(worker: Arc<LLMWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.worker.settings.embedding_model
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.worker.generate_embeddings(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn settings(backend: BackendKind, base_url: String, api_key: Option<&str>) -> LLMWorkerSettings {
        LLMWorkerSettings {
            backend,
            base_url,
            api_key: api_key.map(str::to_string),
            model: "test-model".to_string(),
            embedding_model: "test-embed".to_string(),
            temperature: 0.4,
            max_tokens: 64,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_hosted_backend_sends_bearer_and_messages() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "test-model",
                "messages": [
                    {"role": "system", "content": "be Goku"},
                    {"role": "user", "content": "hi"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  Hey there!  "}}]}"#)
            .create_async()
            .await;

        let worker = LLMWorker::new(settings(BackendKind::HostedApi, server.url(), Some("sk-test")));
        let reply = worker
            .generate(&[Exchange::system("be Goku"), Exchange::user("hi")])
            .await
            .unwrap();

        assert_eq!(reply, "Hey there!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_local_backend_sends_stop_tokens() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "stop": ["<|end_of_turn|>"],
                "temperature": 0.4
            })))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"ok"}}]}"#)
            .create_async()
            .await;

        let worker = LLMWorker::new(settings(BackendKind::LocalModel, server.url(), None));
        assert_eq!(worker.generate(&[Exchange::user("hi")]).await.unwrap(), "ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_backend_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("model crashed")
            .create_async()
            .await;

        let worker = LLMWorker::new(settings(BackendKind::LocalModel, server.url(), None));
        let err = worker.generate(&[Exchange::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let worker = LLMWorker::new(settings(BackendKind::LocalModel, server.url(), None));
        assert!(worker.generate(&[Exchange::user("hi")]).await.is_err());
    }

    #[tokio::test]
    async fn test_embeddings_are_ordered_by_index() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .match_body(Matcher::PartialJson(serde_json::json!({"model": "test-embed"})))
            .with_status(200)
            .with_body(r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#)
            .create_async()
            .await;

        let worker = Arc::new(LLMWorker::new(settings(BackendKind::LocalModel, server.url(), None)));
        let embedder = HttpEmbedder::new(worker);
        let vectors = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(embedder.model_name(), "test-embed");
    }

    #[tokio::test]
    async fn test_no_texts_skips_request() {
        let worker = LLMWorker::new(settings(BackendKind::LocalModel, "http://127.0.0.1:1".into(), None));
        assert!(worker.generate_embeddings(&[]).await.unwrap().is_empty());
    }
}
