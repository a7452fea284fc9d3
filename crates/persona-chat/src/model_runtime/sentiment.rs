//! Emotion classification of persona replies

use crate::memory::Exchange;
use crate::model_runtime::ChatModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Anger,
    Disgust,
    Fear,
    Joy,
    Neutral,
    Sadness,
    Surprise,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Anger,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Joy,
        Emotion::Neutral,
        Emotion::Sadness,
        Emotion::Surprise,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Anger => "anger",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Joy => "joy",
            Emotion::Neutral => "neutral",
            Emotion::Sadness => "sadness",
            Emotion::Surprise => "surprise",
        }
    }

    /// First label word found in free-form model output, `Neutral` otherwise
    pub fn from_model_output(output: &str) -> Emotion {
        crate::utils::TextUtils::words(output)
            .iter()
            .find_map(|word| Emotion::ALL.iter().copied().find(|e| e.label() == word.as_str()))
            .unwrap_or(Emotion::Neutral)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> anyhow::Result<Emotion>;
}

/// Asks the chat model for a single label
pub struct PromptedClassifier {
    model: Arc<dyn ChatModel>,
}

impl PromptedClassifier {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    fn instruction() -> String {
        let labels: Vec<&str> = Emotion::ALL.iter().map(|e| e.label()).collect();
        format!(
            "Classify the emotion expressed in the user's text. Answer with exactly one word from this list: {}.",
            labels.join(", ")
        )
    }
}

#[async_trait]
impl SentimentClassifier for PromptedClassifier {
    async fn classify(&self, text: &str) -> anyhow::Result<Emotion> {
        let prompt = [Exchange::system(Self::instruction()), Exchange::user(text)];
        let output = self.model.generate(&prompt).await?;
        let emotion = Emotion::from_model_output(&output);
        debug!("Classified reply as {} (raw: {:?})", emotion, output.trim());
        Ok(emotion)
    }
}
