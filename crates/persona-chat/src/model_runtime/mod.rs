//! Inference collaborators
//!
//! Completions and embeddings both come from an OpenAI-compatible HTTP endpoint,
//! either a local llama-server or a hosted API. The traits here are the seams the
//! memory subsystem depends on; the HTTP implementations live in `worker_threads`.
pub mod embedder;
pub mod runtime_trait;
pub mod sentiment;

pub use embedder::{cosine_similarity, Embedder, HashingEmbedder, HASHING_EMBEDDING_DIM};
pub use runtime_trait::{BackendKind, ChatModel};
pub use sentiment::{Emotion, PromptedClassifier, SentimentClassifier};
