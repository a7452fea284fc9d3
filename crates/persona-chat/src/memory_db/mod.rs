//! Memory database module - JSON summary buffers for short-term memory, SQLite vector store for long-term memory
pub mod migration;
pub mod schema;
pub mod summary_store;
pub mod vector_store;

pub use migration::MigrationManager;
pub use schema::{RetrievedEntry, VectorStoreStats};
pub use summary_store::{BufferRecord, SummaryBufferStore, NO_SUMMARY_SENTINEL};
pub use vector_store::{Collection, VectorStore};

use crate::error::MemoryResult;
use crate::model_runtime::Embedder;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub const SUMMARY_BUFFER_DIR: &str = "summary_buffer";
pub const VECTOR_STORE_FILE: &str = "vector_store.db";

/// Both memory stores rooted at one data directory
pub struct MemoryDatabase {
    pub buffers: SummaryBufferStore,
    pub vectors: VectorStore,
}

impl MemoryDatabase {
    pub fn open(data_dir: &Path, buffer_size: usize, embedder: Arc<dyn Embedder>) -> MemoryResult<Self> {
        info!("Opening memory at: {}", data_dir.display());
        std::fs::create_dir_all(data_dir)?;
        let buffers = SummaryBufferStore::new(data_dir.join(SUMMARY_BUFFER_DIR), buffer_size)?;
        let vectors = VectorStore::open(&data_dir.join(VECTOR_STORE_FILE), embedder)?;
        Ok(Self { buffers, vectors })
    }
}
