//! Database schema definitions for the long-term vector store
use serde::{Deserialize, Serialize};

/// A query hit, most relevant first
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedEntry {
    pub entry_id: i64,
    pub document: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStoreStats {
    pub total_collections: i64,
    pub total_entries: i64,
    pub database_size_bytes: i64,
    pub schema_version: i32,
}

pub const SCHEMA_V1_SQL: &str = "
-- Collections, one per character
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    created_at TIMESTAMP NOT NULL
);
-- Indexed conversation lines
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    entry_id INTEGER NOT NULL,
    document TEXT NOT NULL,
    embedding BLOB NOT NULL,
    embedding_model TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE,
    UNIQUE(collection, entry_id)
);
CREATE INDEX IF NOT EXISTS idx_entries_collection ON entries (collection, entry_id);
";

pub const SCHEMA_V2_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_entries_model ON entries (collection, embedding_model);
";
