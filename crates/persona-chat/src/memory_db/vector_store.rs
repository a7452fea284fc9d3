//! Long-term memory: every conversation line of a character, embedded and
//! searchable by cosine similarity.
//!
//! Entry ids are assigned from the collection's current size, so a batch of `n`
//! lines receives `count..count + n`. Ids are never reused silently: if a slot
//! is already taken the batch fails with [`MemoryError::IdentifierCollision`].

use crate::error::{MemoryError, MemoryResult};
use crate::memory::Exchange;
use crate::memory_db::migration::{self, MigrationManager};
use crate::memory_db::schema::{RetrievedEntry, VectorStoreStats};
use crate::model_runtime::{cosine_similarity, Embedder};
use crate::utils::format_messages::{render_many, render_transcript_line};
use crate::utils::TextUtils;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle to one character's collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collection {
    name: String,
}

impl Collection {
    pub fn for_character(character_name: &str) -> Self {
        Self {
            name: TextUtils::sanitize_name(character_name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct VectorStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    embedder: Arc<dyn Embedder>,
}

impl VectorStore {
    pub fn open(db_path: &Path, embedder: Arc<dyn Embedder>) -> MemoryResult<Self> {
        info!("Opening vector store at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )
        });
        let pool = Pool::builder().max_size(4).build(manager)?;
        Self::from_pool(pool, embedder)
    }

    fn from_pool(pool: Pool<SqliteConnectionManager>, embedder: Arc<dyn Embedder>) -> MemoryResult<Self> {
        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        info!("Vector store ready (embedding model: {})", embedder.model_name());
        Ok(Self {
            pool: Arc::new(pool),
            embedder,
        })
    }

    /// Get or create the collection for a character
    pub fn select_session(&self, character_name: &str) -> MemoryResult<Collection> {
        let collection = Collection::for_character(character_name);
        let conn = self.pool.get()?;
        let created = conn.execute(
            "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?1, ?2)",
            params![collection.name(), chrono::Utc::now().to_rfc3339()],
        )?;
        if created > 0 {
            info!("Created vector collection '{}'", collection.name());
        }
        Ok(collection)
    }

    pub async fn index_greeting(
        &self,
        collection: &Collection,
        greeting: &Exchange,
        persona_name: &str,
    ) -> MemoryResult<Vec<i64>> {
        let line = crate::utils::format_messages::render_for_index(greeting, persona_name);
        self.add_documents(collection, &[line]).await
    }

    /// Index a batch of exchanges as `"speaker: content"` lines, in order
    pub async fn index_exchanges(
        &self,
        collection: &Collection,
        exchanges: &[Exchange],
        persona_name: &str,
        user_name: &str,
    ) -> MemoryResult<Vec<i64>> {
        let lines = render_many(exchanges, persona_name, user_name);
        self.add_documents(collection, &lines).await
    }

    pub async fn add_documents(&self, collection: &Collection, documents: &[String]) -> MemoryResult<Vec<i64>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self
            .embedder
            .embed(documents)
            .await
            .map_err(MemoryError::Backend)?;
        if embeddings.len() != documents.len() {
            return Err(MemoryError::Backend(anyhow::anyhow!(
                "embedder returned {} vectors for {} documents",
                embeddings.len(),
                documents.len()
            )));
        }

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM entries WHERE collection = ?1",
            [collection.name()],
            |row| row.get(0),
        )?;
        let last = count + documents.len() as i64 - 1;

        let taken: Option<i64> = tx.query_row(
            "SELECT MIN(entry_id) FROM entries WHERE collection = ?1 AND entry_id BETWEEN ?2 AND ?3",
            params![collection.name(), count, last],
            |row| row.get(0),
        )?;
        if let Some(entry_id) = taken {
            warn!("Entry id {} already taken in collection '{}'", entry_id, collection.name());
            return Err(MemoryError::IdentifierCollision {
                collection: collection.name().to_string(),
                entry_id,
            });
        }

        let now = chrono::Utc::now().to_rfc3339();
        let model = self.embedder.model_name();
        let ids: Vec<i64> = (count..=last).collect();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO entries (collection, entry_id, document, embedding, embedding_model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for ((id, document), embedding) in ids.iter().zip(documents).zip(&embeddings) {
                let blob = bincode::serialize(embedding)?;
                stmt.execute(params![collection.name(), id, document, blob, model, &now])?;
            }
        }
        tx.commit()?;

        debug!("Indexed {} entries into '{}' (ids {}..={})", ids.len(), collection.name(), count, last);
        Ok(ids)
    }

    /// Up to `k` entries, most similar first. Entries embedded by a different
    /// model are re-embedded and updated before scoring.
    pub async fn query(&self, collection: &Collection, text: &str, k: usize) -> MemoryResult<Vec<RetrievedEntry>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut rows = self.load_vectors(collection)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.refresh_stale(collection, &mut rows).await?;

        let query_vector = self
            .embedder
            .embed(&[text.to_string()])
            .await
            .map_err(MemoryError::Backend)?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Backend(anyhow::anyhow!("embedder returned no vector for the query")))?;

        let mut scored: Vec<RetrievedEntry> = rows
            .into_iter()
            .map(|row| RetrievedEntry {
                similarity: cosine_similarity(&query_vector, &row.embedding),
                entry_id: row.entry_id,
                document: row.document,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.entry_id.cmp(&b.entry_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub fn reset_collection(&self, collection: &Collection) -> MemoryResult<usize> {
        let conn = self.pool.get()?;
        let deleted = conn.execute("DELETE FROM entries WHERE collection = ?1", [collection.name()])?;
        info!("Reset collection '{}' ({} entries removed)", collection.name(), deleted);
        Ok(deleted)
    }

    pub fn count(&self, collection: &Collection) -> MemoryResult<i64> {
        let conn = self.pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE collection = ?1",
            [collection.name()],
            |row| row.get(0),
        )?)
    }

    /// Raw documents in storage order
    pub fn entries(&self, collection: &Collection) -> MemoryResult<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT document FROM entries WHERE collection = ?1 ORDER BY entry_id")?;
        let documents = stmt
            .query_map([collection.name()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(documents)
    }

    /// Transcript view: each entry capitalized and followed by a blank line
    pub fn full_history(&self, collection: &Collection) -> MemoryResult<String> {
        Ok(self
            .entries(collection)?
            .iter()
            .map(|doc| format!("{}\n\n", render_transcript_line(doc)))
            .collect())
    }

    pub fn stats(&self) -> MemoryResult<VectorStoreStats> {
        let conn = self.pool.get()?;
        Ok(migration::get_database_stats(&conn)?)
    }

    fn load_vectors(&self, collection: &Collection) -> MemoryResult<Vec<VectorRow>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT entry_id, document, embedding, embedding_model FROM entries
             WHERE collection = ?1 ORDER BY entry_id",
        )?;
        let raw = stmt
            .query_map([collection.name()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(entry_id, document, blob, embedding_model)| {
                Ok(VectorRow {
                    entry_id,
                    document,
                    embedding: bincode::deserialize(&blob)?,
                    embedding_model,
                })
            })
            .collect()
    }

    async fn refresh_stale(&self, collection: &Collection, rows: &mut [VectorRow]) -> MemoryResult<()> {
        let model = self.embedder.model_name().to_string();
        let stale: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.embedding_model != model)
            .map(|(i, _)| i)
            .collect();
        if stale.is_empty() {
            return Ok(());
        }

        info!(
            "Re-embedding {} entries of '{}' with model {}",
            stale.len(),
            collection.name(),
            model
        );
        let texts: Vec<String> = stale.iter().map(|&i| rows[i].document.clone()).collect();
        let vectors = self.embedder.embed(&texts).await.map_err(MemoryError::Backend)?;
        if vectors.len() != texts.len() {
            return Err(MemoryError::Backend(anyhow::anyhow!(
                "embedder returned {} vectors for {} stale entries",
                vectors.len(),
                texts.len()
            )));
        }

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for (&i, vector) in stale.iter().zip(vectors) {
            let blob = bincode::serialize(&vector)?;
            tx.execute(
                "UPDATE entries SET embedding = ?1, embedding_model = ?2
                 WHERE collection = ?3 AND entry_id = ?4",
                params![blob, &model, collection.name(), rows[i].entry_id],
            )?;
            rows[i].embedding = vector;
            rows[i].embedding_model = model.clone();
        }
        tx.commit()?;
        Ok(())
    }
}

struct VectorRow {
    entry_id: i64,
    document: String,
    embedding: Vec<f32>,
    embedding_model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_runtime::HashingEmbedder;
    use tempfile::TempDir;

    fn store() -> (TempDir, VectorStore) {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(&dir.path().join("vector_store.db"), Arc::new(HashingEmbedder::default())).unwrap();
        (dir, store)
    }

    fn docs(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_ids_are_monotonic_across_batches() {
        let (_dir, store) = store();
        let c = store.select_session("Goku").unwrap();

        let first = store.add_documents(&c, &docs(&["a", "b"])).await.unwrap();
        let second = store.add_documents(&c, &docs(&["c", "d", "e"])).await.unwrap();

        assert_eq!(first, vec![0, 1]);
        assert_eq!(second, vec![2, 3, 4]);
        assert_eq!(store.count(&c).unwrap(), 5);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let (_dir, store) = store();
        let goku = store.select_session("Goku").unwrap();
        let mario = store.select_session("Mario").unwrap();

        store.add_documents(&goku, &docs(&["a", "b"])).await.unwrap();
        assert_eq!(store.add_documents(&mario, &docs(&["x"])).await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_query_is_bounded_by_k_and_count() {
        let (_dir, store) = store();
        let c = store.select_session("Goku").unwrap();
        assert!(store.query(&c, "anything", 2).await.unwrap().is_empty());

        store.add_documents(&c, &docs(&["Goku: I love training"])).await.unwrap();
        assert_eq!(store.query(&c, "training", 2).await.unwrap().len(), 1);

        store
            .add_documents(&c, &docs(&["Halil: what about food?", "Goku: food is great", "Halil: ok"]))
            .await
            .unwrap();
        assert_eq!(store.query(&c, "food", 2).await.unwrap().len(), 2);
        assert!(store.query(&c, "food", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_ranks_most_similar_first() {
        let (_dir, store) = store();
        let c = store.select_session("Goku").unwrap();
        store
            .add_documents(
                &c,
                &docs(&[
                    "Halil: do you like pizza?",
                    "Goku: Vegeta is my rival in training",
                    "Halil: the weather is nice",
                ]),
            )
            .await
            .unwrap();

        let hits = store.query(&c, "Vegeta rival", 1).await.unwrap();
        assert_eq!(hits[0].entry_id, 1);
    }

    #[tokio::test]
    async fn test_reset_restarts_ids() {
        let (_dir, store) = store();
        let c = store.select_session("Goku").unwrap();
        store.add_documents(&c, &docs(&["a", "b", "c"])).await.unwrap();

        assert_eq!(store.reset_collection(&c).unwrap(), 3);
        assert_eq!(store.count(&c).unwrap(), 0);
        assert_eq!(store.add_documents(&c, &docs(&["d"])).await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_collision_is_reported_not_overwritten() {
        let (_dir, store) = store();
        let c = store.select_session("Goku").unwrap();
        store.add_documents(&c, &docs(&["a", "b"])).await.unwrap();

        // Remove a single entry so the count no longer matches the id range
        store
            .pool
            .get()
            .unwrap()
            .execute("DELETE FROM entries WHERE collection = ?1 AND entry_id = 0", [c.name()])
            .unwrap();

        let err = store.add_documents(&c, &docs(&["c"])).await.unwrap_err();
        assert!(matches!(err, MemoryError::IdentifierCollision { entry_id: 1, .. }));
        assert_eq!(store.entries(&c).unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_full_history_capitalizes_in_order() {
        let (_dir, store) = store();
        let c = store.select_session("test_character").unwrap();
        let lines = vec![Exchange::user("Hello there"), Exchange::assistant("General Kenobi")];
        store.index_exchanges(&c, &lines, "test_character", "Halil").await.unwrap();

        assert_eq!(
            store.full_history(&c).unwrap(),
            "Halil: hello there\n\nTest_character: general kenobi\n\n"
        );
    }

    #[tokio::test]
    async fn test_stale_embeddings_are_refreshed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_store.db");
        {
            let old = VectorStore::open(&path, Arc::new(HashingEmbedder::new(16))).unwrap();
            let c = old.select_session("Goku").unwrap();
            old.add_documents(&c, &docs(&["Goku: kamehameha"])).await.unwrap();
        }

        let store = VectorStore::open(&path, Arc::new(HashingEmbedder::default())).unwrap();
        let c = store.select_session("Goku").unwrap();
        let hits = store.query(&c, "kamehameha", 1).await.unwrap();
        assert!(hits[0].similarity > 0.0);

        let model: String = store
            .pool
            .get()
            .unwrap()
            .query_row("SELECT embedding_model FROM entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(model, "hashing-384");
    }

    /// Claims a model name but returns no vectors
    struct EmptyEmbedder(&'static str);

    #[async_trait::async_trait]
    impl Embedder for EmptyEmbedder {
        fn model_name(&self) -> &str {
            self.0
        }

        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_missing_vectors_fail_the_query() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_store.db");
        {
            let store = VectorStore::open(&path, Arc::new(HashingEmbedder::default())).unwrap();
            let c = store.select_session("Goku").unwrap();
            store.add_documents(&c, &docs(&["Goku: a", "Goku: b"])).await.unwrap();
        }

        // Same model name: nothing is stale, the query vector itself is missing
        let store = VectorStore::open(&path, Arc::new(EmptyEmbedder("hashing-384"))).unwrap();
        let c = store.select_session("Goku").unwrap();
        assert!(matches!(store.query(&c, "a", 2).await, Err(MemoryError::Backend(_))));

        // Another model name: re-embedding the stale rows comes back short
        let store = VectorStore::open(&path, Arc::new(EmptyEmbedder("other-model"))).unwrap();
        let c = store.select_session("Goku").unwrap();
        assert!(matches!(store.query(&c, "a", 2).await, Err(MemoryError::Backend(_))));
        assert_eq!(store.entries(&c).unwrap().len(), 2);
    }

    #[test]
    fn test_collection_name_is_sanitized() {
        assert_eq!(Collection::for_character("Sherlock Holmes").name(), "Sherlock_Holmes");
    }
}
