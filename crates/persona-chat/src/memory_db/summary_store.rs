//! Short-term summary buffer: a running summary plus a rolling window of recent exchanges
//!
//! One JSON document per character, `[summary, [{"role", "content"}, ...]]`, stored
//! under `<dir>/<sanitized name>.json`. Every write replaces the whole document
//! through a temp file and a rename, so readers only ever see complete records.

use crate::error::{MemoryError, MemoryResult};
use crate::memory::Exchange;
use crate::utils::TextUtils;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Returned by [`SummaryBufferStore::load_summary`] while no summary exists. It is
/// sent to the model verbatim.
pub const NO_SUMMARY_SENTINEL: &str = "You have no conversation summary with the user yet.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, Vec<Exchange>)", into = "(String, Vec<Exchange>)")]
pub struct BufferRecord {
    pub summary: String,
    pub window: Vec<Exchange>,
}

impl From<(String, Vec<Exchange>)> for BufferRecord {
    fn from((summary, window): (String, Vec<Exchange>)) -> Self {
        Self { summary, window }
    }
}

impl From<BufferRecord> for (String, Vec<Exchange>) {
    fn from(record: BufferRecord) -> Self {
        (record.summary, record.window)
    }
}

pub struct SummaryBufferStore {
    directory: PathBuf,
    buffer_size: usize,
    pending: DashMap<String, bool>,
}

impl SummaryBufferStore {
    pub fn new(directory: impl Into<PathBuf>, buffer_size: usize) -> MemoryResult<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        info!("Summary buffer directory: {}", directory.display());
        Ok(Self {
            directory,
            buffer_size,
            pending: DashMap::new(),
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn record_path(&self, character: &str) -> PathBuf {
        self.directory
            .join(format!("{}.json", TextUtils::sanitize_name(character)))
    }

    /// True when no record exists or its window is empty
    pub fn is_empty(&self, character: &str) -> MemoryResult<bool> {
        Ok(self
            .read_record(character)?
            .map_or(true, |record| record.window.is_empty()))
    }

    pub fn ensure_record_exists(&self, character: &str) -> MemoryResult<()> {
        if self.record_path(character).exists() {
            return Ok(());
        }
        debug!("Creating empty summary buffer for {}", character);
        self.write_record(character, &BufferRecord::default())
    }

    pub fn reset_session(&self, character: &str) -> MemoryResult<()> {
        info!("Resetting summary buffer for {}", character);
        self.write_record(character, &BufferRecord::default())
    }

    /// Full record, or an empty one if the character has never been seen
    pub fn record(&self, character: &str) -> MemoryResult<BufferRecord> {
        Ok(self.read_record(character)?.unwrap_or_default())
    }

    pub fn load_summary(&self, character: &str) -> MemoryResult<String> {
        let summary = self.record(character)?.summary;
        if summary.is_empty() {
            Ok(NO_SUMMARY_SENTINEL.to_string())
        } else {
            Ok(summary)
        }
    }

    pub fn load_window(&self, character: &str) -> MemoryResult<Vec<Exchange>> {
        Ok(self.record(character)?.window)
    }

    /// Overwrites any prior record with `summary = ""`, `window = [greeting]`
    pub fn save_initial_greeting(&self, character: &str, greeting: &Exchange) -> MemoryResult<()> {
        self.write_record(
            character,
            &BufferRecord {
                summary: String::new(),
                window: vec![greeting.clone()],
            },
        )
    }

    pub fn append_to_window(&self, character: &str, new_exchanges: &[Exchange]) -> MemoryResult<()> {
        let mut record = self.load_existing(character)?;
        record.window.extend_from_slice(new_exchanges);
        self.write_record(character, &record)
    }

    pub fn replace_summary(&self, character: &str, new_summary: &str) -> MemoryResult<()> {
        let mut record = self.load_existing(character)?;
        record.summary = new_summary.to_string();
        self.write_record(character, &record)
    }

    pub fn clear_window(&self, character: &str) -> MemoryResult<()> {
        let mut record = self.load_existing(character)?;
        record.window.clear();
        self.write_record(character, &record)
    }

    /// Replace the summary, clear the window and append `new_exchanges` in one
    /// document write.
    pub fn fold_into_summary(
        &self,
        character: &str,
        new_summary: &str,
        new_exchanges: &[Exchange],
    ) -> MemoryResult<()> {
        // Existence check only; the old window is discarded.
        self.load_existing(character)?;
        debug!(
            "Folding window into summary for {} ({} exchanges carried over)",
            character,
            new_exchanges.len()
        );
        self.write_record(
            character,
            &BufferRecord {
                summary: new_summary.to_string(),
                window: new_exchanges.to_vec(),
            },
        )
    }

    /// Overwrite the record wholesale. Used by the recovery path.
    pub fn replace_record(&self, character: &str, record: &BufferRecord) -> MemoryResult<()> {
        self.write_record(character, record)
    }

    /// Recompute `summary_pending = len(window) >= buffer_size` and cache it
    pub fn refresh_fullness(&self, character: &str) -> MemoryResult<bool> {
        let pending = self.load_window(character)?.len() >= self.buffer_size;
        self.pending.insert(character.to_string(), pending);
        Ok(pending)
    }

    /// Last value computed by [`refresh_fullness`](Self::refresh_fullness); `false`
    /// if it was never called for this character.
    pub fn summary_pending(&self, character: &str) -> bool {
        self.pending.get(character).map_or(false, |p| *p)
    }

    fn load_existing(&self, character: &str) -> MemoryResult<BufferRecord> {
        self.read_record(character)?
            .ok_or_else(|| MemoryError::RecordNotFound {
                character: character.to_string(),
            })
    }

    fn read_record(&self, character: &str) -> MemoryResult<Option<BufferRecord>> {
        let path = self.record_path(character);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| MemoryError::MalformedPersistedState { path, source })
    }

    fn write_record(&self, character: &str, record: &BufferRecord) -> MemoryResult<()> {
        let path = self.record_path(character);
        let json = serde_json::to_string_pretty(record)?;
        write_atomically(&self.directory, &path, json.as_bytes())
    }
}

fn write_atomically(directory: &Path, path: &Path, contents: &[u8]) -> MemoryResult<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(directory)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
