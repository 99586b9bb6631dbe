//! In-memory [`VectorIndex`] implementation for tests and embedded hosts.
//!
//! All documents live in one `HashMap` behind a `std::sync::RwLock`, so an
//! upsert swaps a document's whole entry set under a single write lock.
//! Search is brute-force cosine similarity over every stored vector.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::error::RagError;
use crate::models::{IndexEntry, ScoredEntry};
use crate::search::rank_entries;

use super::{validate_entries, UpsertOutcome, VectorIndex};

struct StoredDocument {
    updated_at: i64,
    entries: Vec<IndexEntry>,
}

/// In-memory vector index.
pub struct InMemoryIndex {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of stored entries across all documents.
    pub fn entry_count(&self) -> Result<usize> {
        Ok(self.read()?.values().map(|d| d.entries.len()).sum())
    }

    /// Snapshot of one document's entries, ordered by offset.
    pub fn entries_for(&self, path: &str) -> Result<Vec<IndexEntry>> {
        Ok(self
            .read()?
            .get(path)
            .map(|d| d.entries.clone())
            .unwrap_or_default())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredDocument>>> {
        self.documents
            .read()
            .map_err(|_| RagError::Storage("in-memory index lock poisoned".to_string()).into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredDocument>>> {
        self.documents
            .write()
            .map_err(|_| RagError::Storage("in-memory index lock poisoned".to_string()).into())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert_document(
        &self,
        path: &str,
        mut entries: Vec<IndexEntry>,
    ) -> Result<UpsertOutcome> {
        let stamp = validate_entries(path, &entries)?;
        entries.sort_by_key(|e| e.chunk_id.offset_start);

        let mut documents = self.write()?;
        let Some(stamp) = stamp else {
            documents.remove(path);
            return Ok(UpsertOutcome::Applied);
        };

        if let Some(existing) = documents.get(path) {
            if existing.updated_at > stamp {
                return Ok(UpsertOutcome::SkippedStale);
            }
        }

        documents.insert(
            path.to_string(),
            StoredDocument {
                updated_at: stamp,
                entries,
            },
        );
        Ok(UpsertOutcome::Applied)
    }

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<ScoredEntry>> {
        let documents = self.read()?;
        Ok(rank_entries(
            query_vector,
            documents.values().flat_map(|d| d.entries.iter()),
            top_k,
        ))
    }

    async fn delete_document(&self, path: &str) -> Result<bool> {
        Ok(self.write()?.remove(path).is_some())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn document_paths(&self) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self.read()?.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }
}
