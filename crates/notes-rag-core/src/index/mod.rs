//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the persistent mapping from chunk identity
//! to `{vector, text, metadata}`. Both backends ([`memory::InMemoryIndex`]
//! here and `SqliteIndex` in the app crate) share the validation and
//! ranking rules defined in this module and in [`crate::search`].
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert_document`](VectorIndex::upsert_document) | Atomically replace all entries of one document |
//! | [`search`](VectorIndex::search) | Top-K cosine similarity with deterministic tie-breaks |
//! | [`delete_document`](VectorIndex::delete_document) | Drop all entries of one document |
//! | [`count`](VectorIndex::count) | Number of distinct documents indexed |
//! | [`document_paths`](VectorIndex::document_paths) | Indexed paths, sorted |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::RagError;
use crate::models::{IndexEntry, ScoredEntry};

/// Result of an upsert under last-write-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The document's entries were replaced.
    Applied,
    /// A newer version of the document is already stored; nothing changed.
    SkippedStale,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replace every entry of `path` with `entries` in one step.
    ///
    /// Concurrent searches observe either the old or the new set, never a
    /// mix. When the stored version has a newer `updated_at` the call is a
    /// no-op returning [`UpsertOutcome::SkippedStale`]. An empty `entries`
    /// removes the document.
    ///
    /// # Errors
    ///
    /// [`RagError::IndexCorruption`] when the entries do not all belong to
    /// `path`, carry different stamps, or have mismatched vector lengths.
    async fn upsert_document(&self, path: &str, entries: Vec<IndexEntry>) -> Result<UpsertOutcome>;

    /// Return up to `top_k` entries ranked by descending cosine similarity,
    /// then `updated_at` descending, then `document_path` ascending.
    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<ScoredEntry>>;

    /// Remove all entries of `path`. Returns whether anything was removed.
    async fn delete_document(&self, path: &str) -> Result<bool>;

    /// Number of distinct documents indexed.
    async fn count(&self) -> Result<usize>;

    /// All indexed document paths in ascending order.
    async fn document_paths(&self) -> Result<Vec<String>>;
}

/// Check the batch invariants of an upsert and return its `updated_at` stamp.
///
/// Returns `None` for an empty batch.
pub fn validate_entries(path: &str, entries: &[IndexEntry]) -> Result<Option<i64>, RagError> {
    let Some(first) = entries.first() else {
        return Ok(None);
    };
    let dims = first.vector.len();
    let stamp = first.updated_at;

    for entry in entries {
        if entry.document_path != path || entry.chunk_id.document_path != path {
            return Err(RagError::IndexCorruption(format!(
                "entry for '{}' submitted in upsert of '{}'",
                entry.document_path, path
            )));
        }
        if entry.vector.len() != dims {
            return Err(RagError::IndexCorruption(format!(
                "mixed vector dimensions in upsert of '{}': {} and {}",
                path,
                dims,
                entry.vector.len()
            )));
        }
        if entry.updated_at != stamp {
            return Err(RagError::IndexCorruption(format!(
                "entries of '{}' come from different reprocessings",
                path
            )));
        }
    }

    Ok(Some(stamp))
}
