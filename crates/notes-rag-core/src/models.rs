//! Core data models that flow through the indexing and retrieval pipeline.

use serde::Serialize;

/// A corpus document as observed at save time or during a full reindex.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Corpus-relative path, `/`-separated (e.g. `"journal/2024-03.md"`).
    pub path: String,
    pub content: String,
    /// Last modification time, epoch milliseconds.
    pub modified_at: i64,
}

impl Document {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            modified_at: 0,
        }
    }
}

/// A window of a document's text. Offsets are in characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub document_path: String,
    pub offset_start: usize,
    pub offset_end: usize,
    pub text: String,
}

/// Identity of a chunk inside the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChunkId {
    pub document_path: String,
    pub offset_start: usize,
}

/// One embedded chunk stored in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: ChunkId,
    pub offset_end: usize,
    pub vector: Vec<f32>,
    pub text: String,
    pub document_path: String,
    /// Epoch milliseconds at which the producing reprocessing started.
    pub updated_at: i64,
}

impl IndexEntry {
    /// Pair a chunk with its embedding vector.
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>, updated_at: i64) -> Self {
        Self {
            chunk_id: ChunkId {
                document_path: chunk.document_path.clone(),
                offset_start: chunk.offset_start,
            },
            offset_end: chunk.offset_end,
            vector,
            text: chunk.text,
            document_path: chunk.document_path,
            updated_at,
        }
    }
}

/// A search hit: an index entry and its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    pub score: f32,
}

/// A retrieved chunk as reported to diagnostics and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub document_path: String,
    pub offset_start: usize,
    pub offset_end: usize,
    /// Cosine similarity to the query.
    pub score: f32,
    /// Reranker relevance score, when reranking was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    pub text: String,
}

/// A ranked keyword produced by the external keyword extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub text: String,
    pub weight: f32,
}
