//! Error taxonomy shared by the indexing and retrieval paths.
//!
//! Plumbing errors (SQL, file I/O, config parsing) travel as
//! [`anyhow::Error`]; the variants here are the ones whose *kind* drives
//! policy. Callers recover them with `err.downcast_ref::<RagError>()`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RagError {
    /// Malformed chunking or retrieval parameters. Rejected before persisting.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Embedding or reranking provider not reachable or misconfigured.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Transient failure during an embed or rerank call.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// A vector index invariant would be violated. Fatal for one document only.
    #[error("index corruption: {0}")]
    IndexCorruption(String),

    /// A full reindex was requested while the vector database is switched off.
    #[error("vector database is disabled")]
    VectorDbDisabled,

    /// The background index queue is at capacity.
    #[error("index queue is full")]
    QueueFull,

    /// The background index worker has shut down.
    #[error("index queue is closed")]
    QueueClosed,

    /// Settings or index persistence failed.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, RagError>;
