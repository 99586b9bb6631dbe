//! Collaborator traits for AI providers, plus vector utilities.
//!
//! Defines the [`EmbeddingGateway`], [`Reranker`], and [`KeywordExtractor`]
//! boundaries the engine consumes, and pure helpers for vector
//! serialization and similarity.
//!
//! Concrete providers (OpenAI, Ollama, fastembed, HTTP rerankers) live in
//! the `notes-rag` app crate.

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::models::Keyword;

/// Boundary contract to an external embedding provider.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;

    /// Health check used to gate feature enablement and full reindexing.
    async fn is_available(&self) -> bool;

    /// Embed a batch of texts. The result has the same length and order
    /// as `texts`.
    ///
    /// # Errors
    ///
    /// [`RagError::ModelUnavailable`] when the provider is unreachable or
    /// misconfigured, [`RagError::ProviderError`] for call failures.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::ProviderError("empty embedding response".to_string()))
    }
}

/// Optional secondary relevance model.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn model_name(&self) -> &str;

    async fn is_available(&self) -> bool;

    /// Score each document against the query. The result has one score per
    /// document, in input order; higher is more relevant.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

/// External keyword extraction used to seed retrieval queries.
pub trait KeywordExtractor: Send + Sync {
    /// Return up to `top_k` keywords, most relevant first.
    fn extract(&self, text: &str, top_k: usize) -> Vec<Keyword>;
}

/// Check that a provider answered with one vector per input.
pub fn check_batch_shape(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(RagError::ProviderError(format!(
            "provider returned {} embeddings for {} inputs",
            vectors.len(),
            expected
        )));
    }
    Ok(())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use notes_rag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two embedding vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, and
/// zero-magnitude vectors (e.g. the embedding of an empty chunk in a mock).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
