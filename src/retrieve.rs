//! Retrieval service: query terms → ranked, threshold-filtered context.
//!
//! Retrieval is best-effort. Every failure (embedding, index, reranking) is
//! collapsed to "no context" at this boundary and logged, so the chat
//! pipeline that calls [`RetrievalService::retrieve`] always gets a string.
//!
//! # Algorithm
//!
//! 1. Return `""` immediately when RAG is disabled (no provider calls).
//! 2. Join the terms with a single space and embed the query text.
//! 3. Fetch `result_count` nearest entries from the vector index.
//! 4. Drop entries scoring below `similarity_threshold`.
//! 5. If a reranker is configured and available, reorder by its scores;
//!    any reranker failure keeps the similarity order.
//! 6. Join the texts in final order, separated by a blank line.

use std::sync::Arc;

use anyhow::Result;

use notes_rag_core::embedding::{EmbeddingGateway, KeywordExtractor, Reranker};
use notes_rag_core::index::VectorIndex;
use notes_rag_core::models::{RetrievedChunk, ScoredEntry};
use notes_rag_core::search::{apply_rerank_scores, build_query_text, filter_by_threshold, join_context};

use crate::state::EngineController;

pub struct RetrievalService {
    controller: Arc<EngineController>,
    gateway: Arc<dyn EmbeddingGateway>,
    index: Arc<dyn VectorIndex>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RetrievalService {
    pub fn new(controller: Arc<EngineController>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            gateway: controller.gateway().clone(),
            controller,
            index,
            reranker: None,
        }
    }

    pub fn with_reranker(mut self, reranker: Option<Arc<dyn Reranker>>) -> Self {
        self.reranker = reranker;
        self
    }

    /// Context for `query_terms`, or `""` when there is none.
    pub async fn retrieve<S: AsRef<str> + Sync>(&self, query_terms: &[S]) -> String {
        let chunks = self.retrieve_detailed(query_terms).await;
        join_context(chunks.iter().map(|c| c.text.as_str()))
    }

    /// Context for a chat message, with query terms seeded by `extractor`.
    ///
    /// Falls back to the whole message when no keywords are extracted.
    pub async fn retrieve_for_message(
        &self,
        message: &str,
        extractor: &dyn KeywordExtractor,
        top_k: usize,
    ) -> String {
        if !self.controller.is_rag_enabled() {
            return String::new();
        }
        let terms: Vec<String> = extractor
            .extract(message, top_k)
            .into_iter()
            .map(|k| k.text)
            .collect();
        if terms.is_empty() {
            tracing::debug!("no keywords extracted, querying with the full message");
            return self.retrieve(std::slice::from_ref(&message)).await;
        }
        self.retrieve(terms.as_slice()).await
    }

    /// The ranked chunks behind [`Self::retrieve`], for diagnostics.
    pub async fn retrieve_detailed<S: AsRef<str> + Sync>(&self, query_terms: &[S]) -> Vec<RetrievedChunk> {
        if !self.controller.is_rag_enabled() {
            return Vec::new();
        }

        let query = build_query_text(query_terms);
        if query.is_empty() {
            tracing::debug!("empty retrieval query");
            return Vec::new();
        }

        match self.search(&query).await {
            Ok(chunks) => Some(chunks),
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, continuing without context");
                None
            }
        }
        .unwrap_or_default()
    }

    async fn search(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let settings = self.controller.settings();
        let vector = self.gateway.embed_query(query).await?;
        let hits = self.index.search(&vector, settings.result_count).await?;
        let hits = filter_by_threshold(hits, settings.similarity_threshold);

        let ranked = self.rerank(query, hits).await;
        Ok(ranked
            .into_iter()
            .map(|(hit, rerank_score)| RetrievedChunk {
                document_path: hit.entry.document_path,
                offset_start: hit.entry.chunk_id.offset_start,
                offset_end: hit.entry.offset_end,
                score: hit.score,
                rerank_score,
                text: hit.entry.text,
            })
            .collect())
    }

    async fn rerank(&self, query: &str, hits: Vec<ScoredEntry>) -> Vec<(ScoredEntry, Option<f32>)> {
        let Some(reranker) = &self.reranker else {
            return similarity_order(hits);
        };
        if hits.is_empty() {
            return Vec::new();
        }
        if !reranker.is_available().await {
            tracing::debug!(model = reranker.model_name(), "reranker unavailable, keeping similarity order");
            return similarity_order(hits);
        }

        let texts: Vec<String> = hits.iter().map(|h| h.entry.text.clone()).collect();
        let scores = match reranker.rerank(query, &texts).await {
            Ok(scores) => scores,
            Err(e) => {
                tracing::debug!(error = %e, "rerank failed, keeping similarity order");
                return similarity_order(hits);
            }
        };

        match apply_rerank_scores(hits.clone(), &scores) {
            Some(reranked) => reranked.into_iter().map(|(h, s)| (h, Some(s))).collect(),
            None => {
                tracing::debug!(
                    expected = hits.len(),
                    got = scores.len(),
                    "reranker returned the wrong number of scores, keeping similarity order"
                );
                similarity_order(hits)
            }
        }
    }
}

fn similarity_order(hits: Vec<ScoredEntry>) -> Vec<(ScoredEntry, Option<f32>)> {
    hits.into_iter().map(|h| (h, None)).collect()
}
