//! Ranking, threshold filtering, and context assembly.
//!
//! Pure functions shared by the index backends and the retrieval service.
//!
//! # Retrieval Algorithm
//!
//! 1. Join the query terms into one query text ([`build_query_text`]).
//! 2. Embed the query and fetch `result_count` nearest entries, ranked by
//!    [`compare_hits`].
//! 3. Drop hits scoring below the similarity threshold ([`filter_by_threshold`]).
//! 4. Optionally reorder by reranker scores ([`apply_rerank_scores`]).
//! 5. Concatenate the surviving texts in rank order ([`join_context`]).

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::models::{IndexEntry, ScoredEntry};

/// Separator placed between chunks in the assembled context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Deterministic hit order: score descending, `updated_at` descending,
/// `document_path` ascending, then `offset_start` ascending.
pub fn compare_hits(a_score: f32, a: &IndexEntry, b_score: f32, b: &IndexEntry) -> Ordering {
    b_score
        .total_cmp(&a_score)
        .then(b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.document_path.cmp(&b.document_path))
        .then(a.chunk_id.offset_start.cmp(&b.chunk_id.offset_start))
}

/// Score every entry against `query` and keep the `top_k` best.
pub fn rank_entries<'a, I>(query: &[f32], entries: I, top_k: usize) -> Vec<ScoredEntry>
where
    I: IntoIterator<Item = &'a IndexEntry>,
{
    let mut scored: Vec<(f32, &IndexEntry)> = entries
        .into_iter()
        .map(|e| (cosine_similarity(query, &e.vector), e))
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| compare_hits(*sa, a, *sb, b));
    scored.truncate(top_k);
    scored
        .into_iter()
        .map(|(score, entry)| ScoredEntry {
            entry: entry.clone(),
            score,
        })
        .collect()
}

/// Join keyword terms into a single query text, skipping blank terms.
pub fn build_query_text<S: AsRef<str>>(terms: &[S]) -> String {
    terms
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep hits whose score is at least `threshold`, preserving order.
pub fn filter_by_threshold(hits: Vec<ScoredEntry>, threshold: f32) -> Vec<ScoredEntry> {
    hits.into_iter().filter(|h| h.score >= threshold).collect()
}

/// Reorder hits by reranker score (descending). Ties keep similarity order.
///
/// Returns `None` when `scores` does not line up with `hits`, in which case
/// the caller keeps the similarity ordering.
pub fn apply_rerank_scores(
    hits: Vec<ScoredEntry>,
    scores: &[f32],
) -> Option<Vec<(ScoredEntry, f32)>> {
    if scores.len() != hits.len() {
        return None;
    }
    let mut paired: Vec<(ScoredEntry, f32)> = hits.into_iter().zip(scores.iter().copied()).collect();
    paired.sort_by(|(_, a), (_, b)| b.total_cmp(a));
    Some(paired)
}

/// Concatenate chunk texts in order into one context string.
pub fn join_context<'a, I>(texts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    texts.into_iter().collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}
