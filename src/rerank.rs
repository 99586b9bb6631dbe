//! HTTP reranker implementations of [`Reranker`].
//!
//! [`JinaReranker`] speaks the Jina/Cohere-style rerank API also served by
//! llama.cpp and TEI:
//!
//! ```text
//! POST {url}
//! {"model": "...", "query": "...", "documents": ["...", ...]}
//! → {"results": [{"index": 0, "relevance_score": 0.93}, ...]}
//! ```
//!
//! A configured reranker counts as available; there is no separate health
//! check. Rerank calls are not retried: the retrieval service falls back to
//! similarity order on any failure.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use notes_rag_core::embedding::Reranker;
use notes_rag_core::RagError;

use crate::config::RerankConfig;
use crate::embedding::post_json_with_retry;

pub struct JinaReranker {
    model: String,
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl JinaReranker {
    pub fn new(config: &RerankConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("rerank.model required for jina provider"))?;
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("rerank.url required for jina provider"))?;

        let api_key = match &config.api_key_env {
            Some(var) => match std::env::var(var) {
                Ok(key) => Some(key),
                Err(_) => bail!("{} environment variable not set", var),
            },
            None => None,
        };

        Ok(Self {
            model,
            url,
            api_key,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }
}

#[async_trait]
impl Reranker for JinaReranker {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RagError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
        });
        let json = post_json_with_retry(
            &self.client,
            &self.url,
            self.api_key.as_deref(),
            &body,
            0,
            "Rerank",
        )
        .await?;
        parse_rerank_response(&json, documents.len())
    }
}

/// Map `results[].relevance_score` back onto input order.
fn parse_rerank_response(json: &serde_json::Value, expected: usize) -> Result<Vec<f32>, RagError> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| RagError::ProviderError("Invalid rerank response: missing results".to_string()))?;

    let mut scores: Vec<Option<f32>> = vec![None; expected];
    for item in results {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .filter(|i| *i < expected)
            .ok_or_else(|| RagError::ProviderError("Invalid rerank response: bad index".to_string()))?;
        let score = item
            .get("relevance_score")
            .and_then(|s| s.as_f64())
            .ok_or_else(|| {
                RagError::ProviderError("Invalid rerank response: missing relevance_score".to_string())
            })?;
        scores[index] = Some(score as f32);
    }

    scores
        .into_iter()
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| RagError::ProviderError("Rerank response did not score every document".to_string()))
}

/// Create the reranker named by `rerank.provider`, or `None` when disabled.
pub fn create_reranker(config: &RerankConfig) -> Result<Option<Arc<dyn Reranker>>> {
    if !config.is_enabled() {
        return Ok(None);
    }
    match config.provider.as_str() {
        "jina" => Ok(Some(Arc::new(JinaReranker::new(config)?))),
        other => bail!("Unknown rerank provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_maps_back_to_input_order() {
        let json = serde_json::json!({
            "results": [
                {"index": 2, "relevance_score": 0.9},
                {"index": 0, "relevance_score": 0.1},
                {"index": 1, "relevance_score": 0.5}
            ]
        });
        assert_eq!(parse_rerank_response(&json, 3).unwrap(), vec![0.1, 0.5, 0.9]);
    }

    #[test]
    fn test_parse_rejects_partial_or_out_of_range() {
        let partial = serde_json::json!({"results": [{"index": 0, "relevance_score": 0.1}]});
        assert!(parse_rerank_response(&partial, 2).is_err());

        let out_of_range = serde_json::json!({"results": [{"index": 5, "relevance_score": 0.1}]});
        assert!(parse_rerank_response(&out_of_range, 1).is_err());
    }

    #[test]
    fn test_disabled_is_none() {
        assert!(create_reranker(&RerankConfig::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_reranker_is_available_but_errors() {
        let config = RerankConfig {
            provider: "jina".to_string(),
            model: Some("jina-reranker-v2-base-multilingual".to_string()),
            url: Some("http://127.0.0.1:9/v1/rerank".to_string()),
            api_key_env: None,
            timeout_secs: 2,
        };
        let reranker = create_reranker(&config).unwrap().unwrap();
        // No request is made until there is something to rerank.
        assert!(reranker.is_available().await);
        assert!(reranker.rerank("q", &["d".to_string()]).await.is_err());
    }
}
