//! Embedding provider implementations of [`EmbeddingGateway`].
//!
//! - **[`DisabledProvider`]**: never available; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API with batching, retry, and backoff.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`LocalProvider`]**: runs models locally via fastembed (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! # Provider Selection
//!
//! Use [`create_gateway`] to instantiate the provider named in the config:
//!
//! ```rust,no_run
//! # use notes_rag::config::EmbeddingConfig;
//! # use notes_rag::embedding::create_gateway;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let gateway = create_gateway(&config).unwrap();
//! assert_eq!(gateway.model_name(), "disabled");
//! ```
//!
//! # Retry Strategy
//!
//! The HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 401/403/404 → [`RagError::ModelUnavailable`] immediately
//! - Other HTTP 4xx → [`RagError::ProviderError`] immediately
//! - Network errors → retry, then [`RagError::ModelUnavailable`]
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use notes_rag_core::embedding::{check_batch_shape, EmbeddingGateway};
use notes_rag_core::RagError;

use crate::config::EmbeddingConfig;

/// Text embedded by availability checks.
const PING_TEXT: &str = "ping";

// ============ Shared HTTP plumbing ============

/// POST a JSON body with retry/backoff and return the parsed JSON response.
pub(crate) async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> std::result::Result<serde_json::Value, RagError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        RagError::ProviderError(format!("{label} returned invalid JSON: {e}"))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();

                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(RagError::ProviderError(format!(
                        "{label} API error {status}: {body_text}"
                    )));
                    continue;
                }

                // Misconfigured key or model, don't retry
                if matches!(status.as_u16(), 401 | 403 | 404) {
                    return Err(RagError::ModelUnavailable(format!(
                        "{label} API error {status}: {body_text}"
                    )));
                }

                return Err(RagError::ProviderError(format!(
                    "{label} API error {status}: {body_text}"
                )));
            }
            Err(e) => {
                last_err = Some(RagError::ModelUnavailable(format!(
                    "{label} connection error ({url}): {e}"
                )));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| RagError::ProviderError(format!("{label} failed after retries"))))
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn parse_vector(value: &serde_json::Value, label: &str) -> std::result::Result<Vec<f32>, RagError> {
    value
        .as_array()
        .ok_or_else(|| RagError::ProviderError(format!("Invalid {label} response: embedding is not an array")))
        .map(|values| {
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect()
        })
}

/// Check that every vector has the configured dimension.
fn check_dims(dims: usize, vectors: &[Vec<f32>]) -> std::result::Result<(), RagError> {
    match vectors.iter().find(|v| v.len() != dims) {
        Some(v) => Err(RagError::ProviderError(format!(
            "provider returned a {}-dimensional embedding, expected {dims}",
            v.len()
        ))),
        None => Ok(()),
    }
}

/// Embed `texts` in provider-sized batches, preserving order.
async fn embed_batched<F, Fut>(
    texts: &[String],
    batch_size: usize,
    dims: usize,
    mut call: F,
) -> std::result::Result<Vec<Vec<f32>>, RagError>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: std::future::Future<Output = std::result::Result<Vec<Vec<f32>>, RagError>>,
{
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = call(batch.to_vec()).await?;
        check_batch_shape(batch.len(), &embedded)?;
        check_dims(dims, &embedded)?;
        vectors.extend(embedded);
    }
    Ok(vectors)
}

// ============ Disabled Provider ============

/// A provider that is never available.
///
/// Used when `embedding.provider = "disabled"`. Enabling the vector
/// database against it fails with a descriptive message.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingGateway for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn embed(&self, _texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, RagError> {
        Err(RagError::ModelUnavailable(
            "embedding provider is disabled; set [embedding] provider in config".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST https://api.openai.com/v1/embeddings` (or `embedding.url`)
/// with the configured model. Requires `OPENAI_API_KEY`.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config,
    /// or if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;

        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };

        Ok(Self {
            model,
            dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string()),
            api_key,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs)?,
        })
    }

    async fn embed_batch(
        &self,
        texts: Vec<String>,
        max_retries: u32,
    ) -> std::result::Result<Vec<Vec<f32>>, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

#[async_trait]
impl EmbeddingGateway for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    /// Single attempt, without retries.
    async fn is_available(&self) -> bool {
        embed_batched(&[PING_TEXT.to_string()], 1, self.dims, |batch| {
            self.embed_batch(batch, 0)
        })
        .await
        .is_ok()
    }

    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, RagError> {
        embed_batched(texts, self.batch_size, self.dims, |batch| {
            self.embed_batch(batch, self.max_retries)
        })
        .await
    }
}

/// Parse the OpenAI embeddings API response, ordering by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> std::result::Result<Vec<Vec<f32>>, RagError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::ProviderError("Invalid OpenAI response: missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| RagError::ProviderError("Invalid OpenAI response: missing embedding".to_string()))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, parse_vector(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). Requires an embedding model to be pulled,
/// e.g. `ollama pull nomic-embed-text`.
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs)?,
        })
    }

    async fn embed_batch(
        &self,
        texts: Vec<String>,
        max_retries: u32,
    ) -> std::result::Result<Vec<Vec<f32>>, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url.trim_end_matches('/')),
            None,
            &body,
            max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

#[async_trait]
impl EmbeddingGateway for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    /// Single attempt, without retries.
    async fn is_available(&self) -> bool {
        embed_batched(&[PING_TEXT.to_string()], 1, self.dims, |batch| {
            self.embed_batch(batch, 0)
        })
        .await
        .is_ok()
    }

    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, RagError> {
        embed_batched(texts, self.batch_size, self.dims, |batch| {
            self.embed_batch(batch, self.max_retries)
        })
        .await
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> std::result::Result<Vec<Vec<f32>>, RagError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::ProviderError("Invalid Ollama response: missing embeddings array".to_string())
        })?;

    embeddings
        .iter()
        .map(|embedding| parse_vector(embedding, "Ollama"))
        .collect()
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference via fastembed.
///
/// Models are downloaded on first use from Hugging Face and cached.
/// After the initial download no network calls are needed.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "bge-base-en-v1.5" | "nomic-embed-text-v1.5" | "multilingual-e5-base" => 768,
            "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
            _ => 384,
        });
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingGateway for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn is_available(&self) -> bool {
        self.embed(&[PING_TEXT.to_string()]).await.is_ok()
    }

    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, RagError> {
        let fastembed_model = config_to_fastembed_model(&self.model_name)
            .map_err(|e| RagError::ModelUnavailable(e.to_string()))?;
        let batch_size = self.batch_size;
        let owned = texts.to_vec();
        let expected = owned.len();

        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
            )
            .map_err(|e| {
                RagError::ModelUnavailable(format!("Failed to initialize local embedding model: {e}"))
            })?;

            model
                .embed(owned, Some(batch_size))
                .map_err(|e| RagError::ProviderError(format!("Local embedding failed: {e}")))
        })
        .await
        .map_err(|e| RagError::ProviderError(format!("Local embedding task failed: {e}")))??;

        check_batch_shape(expected, &vectors)?;
        check_dims(self.dims, &vectors)?;
        Ok(vectors)
    }
}

/// Create the [`EmbeddingGateway`] named by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings-fastembed`) |
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider
/// cannot be initialized (missing config, API key, or feature flag).
pub fn create_gateway(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingGateway>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledProvider));
    }
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
