//! Mock collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use notes_rag::pipeline::IndexingPipeline;
use notes_rag::retrieve::RetrievalService;
use notes_rag::state::EngineController;
use notes_rag_core::corpus::InMemoryCorpus;
use notes_rag_core::embedding::{EmbeddingGateway, KeywordExtractor, Reranker};
use notes_rag_core::error::Result as RagResult;
use notes_rag_core::index::memory::InMemoryIndex;
use notes_rag_core::models::{Document, Keyword};
use notes_rag_core::settings::{MemorySettingsStore, PersistedSettings};
use notes_rag_core::RagError;

/// Embeds text as its a–z letter histogram, so cosine similarity tracks
/// letter composition. Counts every availability check and embed call.
pub struct LetterGateway {
    pub available: AtomicBool,
    pub checks: AtomicUsize,
    pub embed_calls: AtomicUsize,
    /// When set, `embed` waits for a permit before answering.
    pub gate: Option<Semaphore>,
    /// Cancelled after the first embed call, when set.
    pub cancel_after_first: Option<CancellationToken>,
}

impl LetterGateway {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            checks: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            gate: None,
            cancel_after_first: None,
        }
    }

    pub fn unavailable() -> Self {
        let gateway = Self::new();
        gateway.available.store(false, Ordering::SeqCst);
        gateway
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1_000);
        }
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

pub fn letter_histogram(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 26];
    for c in text.chars() {
        if c.is_ascii_lowercase() {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
    }
    v
}

#[async_trait]
impl EmbeddingGateway for LetterGateway {
    fn model_name(&self) -> &str {
        "letters"
    }

    fn dims(&self) -> usize {
        26
    }

    async fn is_available(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }

    async fn embed(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| RagError::ProviderError("gate closed".to_string()))?;
        }
        if let Some(token) = &self.cancel_after_first {
            token.cancel();
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(RagError::ModelUnavailable("letters offline".to_string()));
        }
        Ok(texts.iter().map(|t| letter_histogram(t)).collect())
    }
}

/// Reranker scripted per test.
pub struct ScriptedReranker {
    pub available: bool,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl ScriptedReranker {
    pub fn new(available: bool, fail: bool) -> Self {
        Self {
            available,
            fail,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Reranker for ScriptedReranker {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    /// Scores documents by their count of the letter `z`.
    async fn rerank(&self, _query: &str, documents: &[String]) -> RagResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::ProviderError("rerank exploded".to_string()));
        }
        Ok(documents
            .iter()
            .map(|d| d.chars().filter(|c| *c == 'z').count() as f32)
            .collect())
    }
}

/// Returns the message's words as keywords, counting calls.
pub struct WordExtractor {
    pub calls: AtomicUsize,
}

impl WordExtractor {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl KeywordExtractor for WordExtractor {
    fn extract(&self, text: &str, top_k: usize) -> Vec<Keyword> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        text.split_whitespace()
            .filter(|w| w.len() > 3)
            .take(top_k)
            .map(|w| Keyword {
                text: w.to_string(),
                weight: 1.0,
            })
            .collect()
    }
}

pub struct Harness {
    pub gateway: Arc<LetterGateway>,
    pub store: Arc<MemorySettingsStore>,
    pub controller: Arc<EngineController>,
    pub index: Arc<InMemoryIndex>,
    pub corpus: Arc<InMemoryCorpus>,
    pub pipeline: Arc<IndexingPipeline>,
    pub retrieval: RetrievalService,
}

pub fn harness(persisted: PersistedSettings, gateway: LetterGateway, docs: Vec<Document>) -> Harness {
    let gateway = Arc::new(gateway);
    let store = Arc::new(MemorySettingsStore::with_settings(persisted));
    let controller = Arc::new(EngineController::load(store.clone(), gateway.clone()).unwrap());
    let index = Arc::new(InMemoryIndex::new());
    let corpus = Arc::new(InMemoryCorpus::from_documents(docs));
    let pipeline = Arc::new(IndexingPipeline::new(
        controller.clone(),
        index.clone(),
        corpus.clone(),
    ));
    let retrieval = RetrievalService::new(controller.clone(), index.clone());
    Harness {
        gateway,
        store,
        controller,
        index,
        corpus,
        pipeline,
        retrieval,
    }
}

pub fn enabled() -> PersistedSettings {
    PersistedSettings {
        vector_db_enabled: true,
        rag_enabled: true,
        ..PersistedSettings::default()
    }
}

/// The three-document corpus: an 1800-char note, a 50-char note, an empty note.
pub fn abc_corpus() -> Vec<Document> {
    vec![
        Document::new("a.md", format!("{}{}", "a".repeat(1000), "z".repeat(800))),
        Document::new("b.md", "b".repeat(50)),
        Document::new("c.md", ""),
    ]
}
