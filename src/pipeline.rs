//! Indexing pipeline: corpus → chunking → embedding → vector index.
//!
//! Two entry points:
//!
//! - [`IndexingPipeline::process_document`] indexes one saved document. It
//!   is called from the background [`crate::worker::IndexWorker`] so saves
//!   never wait on the embedding provider.
//! - [`IndexingPipeline::process_all_documents`] is the guarded full reindex:
//!   at most one runs at a time, document failures are counted rather than
//!   aborting the batch, and indexed paths that disappeared from the corpus
//!   are pruned at the end.
//!
//! Entries are stamped with the version time of the content they were built
//! from: the save time for a saved document, the file's modification time
//! (or the scan time when unknown) during a reindex. When two versions of
//! the same document race, the older one finishing last is rejected by the
//! index as stale.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use notes_rag_core::chunk::chunk_document;
use notes_rag_core::corpus::{Corpus, CorpusScan};
use notes_rag_core::embedding::{check_batch_shape, EmbeddingGateway};
use notes_rag_core::index::{UpsertOutcome, VectorIndex};
use notes_rag_core::models::IndexEntry;
use notes_rag_core::RagError;

use crate::progress::{NoProgress, ReindexProgressEvent, ReindexProgressReporter};
use crate::state::EngineController;

/// Result of indexing a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Entries were replaced; `chunks` is the new entry count.
    Indexed { chunks: usize },
    /// The vector database is disabled; nothing was done.
    Skipped,
    /// A newer version of the document was already indexed.
    Stale,
}

/// Counters reported by a full reindex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub success: usize,
    pub failed: usize,
    pub pruned: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexOutcome {
    Completed(ReindexReport),
    /// Another reindex holds the processing flag; this call did nothing.
    AlreadyRunning,
}

pub struct IndexingPipeline {
    controller: Arc<EngineController>,
    gateway: Arc<dyn EmbeddingGateway>,
    index: Arc<dyn VectorIndex>,
    corpus: Arc<dyn Corpus>,
}

impl IndexingPipeline {
    pub fn new(
        controller: Arc<EngineController>,
        index: Arc<dyn VectorIndex>,
        corpus: Arc<dyn Corpus>,
    ) -> Self {
        Self {
            gateway: controller.gateway().clone(),
            controller,
            index,
            corpus,
        }
    }

    pub fn controller(&self) -> &Arc<EngineController> {
        &self.controller
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn corpus(&self) -> &Arc<dyn Corpus> {
        &self.corpus
    }

    /// Chunk, embed, and upsert one document saved just now.
    ///
    /// On an embedding failure the document's previous entries stay as they
    /// were and the error is returned to the caller.
    pub async fn process_document(&self, path: &str, content: &str) -> Result<DocumentOutcome> {
        self.process_document_version(path, content, Utc::now().timestamp_millis())
            .await
    }

    /// Like [`Self::process_document`] for content whose version time
    /// (epoch millis) is `version`. The index keeps the newest version.
    pub async fn process_document_version(
        &self,
        path: &str,
        content: &str,
        version: i64,
    ) -> Result<DocumentOutcome> {
        if !self.controller.is_vector_db_enabled() {
            tracing::debug!(path = %path, "vector database disabled, skipping document");
            return Ok(DocumentOutcome::Skipped);
        }

        let settings = self.controller.settings();
        let chunks = chunk_document(path, content, &settings)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let vectors = self.gateway.embed(&texts).await?;
        check_batch_shape(texts.len(), &vectors)?;

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::from_chunk(chunk, vector, version))
            .collect();
        let count = entries.len();

        match self.index.upsert_document(path, entries).await? {
            UpsertOutcome::Applied => {
                tracing::debug!(path = %path, chunks = count, "document indexed");
                Ok(DocumentOutcome::Indexed { chunks: count })
            }
            UpsertOutcome::SkippedStale => {
                tracing::debug!(path = %path, "newer version already indexed, skipping");
                Ok(DocumentOutcome::Stale)
            }
        }
    }

    /// Remove a document's entries from the index.
    pub async fn remove_document(&self, path: &str) -> Result<bool> {
        let removed = self.index.delete_document(path).await?;
        if removed {
            tracing::debug!(path = %path, "document removed from index");
        }
        Ok(removed)
    }

    /// Full reindex of the corpus. See [`Self::process_all_documents_with_progress`].
    pub async fn process_all_documents(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<ReindexOutcome> {
        self.process_all_documents_with_progress(cancel, &NoProgress)
            .await
    }

    /// Full reindex of the corpus.
    ///
    /// Returns [`ReindexOutcome::AlreadyRunning`] without side effects when a
    /// reindex is in progress. Fails with [`RagError::VectorDbDisabled`] or
    /// [`RagError::ModelUnavailable`] before the processing flag is taken.
    /// Once started, the processing flag is always cleared and the completion
    /// time persisted, whether the run succeeds, fails, or is cancelled.
    pub async fn process_all_documents_with_progress(
        &self,
        cancel: Option<&CancellationToken>,
        progress: &dyn ReindexProgressReporter,
    ) -> Result<ReindexOutcome> {
        if self.controller.snapshot().is_processing {
            tracing::info!("reindex already running, ignoring request");
            return Ok(ReindexOutcome::AlreadyRunning);
        }
        if !self.controller.is_vector_db_enabled() {
            return Err(RagError::VectorDbDisabled.into());
        }
        if !self.gateway.is_available().await {
            return Err(RagError::ModelUnavailable(format!(
                "embedding model '{}' is not available",
                self.gateway.model_name()
            ))
            .into());
        }

        let Some(guard) = self.controller.try_begin_processing() else {
            tracing::info!("reindex already running, ignoring request");
            return Ok(ReindexOutcome::AlreadyRunning);
        };

        tracing::info!("reindex started");
        let result = self.reindex(cancel, progress).await;

        let document_count = match self.index.count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "failed to count indexed documents");
                self.controller.snapshot().document_count
            }
        };
        self.controller.record_process_completed(document_count);
        drop(guard);

        let report = result?;
        tracing::info!(
            success = report.success,
            failed = report.failed,
            pruned = report.pruned,
            cancelled = report.cancelled,
            documents = document_count,
            "reindex finished"
        );
        Ok(ReindexOutcome::Completed(report))
    }

    async fn reindex(
        &self,
        cancel: Option<&CancellationToken>,
        progress: &dyn ReindexProgressReporter,
    ) -> Result<ReindexReport> {
        progress.report(ReindexProgressEvent::Scanning);
        let scanned_at = Utc::now().timestamp_millis();
        let CorpusScan {
            documents,
            unreadable,
        } = self.corpus.scan_documents().await?;
        let total = documents.len() as u64;
        let mut report = ReindexReport::default();

        // Unreadable documents keep their previous entries.
        for failure in &unreadable {
            tracing::warn!(path = %failure.path, error = %failure.error, "failed to read document");
            report.failed += 1;
        }

        for (i, doc) in documents.iter().enumerate() {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                tracing::info!(processed = i, "reindex cancelled");
                report.cancelled = true;
                break;
            }

            let version = if doc.modified_at > 0 {
                doc.modified_at
            } else {
                scanned_at
            };
            match self
                .process_document_version(&doc.path, &doc.content, version)
                .await
            {
                Ok(DocumentOutcome::Indexed { .. }) | Ok(DocumentOutcome::Stale) => {
                    report.success += 1;
                }
                Ok(DocumentOutcome::Skipped) => {
                    // Vector database switched off mid-run.
                    tracing::info!(processed = i, "vector database disabled during reindex, stopping");
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(path = %doc.path, error = %e, "failed to index document");
                    report.failed += 1;
                }
            }

            progress.report(ReindexProgressEvent::Indexing {
                n: i as u64 + 1,
                total,
                path: doc.path.clone(),
            });
        }

        if !report.cancelled {
            let live: HashSet<&str> = documents
                .iter()
                .map(|d| d.path.as_str())
                .chain(unreadable.iter().map(|f| f.path.as_str()))
                .collect();
            let stale: Vec<String> = self
                .index
                .document_paths()
                .await?
                .into_iter()
                .filter(|path| !live.contains(path.as_str()))
                .collect();

            if !stale.is_empty() {
                progress.report(ReindexProgressEvent::Pruning {
                    count: stale.len() as u64,
                });
            }
            for path in &stale {
                match self.index.delete_document(path).await {
                    Ok(_) => {
                        tracing::debug!(path = %path, "pruned document missing from corpus");
                        report.pruned += 1;
                    }
                    Err(e) => tracing::warn!(path = %path, error = %e, "failed to prune document"),
                }
            }
        }

        Ok(report)
    }

    /// Run [`Self::process_all_documents`] as a background task.
    pub fn spawn_reindex(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<Result<ReindexOutcome>> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.process_all_documents(Some(&cancel)).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use notes_rag_core::corpus::InMemoryCorpus;
    use notes_rag_core::index::memory::InMemoryIndex;
    use notes_rag_core::models::Document;
    use notes_rag_core::settings::{MemorySettingsStore, PersistedSettings};

    /// Fails any batch containing the word "poison".
    struct PickyGateway;

    #[async_trait]
    impl EmbeddingGateway for PickyGateway {
        fn model_name(&self) -> &str {
            "picky"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn embed(&self, texts: &[String]) -> notes_rag_core::error::Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(RagError::ProviderError("poisoned".to_string()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32 + 1.0]).collect())
        }
    }

    fn pipeline(vector_db: bool, docs: Vec<Document>) -> (IndexingPipeline, Arc<InMemoryIndex>) {
        let store = Arc::new(MemorySettingsStore::with_settings(PersistedSettings {
            vector_db_enabled: vector_db,
            ..PersistedSettings::default()
        }));
        let controller = Arc::new(EngineController::load(store, Arc::new(PickyGateway)).unwrap());
        let index = Arc::new(InMemoryIndex::new());
        let corpus = Arc::new(InMemoryCorpus::from_documents(docs));
        (IndexingPipeline::new(controller, index.clone(), corpus), index)
    }

    #[tokio::test]
    async fn test_process_document_skipped_when_disabled() {
        let (pipeline, index) = pipeline(false, vec![]);
        let outcome = pipeline.process_document("a.md", "alpha").await.unwrap();
        assert_eq!(outcome, DocumentOutcome::Skipped);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_embed_keeps_previous_entries() {
        let (pipeline, index) = pipeline(true, vec![]);
        pipeline.process_document("a.md", "alpha").await.unwrap();
        assert!(pipeline.process_document("a.md", "poison").await.is_err());

        let entries = index.entries_for("a.md").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "alpha");
    }

    #[tokio::test]
    async fn test_reindex_counts_failures_and_continues() {
        let (pipeline, index) = pipeline(
            true,
            vec![
                Document::new("a.md", "alpha"),
                Document::new("b.md", "poison"),
                Document::new("c.md", "gamma"),
            ],
        );
        let outcome = pipeline.process_all_documents(None).await.unwrap();
        let ReindexOutcome::Completed(report) = outcome else {
            panic!("expected a completed reindex");
        };
        assert_eq!(report.success, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(index.document_paths().await.unwrap(), vec!["a.md", "c.md"]);

        let state = pipeline.controller().snapshot();
        assert!(!state.is_processing);
        assert_eq!(state.document_count, 2);
        assert!(state.last_process_time.is_some());
    }

    #[tokio::test]
    async fn test_reindex_requires_vector_db() {
        let (pipeline, _) = pipeline(false, vec![Document::new("a.md", "alpha")]);
        let err = pipeline.process_all_documents(None).await.unwrap_err();
        assert_eq!(err.downcast_ref::<RagError>(), Some(&RagError::VectorDbDisabled));
        assert!(pipeline.controller().snapshot().last_process_time.is_none());
    }

    #[tokio::test]
    async fn test_remove_document() {
        let (pipeline, index) = pipeline(true, vec![]);
        pipeline.process_document("a.md", "alpha").await.unwrap();
        assert!(pipeline.remove_document("a.md").await.unwrap());
        assert!(!pipeline.remove_document("a.md").await.unwrap());
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
