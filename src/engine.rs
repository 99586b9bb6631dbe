//! Wiring of the engine components from a [`Config`].

use std::sync::Arc;

use anyhow::Result;

use notes_rag_core::embedding::{EmbeddingGateway, Reranker};
use notes_rag_core::index::VectorIndex;

use crate::config::Config;
use crate::corpus::FsCorpus;
use crate::embedding::create_gateway;
use crate::pipeline::IndexingPipeline;
use crate::rerank::create_reranker;
use crate::retrieve::RetrievalService;
use crate::settings_store::TomlSettingsStore;
use crate::sqlite_index::SqliteIndex;
use crate::state::EngineController;

/// One engine instance: controller, SQLite index, filesystem corpus, and
/// the services built on them.
pub struct Engine {
    pub controller: Arc<EngineController>,
    pub index: Arc<SqliteIndex>,
    pub corpus: Arc<FsCorpus>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub pipeline: Arc<IndexingPipeline>,
    pub retrieval: RetrievalService,
}

impl Engine {
    pub async fn open(config: &Config) -> Result<Self> {
        let gateway = create_gateway(&config.embedding)?;
        Self::open_with_gateway(config, gateway).await
    }

    /// Like [`Engine::open`] with an already-built embedding gateway.
    pub async fn open_with_gateway(
        config: &Config,
        gateway: Arc<dyn EmbeddingGateway>,
    ) -> Result<Self> {
        let reranker = create_reranker(&config.rerank)?;
        let store = Arc::new(TomlSettingsStore::new(&config.settings.path));
        let controller = Arc::new(EngineController::load(store, gateway)?);

        let index = Arc::new(SqliteIndex::open(&config.db.path).await?);
        controller.set_document_count(index.count().await?);
        let corpus = Arc::new(FsCorpus::new(&config.corpus)?);

        let pipeline = Arc::new(IndexingPipeline::new(
            controller.clone(),
            index.clone(),
            corpus.clone(),
        ));
        let retrieval =
            RetrievalService::new(controller.clone(), index.clone()).with_reranker(reranker.clone());

        Ok(Self {
            controller,
            index,
            corpus,
            reranker,
            pipeline,
            retrieval,
        })
    }

    pub async fn close(&self) {
        self.index.pool().close().await;
    }
}
