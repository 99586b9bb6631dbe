//! Engine state controller.
//!
//! [`EngineController`] is the single owner of [`EngineState`] and
//! [`RagSettings`]. The indexing pipeline and retrieval service hold it
//! through an `Arc` and read snapshots; every mutation goes through the
//! methods below, which keep `rag_enabled ⇒ vector_db_enabled` and persist
//! the new values before returning.
//!
//! # State Machine
//!
//! ```text
//!            set_vector_db_enabled(true) [model available]
//!   ┌──────────┐ ─────────────────────────▶ ┌───────────┐  set_rag_enabled(true)  ┌───────────────┐
//!   │ disabled │                            │ vector db │ ──────────────────────▶ │ vector db+rag │
//!   └──────────┘ ◀───────────────────────── └───────────┘ ◀────────────────────── └───────────────┘
//!            set_vector_db_enabled(false)            set_rag_enabled(false)
//! ```
//!
//! `set_rag_enabled(true)` from `disabled` cascades through the availability
//! check; `set_vector_db_enabled(false)` from any state lands in `disabled`.
//! Transitions are serialized, so an availability check never interleaves
//! with another toggle.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;

use notes_rag_core::embedding::EmbeddingGateway;
use notes_rag_core::settings::{EngineState, PersistedSettings, RagSettings, SettingsStore};
use notes_rag_core::RagError;

struct Inner {
    state: EngineState,
    settings: RagSettings,
}

pub struct EngineController {
    inner: Mutex<Inner>,
    transition: tokio::sync::Mutex<()>,
    store: Arc<dyn SettingsStore>,
    gateway: Arc<dyn EmbeddingGateway>,
}

impl EngineController {
    /// Build the controller from persisted settings.
    ///
    /// Absent keys default; persisted RAG settings that fail validation are
    /// replaced by defaults with a warning.
    pub fn load(store: Arc<dyn SettingsStore>, gateway: Arc<dyn EmbeddingGateway>) -> Result<Self> {
        let persisted = store.load()?;
        let settings = match persisted.rag_settings() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "persisted RAG settings are invalid, using defaults");
                RagSettings::default()
            }
        };
        let state = persisted.engine_state();
        if persisted.rag_enabled && !state.rag_enabled {
            tracing::warn!("RAG was persisted as enabled without the vector database; disabling RAG");
        }

        Ok(Self {
            inner: Mutex::new(Inner { state, settings }),
            transition: tokio::sync::Mutex::new(()),
            store,
            gateway,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> EngineState {
        self.lock().state.clone()
    }

    pub fn settings(&self) -> RagSettings {
        self.lock().settings
    }

    pub fn is_vector_db_enabled(&self) -> bool {
        self.lock().state.vector_db_enabled
    }

    pub fn is_rag_enabled(&self) -> bool {
        self.lock().state.rag_enabled
    }

    pub fn gateway(&self) -> &Arc<dyn EmbeddingGateway> {
        &self.gateway
    }

    /// Apply `change` to a copy of the current values, persist it, and only
    /// then publish it. A failed save leaves the published values untouched.
    fn commit<F>(&self, change: F) -> Result<(), RagError>
    where
        F: FnOnce(&mut EngineState, &mut RagSettings),
    {
        let mut inner = self.lock();
        let mut state = inner.state.clone();
        let mut settings = inner.settings;
        change(&mut state, &mut settings);
        if !state.vector_db_enabled {
            state.rag_enabled = false;
        }

        self.store
            .save(&PersistedSettings::from_parts(&settings, &state))
            .map_err(|e| RagError::Storage(format!("{e:#}")))?;

        inner.state = state;
        inner.settings = settings;
        Ok(())
    }

    async fn ensure_model_available(&self) -> Result<(), RagError> {
        if self.gateway.is_available().await {
            Ok(())
        } else {
            Err(RagError::ModelUnavailable(format!(
                "embedding model '{}' is not available",
                self.gateway.model_name()
            )))
        }
    }

    /// Enable or disable the vector database.
    ///
    /// Enabling checks the embedding gateway first and fails with
    /// [`RagError::ModelUnavailable`] without changing state. Disabling also
    /// disables RAG.
    pub async fn set_vector_db_enabled(&self, enabled: bool) -> Result<(), RagError> {
        let _transition = self.transition.lock().await;

        if enabled {
            if self.is_vector_db_enabled() {
                return Ok(());
            }
            self.ensure_model_available().await?;
            self.commit(|state, _| state.vector_db_enabled = true)?;
            tracing::info!(model = self.gateway.model_name(), "vector database enabled");
        } else {
            self.commit(|state, _| {
                state.vector_db_enabled = false;
                state.rag_enabled = false;
            })?;
            tracing::info!("vector database disabled");
        }
        Ok(())
    }

    /// Enable or disable RAG.
    ///
    /// Enabling RAG while the vector database is off enables it too; if that
    /// fails, both flags keep their prior values.
    pub async fn set_rag_enabled(&self, enabled: bool) -> Result<(), RagError> {
        let _transition = self.transition.lock().await;

        if enabled {
            if !self.is_vector_db_enabled() {
                self.ensure_model_available().await?;
            }
            self.commit(|state, _| {
                state.vector_db_enabled = true;
                state.rag_enabled = true;
            })?;
            tracing::info!("RAG enabled");
        } else {
            self.commit(|state, _| state.rag_enabled = false)?;
            tracing::info!("RAG disabled");
        }
        Ok(())
    }

    /// Validate and persist new RAG settings. Existing index entries are not
    /// reprocessed; new chunking applies from the next indexing call.
    pub async fn update_settings(&self, settings: RagSettings) -> Result<(), RagError> {
        settings.validate()?;
        let _transition = self.transition.lock().await;
        self.commit(|_, current| *current = settings)?;
        tracing::info!(
            chunk_size = settings.chunk_size,
            chunk_overlap = settings.chunk_overlap,
            result_count = settings.result_count,
            similarity_threshold = settings.similarity_threshold,
            "RAG settings updated"
        );
        Ok(())
    }

    /// Mark a full reindex as running. Returns `None` when one already is.
    pub fn try_begin_processing(&self) -> Option<ProcessingGuard<'_>> {
        let mut inner = self.lock();
        if inner.state.is_processing {
            return None;
        }
        inner.state.is_processing = true;
        Some(ProcessingGuard { controller: self })
    }

    pub fn set_document_count(&self, count: usize) {
        self.lock().state.document_count = count;
    }

    /// Record the end of a full reindex: stamp and persist
    /// `last_process_time` and store the indexed document count.
    ///
    /// A failed save is logged; the in-memory stamp is kept either way.
    pub fn record_process_completed(&self, document_count: usize) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut inner = self.lock();
        inner.state.last_process_time = Some(now);
        inner.state.document_count = document_count;
        if let Err(e) = self
            .store
            .save(&PersistedSettings::from_parts(&inner.settings, &inner.state))
        {
            tracing::warn!(error = %e, "failed to persist last process time");
        }
        now
    }
}

/// Holds `is_processing` for the lifetime of a full reindex.
pub struct ProcessingGuard<'a> {
    controller: &'a EngineController,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.controller.lock().state.is_processing = false;
    }
}
