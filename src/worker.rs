//! Background index worker.
//!
//! Document saves are submitted as [`IndexEvent`]s onto a bounded queue and
//! indexed by a single tokio task, in submission order. The queue gives
//! callers explicit backpressure ([`IndexQueue::submit`] waits for space,
//! [`IndexQueue::try_submit`] fails fast) and [`IndexWorker::shutdown`]
//! drains whatever is still queued before returning.
//!
//! ```rust,ignore
//! let (queue, worker) = IndexWorker::spawn(pipeline, 64);
//! queue.submit(IndexEvent::saved("journal/today.md", text)).await?;
//! let stats = worker.shutdown().await?;
//! ```

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use notes_rag_core::RagError;

use crate::pipeline::{DocumentOutcome, IndexingPipeline};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    /// A document was saved with this content. `modified_at` is the
    /// version time in epoch millis.
    Saved {
        path: String,
        content: String,
        modified_at: i64,
    },
    /// A document was deleted from the corpus.
    Deleted { path: String },
}

impl IndexEvent {
    /// A save observed now.
    pub fn saved(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::saved_at(path, content, Utc::now().timestamp_millis())
    }

    /// A save whose version time is known, e.g. a file's modification time.
    pub fn saved_at(path: impl Into<String>, content: impl Into<String>, modified_at: i64) -> Self {
        IndexEvent::Saved {
            path: path.into(),
            content: content.into(),
            modified_at,
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        IndexEvent::Deleted { path: path.into() }
    }

    pub fn path(&self) -> &str {
        match self {
            IndexEvent::Saved { path, .. } | IndexEvent::Deleted { path } => path,
        }
    }
}

/// Counters accumulated by the worker over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub indexed: usize,
    /// Saves ignored because the vector database was off or a newer
    /// version was already indexed.
    pub skipped: usize,
    pub failed: usize,
    pub removed: usize,
}

/// Cloneable submission handle for the worker's queue.
#[derive(Clone)]
pub struct IndexQueue {
    tx: mpsc::Sender<IndexEvent>,
}

impl IndexQueue {
    /// Enqueue an event, waiting for space when the queue is full.
    pub async fn submit(&self, event: IndexEvent) -> Result<(), RagError> {
        self.tx.send(event).await.map_err(|_| RagError::QueueClosed)
    }

    /// Enqueue an event without waiting.
    pub fn try_submit(&self, event: IndexEvent) -> Result<(), RagError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RagError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => RagError::QueueClosed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct IndexWorker {
    shutdown: CancellationToken,
    handle: JoinHandle<WorkerStats>,
}

impl IndexWorker {
    /// Start the worker task with a queue holding at most `capacity` events.
    pub fn spawn(pipeline: Arc<IndexingPipeline>, capacity: usize) -> (IndexQueue, IndexWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(pipeline, rx, shutdown.clone()));
        (IndexQueue { tx }, IndexWorker { shutdown, handle })
    }

    /// Close the queue, process every event already queued, and return the
    /// worker's counters. Later submissions fail with
    /// [`RagError::QueueClosed`].
    pub async fn shutdown(self) -> Result<WorkerStats> {
        self.shutdown.cancel();
        Ok(self.handle.await?)
    }
}

async fn run(
    pipeline: Arc<IndexingPipeline>,
    mut rx: mpsc::Receiver<IndexEvent>,
    shutdown: CancellationToken,
) -> WorkerStats {
    let mut stats = WorkerStats::default();

    loop {
        tokio::select! {
            biased;
            event = rx.recv() => match event {
                Some(event) => handle(&pipeline, event, &mut stats).await,
                None => break,
            },
            _ = shutdown.cancelled() => {
                rx.close();
                let mut drained = 0usize;
                while let Some(event) = rx.recv().await {
                    handle(&pipeline, event, &mut stats).await;
                    drained += 1;
                }
                tracing::debug!(drained, "index queue drained");
                break;
            }
        }
    }

    tracing::info!(
        indexed = stats.indexed,
        skipped = stats.skipped,
        failed = stats.failed,
        removed = stats.removed,
        "index worker stopped"
    );
    stats
}

async fn handle(pipeline: &IndexingPipeline, event: IndexEvent, stats: &mut WorkerStats) {
    tracing::debug!(path = %event.path(), "index event");
    match event {
        IndexEvent::Saved {
            path,
            content,
            modified_at,
        } => {
            match pipeline
                .process_document_version(&path, &content, modified_at)
                .await
            {
                Ok(DocumentOutcome::Indexed { .. }) => stats.indexed += 1,
                Ok(DocumentOutcome::Skipped) | Ok(DocumentOutcome::Stale) => stats.skipped += 1,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "failed to index saved document");
                    stats.failed += 1;
                }
            }
        }
        IndexEvent::Deleted { path } => match pipeline.remove_document(&path).await {
            Ok(true) => stats.removed += 1,
            Ok(false) => stats.skipped += 1,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "failed to remove deleted document");
                stats.failed += 1;
            }
        },
    }
}
