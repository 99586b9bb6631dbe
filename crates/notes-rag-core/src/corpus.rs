//! Document corpus access.
//!
//! The corpus is owned by the external file/sync layer; the engine only
//! reads it. [`InMemoryCorpus`] backs tests and hosts that keep notes in
//! memory; the filesystem implementation lives in the app crate.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::Document;

/// An eligible document whose content could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct UnreadableDocument {
    pub path: String,
    pub error: String,
}

/// Result of a full corpus scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusScan {
    /// Readable documents, ordered by path.
    pub documents: Vec<Document>,
    /// Documents that exist but could not be read (permissions, invalid
    /// UTF-8). They are still part of the corpus.
    pub unreadable: Vec<UnreadableDocument>,
}

#[async_trait]
pub trait Corpus: Send + Sync {
    /// Every readable document eligible for indexing, ordered by path.
    async fn read_all_documents(&self) -> Result<Vec<Document>>;

    /// Current content of one document.
    async fn read_document(&self, path: &str) -> Result<String>;

    /// Every eligible document, split into readable and unreadable ones.
    async fn scan_documents(&self) -> Result<CorpusScan> {
        Ok(CorpusScan {
            documents: self.read_all_documents().await?,
            unreadable: Vec::new(),
        })
    }
}

/// Path-ordered in-memory corpus.
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    documents: RwLock<BTreeMap<String, Document>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = Document>,
    {
        let corpus = Self::new();
        for doc in documents {
            corpus.insert(doc);
        }
        corpus
    }

    pub fn insert(&self, doc: Document) {
        self.documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(doc.path.clone(), doc);
    }

    pub fn remove(&self, path: &str) -> Option<Document> {
        self.documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(path)
    }
}

#[async_trait]
impl Corpus for InMemoryCorpus {
    async fn read_all_documents(&self) -> Result<Vec<Document>> {
        Ok(self
            .documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect())
    }

    async fn read_document(&self, path: &str) -> Result<String> {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .map(|d| d.content.clone())
            .ok_or_else(|| anyhow!("document not found in corpus: {}", path))
    }
}
