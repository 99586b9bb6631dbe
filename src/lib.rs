//! # notes-rag
//!
//! A local-first RAG indexing and retrieval engine for a personal notes
//! corpus.
//!
//! notes-rag turns a directory of text notes into a semantic index, keeps
//! that index consistent as notes are saved or deleted, and serves ranked,
//! threshold-filtered context back to a chat pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  save/delete  ┌─────────────┐   ┌────────────────────┐   ┌──────────┐
//! │  Corpus    │──────────────▶│ IndexWorker │──▶│ IndexingPipeline   │──▶│  SQLite  │
//! │ (FsCorpus) │   reindex     └─────────────┘   │ chunk+embed+upsert │   │  index   │
//! └────────────┘──────────────────────────────▶  └────────────────────┘   └────┬─────┘
//!                                                                              │
//!                 ┌─────────────────┐   query terms   ┌──────────────────┐     │
//!                 │ EngineController│◀────────────────│ RetrievalService │◀────┘
//!                 │ state+settings  │                 │ search+rerank    │
//!                 └─────────────────┘                 └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! nrag init                     # create database
//! nrag enable rag               # check the embedding model, enable indexing + RAG
//! nrag reindex                  # index every note
//! nrag retrieve borrow checker --explain
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_index`] | SQLite vector index |
//! | [`embedding`] | Embedding providers |
//! | [`rerank`] | HTTP reranker |
//! | [`settings_store`] | TOML settings persistence |
//! | [`corpus`] | Filesystem corpus |
//! | [`state`] | Engine state controller |
//! | [`pipeline`] | Indexing pipeline and full reindex |
//! | [`worker`] | Background index worker |
//! | [`retrieve`] | Retrieval service |
//! | [`engine`] | Component wiring |
//! | [`progress`] | Reindex progress reporting |
//! | [`status`] | Status overview |

pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod migrate;
pub mod pipeline;
pub mod progress;
pub mod rerank;
pub mod retrieve;
pub mod settings_store;
pub mod sqlite_index;
pub mod state;
pub mod status;
pub mod worker;
