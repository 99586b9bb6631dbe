//! # notes-rag core
//!
//! Shared logic for the notes-rag engine: data models, the sliding-window
//! chunker, the error taxonomy, collaborator traits (embedding, reranking,
//! keyword extraction, corpus access, settings persistence), the vector
//! index contract with an in-memory implementation, and ranking helpers.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network code.
//! Those live in the `notes-rag` application crate.

pub mod chunk;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod search;
pub mod settings;

pub use error::RagError;
