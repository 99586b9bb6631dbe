//! Engine status overview.
//!
//! Summarizes enablement state, RAG settings, and what is indexed. Used by
//! `nrag status` to confirm that reindexing and toggles took effect.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use notes_rag_core::index::VectorIndex;
use notes_rag_core::settings::{EngineState, RagSettings};

use crate::engine::Engine;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: EngineState,
    pub settings: RagSettings,
    pub embedding_model: String,
    pub reranker: Option<String>,
    pub indexed_documents: usize,
    pub indexed_chunks: usize,
    pub db_size_bytes: u64,
}

pub async fn collect_status(engine: &Engine, db_path: &Path) -> Result<StatusReport> {
    let mut state = engine.controller.snapshot();
    let indexed_documents = engine.index.count().await?;
    state.document_count = indexed_documents;

    Ok(StatusReport {
        state,
        settings: engine.controller.settings(),
        embedding_model: engine.controller.gateway().model_name().to_string(),
        reranker: engine.reranker.as_ref().map(|r| r.model_name().to_string()),
        indexed_documents,
        indexed_chunks: engine.index.entry_count().await?,
        db_size_bytes: std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0),
    })
}

pub fn print_status(report: &StatusReport, db_path: &Path) {
    let on_off = |b: bool| if b { "enabled" } else { "disabled" };

    println!("notes-rag status");
    println!("================");
    println!();
    println!("  Vector DB:   {}", on_off(report.state.vector_db_enabled));
    println!("  RAG:         {}", on_off(report.state.rag_enabled));
    println!("  Model:       {}", report.embedding_model);
    println!(
        "  Reranker:    {}",
        report.reranker.as_deref().unwrap_or("none")
    );
    println!(
        "  Last index:  {}",
        report
            .state
            .last_process_time
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(report.db_size_bytes));
    println!("  Documents:   {}", report.indexed_documents);
    println!("  Chunks:      {}", report.indexed_chunks);
    println!();
    print_settings(&report.settings);
}

pub fn print_settings(settings: &RagSettings) {
    println!("  Chunk size:           {}", settings.chunk_size);
    println!("  Chunk overlap:        {}", settings.chunk_overlap);
    println!("  Result count:         {}", settings.result_count);
    println!("  Similarity threshold: {}", settings.similarity_threshold);
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format an epoch-millis timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts_millis: i64) -> String {
    let delta = (chrono::Utc::now().timestamp_millis() - ts_millis) / 1000;

    if delta < 0 {
        format_ts_iso(ts_millis)
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts_millis)
    }
}

fn format_ts_iso(ts_millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts_millis.to_string())
}
