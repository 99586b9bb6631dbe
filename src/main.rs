//! # notes-rag CLI (`nrag`)
//!
//! Command-line interface to the notes-rag engine: database setup, feature
//! toggles, RAG settings, indexing, and retrieval.
//!
//! ## Usage
//!
//! ```bash
//! nrag --config ./config/nrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nrag init` | Create the SQLite database and run schema migrations |
//! | `nrag status` | Show enablement state, settings, and index counts |
//! | `nrag enable vector-db\|rag` | Enable a feature (checks the embedding model) |
//! | `nrag disable vector-db\|rag` | Disable a feature |
//! | `nrag settings show` | Print the current RAG settings |
//! | `nrag settings set ...` | Validate and persist new RAG settings |
//! | `nrag reindex` | Reindex the whole corpus (Ctrl-C cancels) |
//! | `nrag index <path>...` | Index (or drop) individual notes |
//! | `nrag retrieve <terms>...` | Print the context retrieved for the terms |
//!
//! Logs go to stderr; set `RUST_LOG=debug` for per-document detail.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use notes_rag::config;
use notes_rag::engine::Engine;
use notes_rag::migrate;
use notes_rag::pipeline::ReindexOutcome;
use notes_rag::progress::ProgressMode;
use notes_rag::status;
use notes_rag::worker::{IndexEvent, IndexWorker};

/// notes-rag CLI: a local-first RAG engine for personal notes.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/nrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "nrag",
    about = "notes-rag: local-first semantic indexing and retrieval for personal notes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Show engine state, RAG settings, and index counts.
    Status {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Enable a feature.
    ///
    /// Enabling the vector database checks that the embedding model is
    /// reachable; enabling RAG also enables the vector database.
    Enable { feature: Feature },

    /// Disable a feature. Disabling the vector database also disables RAG.
    Disable { feature: Feature },

    /// Show or change RAG settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Reindex every document in the corpus.
    ///
    /// Documents no longer in the corpus are removed from the index.
    /// Ctrl-C stops after the current document.
    Reindex {
        /// Progress output on stderr. Defaults to human when stderr is a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Index individual documents through the background worker.
    ///
    /// Paths that no longer exist are removed from the index.
    Index {
        /// Document paths, absolute or relative to the corpus root.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Retrieve context for query terms.
    Retrieve {
        /// Query terms, joined with spaces.
        #[arg(required = true)]
        terms: Vec<String>,

        /// Show each chunk's path, offsets, and scores instead of the context.
        #[arg(long)]
        explain: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Feature {
    VectorDb,
    Rag,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings.
    Show,

    /// Change one or more settings. Existing index entries are not
    /// reprocessed; run `nrag reindex` to apply new chunking.
    Set {
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
        #[arg(long)]
        result_count: Option<usize>,
        #[arg(long)]
        similarity_threshold: Option<f32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let engine = Engine::open(&cfg).await?;
    let result = run(&engine, &cfg, cli.command).await;
    engine.close().await;
    result
}

async fn run(engine: &Engine, cfg: &config::Config, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {}
        Commands::Status { json } => {
            let report = status::collect_status(engine, &cfg.db.path).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                status::print_status(&report, &cfg.db.path);
            }
        }
        Commands::Enable { feature } => {
            match feature {
                Feature::VectorDb => engine.controller.set_vector_db_enabled(true).await?,
                Feature::Rag => engine.controller.set_rag_enabled(true).await?,
            }
            print_toggles(engine);
        }
        Commands::Disable { feature } => {
            match feature {
                Feature::VectorDb => engine.controller.set_vector_db_enabled(false).await?,
                Feature::Rag => engine.controller.set_rag_enabled(false).await?,
            }
            print_toggles(engine);
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show => status::print_settings(&engine.controller.settings()),
            SettingsAction::Set {
                chunk_size,
                chunk_overlap,
                result_count,
                similarity_threshold,
            } => {
                let mut settings = engine.controller.settings();
                if let Some(v) = chunk_size {
                    settings.chunk_size = v;
                }
                if let Some(v) = chunk_overlap {
                    settings.chunk_overlap = v;
                }
                if let Some(v) = result_count {
                    settings.result_count = v;
                }
                if let Some(v) = similarity_threshold {
                    settings.similarity_threshold = v;
                }
                engine.controller.update_settings(settings).await?;
                status::print_settings(&settings);
            }
        },
        Commands::Reindex { progress } => run_reindex(engine, progress).await?,
        Commands::Index { paths } => run_index(engine, cfg, &paths).await?,
        Commands::Retrieve { terms, explain } => {
            if !engine.controller.is_rag_enabled() {
                eprintln!("RAG is disabled; run `nrag enable rag` first.");
                return Ok(());
            }
            if explain {
                let chunks = engine.retrieval.retrieve_detailed(terms.as_slice()).await;
                if chunks.is_empty() {
                    println!("No chunks above the similarity threshold.");
                }
                for (i, chunk) in chunks.iter().enumerate() {
                    let rerank = chunk
                        .rerank_score
                        .map(|s| format!("  rerank={:.3}", s))
                        .unwrap_or_default();
                    println!(
                        "{}. [{:.3}{}] {} [{}..{})",
                        i + 1,
                        chunk.score,
                        rerank,
                        chunk.document_path,
                        chunk.offset_start,
                        chunk.offset_end
                    );
                    println!("   {}", preview(&chunk.text, 160));
                }
            } else {
                println!("{}", engine.retrieval.retrieve(terms.as_slice()).await);
            }
        }
    }
    Ok(())
}

fn print_toggles(engine: &Engine) {
    let state = engine.controller.snapshot();
    println!("vector db: {}", if state.vector_db_enabled { "enabled" } else { "disabled" });
    println!("rag:       {}", if state.rag_enabled { "enabled" } else { "disabled" });
}

async fn run_reindex(engine: &Engine, progress: Option<ProgressMode>) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current document");
            on_ctrl_c.cancel();
        }
    });

    let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
    let outcome = engine
        .pipeline
        .process_all_documents_with_progress(Some(&cancel), reporter.as_ref())
        .await?;

    match outcome {
        ReindexOutcome::AlreadyRunning => println!("A reindex is already running."),
        ReindexOutcome::Completed(report) => {
            println!("reindex{}", if report.cancelled { " (cancelled)" } else { "" });
            println!("  indexed: {}", report.success);
            println!("  failed:  {}", report.failed);
            println!("  pruned:  {}", report.pruned);
            println!("  documents in index: {}", engine.controller.snapshot().document_count);
        }
    }
    Ok(())
}

async fn run_index(engine: &Engine, cfg: &config::Config, paths: &[PathBuf]) -> Result<()> {
    if !engine.controller.is_vector_db_enabled() {
        bail!("vector database is disabled; run `nrag enable vector-db` first");
    }

    let (queue, worker) = IndexWorker::spawn(engine.pipeline.clone(), cfg.indexing.queue_capacity);

    for path in paths {
        let Some(relative) = engine.corpus.relative_path(path) else {
            eprintln!(
                "skipping {}: outside the corpus root {}",
                path.display(),
                engine.corpus.root().display()
            );
            continue;
        };
        if !engine.corpus.is_eligible(&relative) {
            eprintln!("skipping {}: excluded by corpus globs", relative);
            continue;
        }

        let event = match engine.corpus.read_path(&relative).await? {
            Some(doc) => IndexEvent::saved_at(doc.path, doc.content, doc.modified_at),
            None => IndexEvent::deleted(relative),
        };
        queue.submit(event).await?;
    }
    drop(queue);

    let stats = worker.shutdown().await?;
    println!("index");
    println!("  indexed: {}", stats.indexed);
    println!("  removed: {}", stats.removed);
    println!("  skipped: {}", stats.skipped);
    println!("  failed:  {}", stats.failed);
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
