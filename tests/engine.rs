//! End-to-end tests of the engine over in-memory collaborators: reindexing,
//! retrieval, state transitions, pruning, cancellation, and reranking.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{abc_corpus, enabled, harness, letter_histogram, LetterGateway, ScriptedReranker, WordExtractor};
use notes_rag::pipeline::{ReindexOutcome, ReindexReport};
use notes_rag::retrieve::RetrievalService;
use notes_rag_core::embedding::Reranker;
use notes_rag_core::index::VectorIndex;
use notes_rag_core::models::{Chunk, Document, IndexEntry};
use notes_rag_core::settings::{PersistedSettings, RagSettings};
use notes_rag_core::RagError;

async fn retrieved_paths(service: &RetrievalService) -> Vec<String> {
    service
        .retrieve_detailed(&["aaaa"])
        .await
        .into_iter()
        .map(|c| c.document_path)
        .collect()
}

fn completed(outcome: ReindexOutcome) -> ReindexReport {
    match outcome {
        ReindexOutcome::Completed(report) => report,
        ReindexOutcome::AlreadyRunning => panic!("expected a completed reindex"),
    }
}

#[tokio::test]
async fn test_reindex_three_documents_and_search() {
    let h = harness(enabled(), LetterGateway::new(), abc_corpus());

    let report = completed(h.pipeline.process_all_documents(None).await.unwrap());
    assert_eq!(report.success, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.pruned, 0);
    assert!(!report.cancelled);

    // a.md (1800 chars) → 2 chunks, b.md → 1, c.md → 1 empty chunk
    assert_eq!(h.index.entry_count().unwrap(), 4);
    assert_eq!(h.index.count().await.unwrap(), 3);
    let c_entries = h.index.entries_for("c.md").unwrap();
    assert_eq!(c_entries.len(), 1);
    assert_eq!(c_entries[0].text, "");

    let hits = h.index.search(&letter_histogram("aaaa"), 10).await.unwrap();
    assert_eq!(hits.len(), 4);
    assert_eq!(hits[0].entry.document_path, "a.md");
    assert_eq!(hits[0].entry.chunk_id.offset_start, 0);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    let rank_of = |path: &str| hits.iter().position(|h| h.entry.document_path == path).unwrap();
    assert!(rank_of("b.md") > 0);
    assert!(rank_of("c.md") > 0);

    let state = h.controller.snapshot();
    assert_eq!(state.document_count, 3);
    assert!(!state.is_processing);
    assert!(state.last_process_time.is_some());
    assert_eq!(h.store.saved().unwrap().last_process_time, state.last_process_time);
}

#[tokio::test]
async fn test_retrieve_returns_best_chunk() {
    let h = harness(enabled(), LetterGateway::new(), abc_corpus());
    h.pipeline.process_all_documents(None).await.unwrap();

    // Only a.md's first chunk clears the default 0.7 threshold.
    let context = h.retrieval.retrieve(&["aa", "aa"]).await;
    assert_eq!(context, "a".repeat(1000));

    let detailed = h.retrieval.retrieve_detailed(&["aaaa"]).await;
    assert_eq!(detailed.len(), 1);
    assert_eq!(detailed[0].offset_start, 0);
    assert_eq!(detailed[0].offset_end, 1000);
    assert!(detailed[0].rerank_score.is_none());
}

#[tokio::test]
async fn test_threshold_filters_everything() {
    let h = harness(enabled(), LetterGateway::new(), vec![]);
    h.controller
        .update_settings(RagSettings {
            result_count: 5,
            similarity_threshold: 0.9,
            ..RagSettings::default()
        })
        .await
        .unwrap();

    // Five entries at cosine 0.5 from the query (1, 0, ...).
    let mut vector = vec![0.0f32; 26];
    vector[0] = 0.5;
    vector[1] = 0.75f32.sqrt();
    for i in 0..5 {
        let path = format!("note{i}.md");
        let entry = IndexEntry::from_chunk(
            Chunk {
                document_path: path.clone(),
                offset_start: 0,
                offset_end: 4,
                text: format!("note {i}"),
            },
            vector.clone(),
            1,
        );
        h.index.upsert_document(&path, vec![entry]).await.unwrap();
    }

    let hits = h.index.search(&letter_histogram("a"), 5).await.unwrap();
    assert_eq!(hits.len(), 5);
    assert!(hits.iter().all(|hit| (hit.score - 0.5).abs() < 1e-5));

    assert_eq!(h.retrieval.retrieve(&["a"]).await, "");

    h.controller
        .update_settings(RagSettings {
            result_count: 5,
            similarity_threshold: 0.5 - 1e-4,
            ..RagSettings::default()
        })
        .await
        .unwrap();
    let context = h.retrieval.retrieve(&["a"]).await;
    assert_eq!(context.split("\n\n").count(), 5);
}

#[tokio::test]
async fn test_retrieve_with_rag_disabled_makes_no_calls() {
    let persisted = PersistedSettings {
        vector_db_enabled: true,
        rag_enabled: false,
        ..PersistedSettings::default()
    };
    let h = harness(persisted, LetterGateway::new(), abc_corpus());
    h.pipeline.process_all_documents(None).await.unwrap();
    let embeds_before = h.gateway.embed_calls();
    let checks_before = h.gateway.checks();

    assert_eq!(h.retrieval.retrieve(&["aaaa"]).await, "");
    assert!(h.retrieval.retrieve_detailed(&["aaaa"]).await.is_empty());
    let extractor = WordExtractor::new();
    assert_eq!(h.retrieval.retrieve_for_message("aaaa bbbb", &extractor, 5).await, "");

    assert_eq!(h.gateway.embed_calls(), embeds_before);
    assert_eq!(h.gateway.checks(), checks_before);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_retrieve_degrades_to_empty_on_embed_failure() {
    let h = harness(enabled(), LetterGateway::new(), abc_corpus());
    h.pipeline.process_all_documents(None).await.unwrap();

    h.gateway.available.store(false, Ordering::SeqCst);
    assert_eq!(h.retrieval.retrieve(&["aaaa"]).await, "");
}

#[tokio::test]
async fn test_retrieve_for_message_uses_keywords() {
    let h = harness(enabled(), LetterGateway::new(), abc_corpus());
    h.pipeline.process_all_documents(None).await.unwrap();

    let extractor = WordExtractor::new();
    let context = h
        .retrieval
        .retrieve_for_message("tell me about aaaaaa and a", &extractor, 3)
        .await;
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(context, "a".repeat(1000));
}

#[tokio::test]
async fn test_reindex_while_processing_is_noop() {
    let h = harness(enabled(), LetterGateway::gated(), abc_corpus());

    let first = h.pipeline.spawn_reindex(CancellationToken::new());
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.gateway.embed_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first reindex never started embedding");
    assert!(h.controller.snapshot().is_processing);

    let second = tokio::time::timeout(Duration::from_secs(5), h.pipeline.process_all_documents(None))
        .await
        .expect("second reindex blocked")
        .unwrap();
    assert_eq!(second, ReindexOutcome::AlreadyRunning);
    let state = h.controller.snapshot();
    assert_eq!(state.document_count, 0);
    assert!(state.is_processing);
    assert!(state.last_process_time.is_none());

    h.gateway.open_gate();
    let report = completed(first.await.unwrap().unwrap());
    assert_eq!(report.success, 3);
    assert_eq!(report.failed, 0);
    let state = h.controller.snapshot();
    assert!(!state.is_processing);
    assert_eq!(state.document_count, 3);
}

#[tokio::test]
async fn test_save_during_reindex_beats_older_file_version() {
    let docs = vec![
        Document {
            modified_at: 1_000,
            ..Document::new("a.md", "aaa")
        },
        Document {
            modified_at: 1_000,
            ..Document::new("b.md", "old")
        },
    ];
    let h = harness(enabled(), LetterGateway::gated(), docs);

    let reindex = h.pipeline.spawn_reindex(CancellationToken::new());
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.gateway.embed_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("reindex never started embedding");

    // The reindex is parked on a.md; b.md is saved before it gets there.
    let pipeline = h.pipeline.clone();
    let save = tokio::spawn(async move { pipeline.process_document("b.md", "new").await });
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.gateway.embed_calls() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("save never started embedding");

    h.gateway.open_gate();
    save.await.unwrap().unwrap();
    let report = completed(reindex.await.unwrap().unwrap());
    assert_eq!(report.success, 2);

    let entries = h.index.entries_for("b.md").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].text, "new");
}

#[tokio::test]
async fn test_reindex_with_unavailable_model_fails_without_processing() {
    let h = harness(enabled(), LetterGateway::unavailable(), abc_corpus());

    let err = h.pipeline.process_all_documents(None).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RagError>(),
        Some(RagError::ModelUnavailable(_))
    ));
    let state = h.controller.snapshot();
    assert!(!state.is_processing);
    assert!(state.last_process_time.is_none());
    assert_eq!(h.gateway.embed_calls(), 0);
}

#[tokio::test]
async fn test_reindex_prunes_documents_missing_from_corpus() {
    let h = harness(enabled(), LetterGateway::new(), abc_corpus());
    h.pipeline.process_all_documents(None).await.unwrap();

    h.corpus.remove("b.md");
    let report = completed(h.pipeline.process_all_documents(None).await.unwrap());
    assert_eq!(report.success, 2);
    assert_eq!(report.pruned, 1);
    assert_eq!(h.index.document_paths().await.unwrap(), vec!["a.md", "c.md"]);
    assert_eq!(h.controller.snapshot().document_count, 2);
}

#[tokio::test]
async fn test_cancelled_reindex_stops_and_skips_pruning() {
    let cancel = CancellationToken::new();
    let gateway = LetterGateway {
        cancel_after_first: Some(cancel.clone()),
        ..LetterGateway::new()
    };
    let h = harness(enabled(), gateway, abc_corpus());
    h.index
        .upsert_document(
            "gone.md",
            vec![IndexEntry::from_chunk(
                Chunk {
                    document_path: "gone.md".to_string(),
                    offset_start: 0,
                    offset_end: 1,
                    text: "g".to_string(),
                },
                letter_histogram("g"),
                1,
            )],
        )
        .await
        .unwrap();

    let report = completed(h.pipeline.process_all_documents(Some(&cancel)).await.unwrap());
    assert!(report.cancelled);
    assert_eq!(report.success, 1);
    assert_eq!(report.pruned, 0);
    assert_eq!(h.index.document_paths().await.unwrap(), vec!["a.md", "gone.md"]);

    let state = h.controller.snapshot();
    assert!(!state.is_processing);
    assert!(state.last_process_time.is_some());
}

#[tokio::test]
async fn test_upsert_then_search_never_returns_old_version() {
    let h = harness(enabled(), LetterGateway::new(), vec![]);
    h.pipeline
        .process_document("a.md", &"a".repeat(1500))
        .await
        .unwrap();
    h.pipeline.process_document("a.md", "abc").await.unwrap();

    let hits = h.index.search(&letter_histogram("a"), 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.text, "abc");
}

#[tokio::test]
async fn test_settings_change_applies_to_next_reindex() {
    let h = harness(enabled(), LetterGateway::new(), abc_corpus());
    h.pipeline.process_all_documents(None).await.unwrap();
    assert_eq!(h.index.entries_for("a.md").unwrap().len(), 2);

    h.controller
        .update_settings(RagSettings {
            chunk_size: 500,
            chunk_overlap: 100,
            ..RagSettings::default()
        })
        .await
        .unwrap();
    // Changing settings alone never reprocesses.
    assert_eq!(h.index.entries_for("a.md").unwrap().len(), 2);

    h.pipeline.process_all_documents(None).await.unwrap();
    // ⌈(1800 − 100) / 400⌉ = 5
    assert_eq!(h.index.entries_for("a.md").unwrap().len(), 5);
}

#[tokio::test]
async fn test_state_transitions() {
    let h = harness(PersistedSettings::default(), LetterGateway::unavailable(), vec![]);

    // Enabling RAG with the model down leaves both flags unchanged.
    assert!(matches!(
        h.controller.set_rag_enabled(true).await,
        Err(RagError::ModelUnavailable(_))
    ));
    let state = h.controller.snapshot();
    assert!(!state.vector_db_enabled && !state.rag_enabled);

    h.gateway.available.store(true, Ordering::SeqCst);
    h.controller.set_rag_enabled(true).await.unwrap();
    let state = h.controller.snapshot();
    assert!(state.vector_db_enabled && state.rag_enabled);

    h.controller.set_vector_db_enabled(false).await.unwrap();
    let state = h.controller.snapshot();
    assert!(!state.vector_db_enabled && !state.rag_enabled);

    let saved = h.store.saved().unwrap();
    assert!(!saved.vector_db_enabled && !saved.rag_enabled);
}

#[tokio::test]
async fn test_concurrent_toggles_keep_invariant() {
    let h = harness(PersistedSettings::default(), LetterGateway::new(), vec![]);
    let controller = h.controller.clone();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let controller = controller.clone();
        tasks.push(tokio::spawn(async move {
            match i % 3 {
                0 => controller.set_rag_enabled(true).await,
                1 => controller.set_vector_db_enabled(false).await,
                _ => controller.set_rag_enabled(false).await,
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
        let state = controller.snapshot();
        assert!(!state.rag_enabled || state.vector_db_enabled);
    }
}

#[tokio::test]
async fn test_reranker_reorders_and_falls_back() {
    let docs = vec![
        Document::new("plain.md", "a".repeat(40)),
        Document::new("zesty.md", format!("{}{}", "a".repeat(30), "z".repeat(10))),
    ];
    let h = harness(enabled(), LetterGateway::new(), docs);
    h.controller
        .update_settings(RagSettings {
            similarity_threshold: 0.5,
            ..RagSettings::default()
        })
        .await
        .unwrap();
    h.pipeline.process_all_documents(None).await.unwrap();

    // Similarity order: plain.md is closer to "aaaa".
    assert_eq!(retrieved_paths(&h.retrieval).await, vec!["plain.md", "zesty.md"]);

    let working = Arc::new(ScriptedReranker::new(true, false));
    let reranked = RetrievalService::new(h.controller.clone(), h.index.clone())
        .with_reranker(Some(working.clone() as Arc<dyn Reranker>));
    assert_eq!(retrieved_paths(&reranked).await, vec!["zesty.md", "plain.md"]);
    assert_eq!(working.calls.load(Ordering::SeqCst), 1);

    let failing = Arc::new(ScriptedReranker::new(true, true));
    let fallback = RetrievalService::new(h.controller.clone(), h.index.clone())
        .with_reranker(Some(failing.clone() as Arc<dyn Reranker>));
    assert_eq!(retrieved_paths(&fallback).await, vec!["plain.md", "zesty.md"]);
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);

    let offline = Arc::new(ScriptedReranker::new(false, false));
    let skipped = RetrievalService::new(h.controller.clone(), h.index.clone())
        .with_reranker(Some(offline.clone() as Arc<dyn Reranker>));
    assert_eq!(retrieved_paths(&skipped).await, vec!["plain.md", "zesty.md"]);
    assert_eq!(offline.calls.load(Ordering::SeqCst), 0);
}
