mod common;

use common::{Harness, ScriptedGenerator};
use memory_coordinator::{
    memory::{GetContextOptions, MemoryParams, SummaryLanguage},
    memory_db::MemoryStatus,
    Config, MemoryError,
};

fn params(n: u32) -> Option<MemoryParams> {
    Some(MemoryParams::default().with_summary_every_n(n))
}

// ===== Idempotence =====

#[tokio::test]
async fn test_repeated_push_returns_same_entry() {
    let h = Harness::new();
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", params(10)).unwrap();
    let turn = h.blob("chat/t1.json", r#"[{"role": "user", "content": "I live in Lisbon"}]"#).await;

    let first = coordinator.push_message(&memory_id, "chat", &turn, None, None).await.unwrap();
    let second = coordinator.push_message(&memory_id, "chat", &turn, None, None).await.unwrap();

    assert!(first.inserted);
    assert!(!second.inserted);
    assert_eq!(first.entry.uid, second.entry.uid);

    let progress = h.system.database.progress.get(&memory_id).unwrap().unwrap();
    assert_eq!(progress.total_qa_count, 1);
    assert_eq!(progress.recent_qa_count, 1);

    let refs = coordinator
        .get_context(&memory_id, "chat", "where do I live", &GetContextOptions::default())
        .await
        .unwrap();
    assert_eq!(refs.retrieved.len(), 1, "re-push must not duplicate recall records");
}

// ===== Summarization trigger =====

#[tokio::test]
async fn test_third_push_triggers_summary() {
    let h = Harness::new();
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", params(3)).unwrap();

    for i in 1..=3 {
        let turn = h.blob(&format!("chat/t{}.json", i), &format!("turn number {}", i)).await;
        let outcome = coordinator.push_message(&memory_id, "chat", &turn, None, None).await.unwrap();
        let progress = h.system.database.progress.get(&memory_id).unwrap().unwrap();
        if i < 3 {
            assert!(outcome.summary_ref.is_none());
            assert_eq!(progress.summary_version, 0);
            assert_eq!(progress.recent_qa_count, i);
        } else {
            assert!(outcome.summary_ref.is_some());
            assert_eq!(progress.summary_version, 1);
            assert_eq!(progress.recent_qa_count, 0);
        }
    }
}

#[tokio::test]
async fn test_watermark_tracks_total_and_never_decreases() {
    let h = Harness::new();
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", params(2)).unwrap();

    let mut last_index = 0;
    for i in 1..=7 {
        let turn = h.blob(&format!("chat/w{}.json", i), &format!("fact {}", i)).await;
        let outcome = coordinator.push_message(&memory_id, "chat", &turn, None, None).await.unwrap();
        let progress = h.system.database.progress.get(&memory_id).unwrap().unwrap();

        assert!(progress.last_summary_index >= last_index);
        if outcome.summary_ref.is_some() {
            assert_eq!(progress.last_summary_index, progress.total_qa_count);
        }
        last_index = progress.last_summary_index;
    }

    let progress = h.system.database.progress.get(&memory_id).unwrap().unwrap();
    assert_eq!(progress.summary_version, 3);
    assert_eq!(progress.last_summary_index, 6);
    assert_eq!(progress.recent_qa_count, 1);
}

#[tokio::test]
async fn test_failed_summary_is_retried_on_next_push() {
    let h = Harness::with_generator(ScriptedGenerator::failing_first(1), Config::default());
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", params(1)).unwrap();

    let a = h.blob("chat/a.json", "first").await;
    let err = coordinator.push_message(&memory_id, "chat", &a, None, None).await.unwrap_err();
    assert!(matches!(err, MemoryError::Generation(_)));

    let progress = h.system.database.progress.get(&memory_id).unwrap().unwrap();
    assert_eq!(progress.total_qa_count, 1, "append is not rolled back");
    assert_eq!(progress.summary_version, 0);

    let b = h.blob("chat/b.json", "second").await;
    let outcome = coordinator.push_message(&memory_id, "chat", &b, None, None).await.unwrap();
    assert!(outcome.summary_ref.is_some());
    assert!(h.generator.prompts()[0].contains("first\n\n---\n\nsecond"));
}

#[tokio::test]
async fn test_safe_push_retries_transient_failures() {
    let h = Harness::with_generator(ScriptedGenerator::failing_first(2), Config::default());
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", params(1)).unwrap();
    let turn = h.blob("chat/a.json", "hello").await;

    let outcome = coordinator.safe_push(&memory_id, "chat", &turn, None, None).await.unwrap();
    assert!(!outcome.inserted, "the first failed attempt already appended the entry");
    assert!(outcome.summary_ref.is_some());
    assert_eq!(outcome.aux_ids.len(), 1);

    let progress = h.system.database.progress.get(&memory_id).unwrap().unwrap();
    assert_eq!(progress.total_qa_count, 1);
    assert_eq!(progress.summary_version, 1);
}

#[tokio::test]
async fn test_safe_push_gives_up_after_configured_attempts() {
    let h = Harness::with_generator(ScriptedGenerator::failing_first(10), Config::default());
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", params(1)).unwrap();
    let turn = h.blob("chat/a.json", "hello").await;

    let err = coordinator.safe_push(&memory_id, "chat", &turn, None, None).await.unwrap_err();
    assert!(matches!(err, MemoryError::Generation(_)));
}

// ===== Deletes and clears =====

#[tokio::test]
async fn test_deleted_turn_leaves_recent_refs_and_recall() {
    let h = Harness::new();
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", params(10)).unwrap();
    let keep = h.blob("chat/keep.json", "the cat is named Miso").await;
    let drop = h.blob("chat/drop.json", "my bank pin is secret").await;
    coordinator.push_message(&memory_id, "chat", &keep, None, None).await.unwrap();
    coordinator.push_message(&memory_id, "chat", &drop, None, None).await.unwrap();

    let removed = coordinator.delete_message(&memory_id, "chat", &drop).await.unwrap();
    assert_eq!(removed, 1);

    let refs = coordinator
        .get_context(&memory_id, "chat", "bank pin secret", &GetContextOptions::default())
        .await
        .unwrap();
    assert_eq!(refs.recent_refs, vec![keep.clone()]);
    assert!(refs.retrieved.iter().all(|hit| hit.content_ref != drop));

    let entries = h.system.database.contexts.list_recent(&memory_id, 10, 0).unwrap();
    assert_eq!(entries.len(), 2, "the log row survives the delete");

    let again = coordinator.push_message(&memory_id, "chat", &drop, None, None).await.unwrap();
    assert!(again.aux_ids.is_empty(), "tombstoned turns are not re-indexed");
}

#[tokio::test]
async fn test_clear_only_drops_recall() {
    let h = Harness::new();
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", params(10)).unwrap();
    let turn = h.blob("chat/a.json", r#"{"qa": [{"role": "user", "content": "q"}, {"role": "assistant", "content": "a"}]}"#).await;
    coordinator.push_message(&memory_id, "chat", &turn, None, None).await.unwrap();

    assert_eq!(coordinator.clear_memory(&memory_id, "chat").await.unwrap(), 2);

    let refs = coordinator
        .get_context(&memory_id, "chat", "q", &GetContextOptions::default())
        .await
        .unwrap();
    assert!(refs.retrieved.is_empty());
    assert_eq!(refs.recent_refs, vec![turn]);
}

// ===== Recall filtering =====

#[tokio::test]
async fn test_recall_threshold_excludes_weak_matches() {
    let h = Harness::new();
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", params(10)).unwrap();
    let strong = h.blob("chat/s.json", "favorite color is green").await;
    let weak = h.blob("chat/w.json", "train schedule to porto tomorrow").await;
    coordinator.push_message(&memory_id, "chat", &strong, None, None).await.unwrap();
    coordinator.push_message(&memory_id, "chat", &weak, None, None).await.unwrap();

    let loose = coordinator
        .get_context(&memory_id, "chat", "favorite color is green", &GetContextOptions::default())
        .await
        .unwrap();
    assert_eq!(loose.retrieved.len(), 2);

    let options = GetContextOptions { aux_threshold: Some(0.95), ..Default::default() };
    let strict = coordinator
        .get_context(&memory_id, "chat", "favorite color is green", &options)
        .await
        .unwrap();
    assert_eq!(strict.retrieved.len(), 1);
    assert_eq!(strict.retrieved[0].content_ref, strong);
    assert!(strict.retrieved.iter().all(|hit| hit.score >= 0.95));
}

#[tokio::test]
async fn test_default_recall_depth_is_independent_of_space_params() {
    let h = Harness::new();
    let coordinator = &h.system.coordinator;
    let params = MemoryParams { aux_top_k: 1, ..MemoryParams::default().with_summary_every_n(10) };
    let memory_id = coordinator.create_memory("chat", Some(params)).unwrap();
    for i in 1..=4 {
        let turn = h.blob(&format!("chat/tea{}.json", i), &format!("I drink green tea number {}", i)).await;
        coordinator.push_message(&memory_id, "chat", &turn, None, None).await.unwrap();
    }

    let refs = coordinator
        .get_context(&memory_id, "chat", "green tea", &GetContextOptions::default())
        .await
        .unwrap();
    assert_eq!(refs.retrieved.len(), 4);

    let options = GetContextOptions { aux_top_k: None, ..Default::default() };
    let refs = coordinator.get_context(&memory_id, "chat", "green tea", &options).await.unwrap();
    assert_eq!(refs.retrieved.len(), 1, "unset depth falls back to the space's aux_top_k");
}

#[tokio::test]
async fn test_unbounded_recent_k_is_accepted() {
    let h = Harness::new();
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", params(10)).unwrap();
    let a = h.blob("chat/a.json", "first").await;
    let b = h.blob("chat/b.json", "second").await;
    coordinator.push_message(&memory_id, "chat", &a, None, None).await.unwrap();
    coordinator.push_message(&memory_id, "chat", &b, None, None).await.unwrap();

    let options = GetContextOptions { recent_k: usize::MAX, ..Default::default() };
    let refs = coordinator.get_context(&memory_id, "chat", "first", &options).await.unwrap();
    assert_eq!(refs.recent_refs, vec![b, a]);
}

// ===== Concurrency =====

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_pushes_summarize_once() {
    let h = Harness::new();
    let memory_id = h.system.coordinator.create_memory("chat", params(2)).unwrap();
    let first = h.blob("chat/a.json", "first").await;
    h.system.coordinator.push_message(&memory_id, "chat", &first, None, None).await.unwrap();

    let mut tasks = Vec::new();
    for name in ["b", "c"] {
        let coordinator = h.system.coordinator.clone();
        let memory_id = memory_id.clone();
        let turn = h.blob(&format!("chat/{}.json", name), name).await;
        tasks.push(tokio::spawn(async move {
            coordinator.push_message(&memory_id, "chat", &turn, None, None).await
        }));
    }
    let mut summaries = 0;
    for task in tasks {
        if task.await.unwrap().unwrap().summary_ref.is_some() {
            summaries += 1;
        }
    }

    assert_eq!(summaries, 1);
    assert_eq!(h.generator.prompts().len(), 1);
    let progress = h.system.database.progress.get(&memory_id).unwrap().unwrap();
    assert_eq!(progress.summary_version, 1);
    assert_eq!(progress.total_qa_count, 3);
    assert_eq!(progress.recent_qa_count, 1);
    assert_eq!(progress.last_summary_index, 2);
}

// ===== Space checks =====

#[tokio::test]
async fn test_unknown_space_and_foreign_app_are_not_found() {
    let h = Harness::new();
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", None).unwrap();

    let err = coordinator
        .get_context("chat_000000000000", "chat", "q", &GetContextOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));

    let err = coordinator.push_message(&memory_id, "notes", "x", None, None).await.unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}

#[tokio::test]
async fn test_archived_space_rejects_writes_but_serves_reads() {
    let h = Harness::new();
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", None).unwrap();
    let turn = h.blob("chat/a.json", "hello").await;
    coordinator.push_message(&memory_id, "chat", &turn, None, None).await.unwrap();

    h.system.database.registry.set_status(&memory_id, MemoryStatus::Archived).unwrap();

    let err = coordinator.push_message(&memory_id, "chat", &turn, None, None).await.unwrap_err();
    assert!(matches!(err, MemoryError::Inactive { .. }));
    let err = coordinator.delete_message(&memory_id, "chat", &turn).await.unwrap_err();
    assert!(matches!(err, MemoryError::Inactive { .. }));

    let refs = coordinator
        .get_context(&memory_id, "chat", "hello", &GetContextOptions::default())
        .await
        .unwrap();
    assert_eq!(refs.recent_refs, vec![turn]);
}

#[tokio::test]
async fn test_invalid_params_are_rejected() {
    let h = Harness::new();
    let err = h.system.coordinator.create_memory("chat", params(0)).unwrap_err();
    assert!(matches!(err, MemoryError::InvalidParams(_)));
}

#[tokio::test]
async fn test_blank_app_is_a_caller_error() {
    let h = Harness::new();
    let err = h.system.coordinator.create_memory("  ", None).unwrap_err();
    assert!(matches!(err, MemoryError::InvalidParams(_)));
    assert!(!err.is_transient());
}

// ===== End to end =====

#[tokio::test]
async fn test_threshold_two_scenario() {
    let h = Harness::new();
    let coordinator = &h.system.coordinator;
    let memory_id = coordinator.create_memory("chat", params(2)).unwrap();

    let a = h.blob("chat/a.json", "A: my name is Ana").await;
    coordinator.push_message(&memory_id, "chat", &a, None, None).await.unwrap();
    let progress = h.system.database.progress.get(&memory_id).unwrap().unwrap();
    assert_eq!(progress.recent_qa_count, 1);

    let b = h.blob("chat/b.json", "B: I prefer tea").await;
    let outcome = coordinator.push_message(&memory_id, "chat", &b, None, None).await.unwrap();
    let summary_ref = outcome.summary_ref.unwrap();
    let progress = h.system.database.progress.get(&memory_id).unwrap().unwrap();
    assert_eq!(progress.summary_version, 1);
    assert_eq!(progress.recent_qa_count, 0);

    let refs = coordinator
        .get_context(&memory_id, "chat", "what do I drink", &GetContextOptions::default())
        .await
        .unwrap();
    assert_eq!(refs.summary_refs, vec![summary_ref]);
    assert!(refs.recent_refs.is_empty());
}

#[tokio::test]
async fn test_answer_uses_bounded_context() {
    let config = Config { context_max_chars: 40, ..Config::default() };
    let h = Harness::with_generator(ScriptedGenerator::default(), config);
    let coordinator = &h.system.coordinator;
    let params = MemoryParams::default()
        .with_summary_every_n(10)
        .with_summary_language(SummaryLanguage::En);
    let memory_id = coordinator.create_memory("chat", Some(params)).unwrap();

    let short = h.blob("chat/short.json", "short fact").await;
    let long = h.blob("chat/long.json", &"x".repeat(100)).await;
    coordinator.push_message(&memory_id, "chat", &long, None, None).await.unwrap();
    coordinator.push_message(&memory_id, "chat", &short, None, None).await.unwrap();

    let answer = h
        .system
        .orchestrator
        .answer(&memory_id, "chat", "what facts", &GetContextOptions::default())
        .await
        .unwrap();

    assert_eq!(answer.answer, "generated #1");
    assert!(answer.assembled.text.chars().count() <= 40);
    assert_eq!(answer.assembled.text, "short fact");
    assert_eq!(answer.context_used.recent_refs, vec![short, long]);

    let prompts = h.generator.prompts();
    let prompt = &prompts[0];
    assert!(prompt.contains("--- context start ---\nshort fact\n--- context end ---"));
    assert!(prompt.contains("Question: what facts"));
}
