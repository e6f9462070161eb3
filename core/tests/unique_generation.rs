//! Integration tests for the uniqueness loop, synchronous and streamed.

mod common;

use common::{Harness, ScriptedGenerator, Step, question, questions, request};
use futures::StreamExt;
use interview_core::error::{AttemptError, GenerationError};
use interview_core::{QuestionContent, Scope, StreamChunk};
use pretty_assertions::assert_eq;
use uuid::Uuid;

async fn scope(harness: &Harness, texts: &[&str]) -> Scope {
    Scope::load(
        &harness.embedder,
        texts.iter().map(|text| (*text).to_string()).collect(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_accepts_first_candidate_that_differs() {
    let harness = Harness::new();
    let unique = harness.unique(
        ScriptedGenerator::new(questions(&["q-joins-dup", "q-joins-dup", "q-pandas"])),
        5,
    );
    let scope = scope(&harness, &["q-joins"]).await;

    let content = unique
        .generate("generate_question", &request(Uuid::now_v7(), 1), &scope)
        .await
        .unwrap();

    assert_eq!(content, question("q-pandas"));
    assert_eq!(unique.generator().calls(), 3);
}

#[tokio::test]
async fn test_generator_sees_previous_texts() {
    let harness = Harness::new();
    let unique = harness.unique(ScriptedGenerator::new(questions(&["q-spark"])), 5);
    let scope = scope(&harness, &["q-joins", "q-pandas"]).await;

    unique
        .generate("generate_question", &request(Uuid::now_v7(), 1), &scope)
        .await
        .unwrap();

    assert_eq!(
        unique.generator().seen(),
        vec![vec!["q-joins".to_string(), "q-pandas".to_string()]]
    );
}

#[tokio::test]
async fn test_exhaustion_reports_last_rejection() {
    let harness = Harness::new();
    let unique = harness.unique(ScriptedGenerator::new(questions(&["q-joins-dup"])), 3);
    let scope = scope(&harness, &["q-joins"]).await;

    let err = unique
        .generate("generate_question", &request(Uuid::now_v7(), 1), &scope)
        .await
        .unwrap_err();

    assert_eq!(err.operation, "generate_question");
    assert_eq!(err.label, "failed to generate a unique item");
    assert_eq!(err.attempts, 3);
    assert!(matches!(err.source, AttemptError::Duplicate { kind: "question" }));
    assert_eq!(unique.generator().calls(), 3);
}

#[tokio::test]
async fn test_empty_scope_accepts_without_embedding() {
    let harness = Harness::new();
    let unique = harness.unique(ScriptedGenerator::new(questions(&["q-joins"])), 5);

    let content = unique
        .generate("generate_question", &request(Uuid::now_v7(), 1), &Scope::new())
        .await
        .unwrap();

    assert_eq!(content.question, "q-joins");
    assert_eq!(harness.provider.calls(), 0);
}

#[tokio::test]
async fn test_generation_failures_are_retried() {
    let harness = Harness::new();
    let mut steps = vec![Step::Fail("upstream timeout".to_string())];
    steps.extend(questions(&["q-dbt"]));
    let unique = harness.unique(ScriptedGenerator::new(steps), 5);
    let scope = scope(&harness, &["q-joins"]).await;

    let content = unique
        .generate("generate_question", &request(Uuid::now_v7(), 1), &scope)
        .await
        .unwrap();

    assert_eq!(content.question, "q-dbt");
    assert_eq!(unique.generator().calls(), 2);
}

#[tokio::test]
async fn test_missing_credentials_stop_after_one_attempt() {
    let harness = Harness::new();
    let unique = harness.unique(
        ScriptedGenerator::new(vec![Step::<QuestionContent>::Unconfigured]),
        5,
    );

    let err = unique
        .generate("generate_question", &request(Uuid::now_v7(), 1), &Scope::new())
        .await
        .unwrap_err();

    assert_eq!(err.attempts, 1);
    assert!(matches!(
        err.source,
        AttemptError::Generation(GenerationError::NotConfigured)
    ));
    assert_eq!(unique.generator().calls(), 1);
}

#[tokio::test]
async fn test_stream_restreams_after_rejection() {
    let harness = Harness::new();
    let unique = harness.unique(
        ScriptedGenerator::new(questions(&["q-joins-dup", "q-pandas"])),
        5,
    );
    let scope = scope(&harness, &["q-joins"]).await;
    let input = request(Uuid::now_v7(), 1);

    let chunks: Vec<_> = unique
        .generate_stream("generate_question_stream", &input, &scope)
        .collect()
        .await;

    let fragments: String = chunks
        .iter()
        .filter_map(|chunk| match chunk {
            Ok(StreamChunk::Fragment(text)) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert!(fragments.starts_with("Question: q-joins-dup\n"));
    assert!(fragments.contains("Question: q-pandas\n"));
    assert_eq!(chunks.len(), 9);

    match chunks.last() {
        Some(Ok(StreamChunk::Final(content))) => assert_eq!(content, &question("q-pandas")),
        other => panic!("expected a final chunk, got {other:?}"),
    }
    assert_eq!(unique.generator().calls(), 2);
}

#[tokio::test]
async fn test_stream_ends_with_exhaustion_error() {
    let harness = Harness::new();
    let unique = harness.unique(ScriptedGenerator::new(questions(&["q-joins-dup"])), 2);
    let scope = scope(&harness, &["q-joins"]).await;
    let input = request(Uuid::now_v7(), 1);

    let chunks: Vec<_> = unique
        .generate_stream("generate_question_stream", &input, &scope)
        .collect()
        .await;

    assert_eq!(chunks.len(), 9);
    assert!(
        chunks[..8]
            .iter()
            .all(|chunk| matches!(chunk, Ok(StreamChunk::Fragment(_))))
    );
    match chunks.last() {
        Some(Err(err)) => {
            assert_eq!(err.attempts, 2);
            assert!(matches!(err.source, AttemptError::Duplicate { .. }));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_with_empty_scope_skips_embedding() {
    let harness = Harness::new();
    let unique = harness.unique(ScriptedGenerator::new(questions(&["q-spark"])), 5);
    let input = request(Uuid::now_v7(), 1);
    let scope = Scope::new();

    let chunks: Vec<_> = unique
        .generate_stream("generate_question_stream", &input, &scope)
        .collect()
        .await;

    assert_eq!(chunks.len(), 5);
    assert!(matches!(chunks.last(), Some(Ok(StreamChunk::Final(_)))));
    assert_eq!(harness.provider.calls(), 0);
}
