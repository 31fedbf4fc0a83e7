//! End-to-end pipeline tests
//!
//! Row accounting, fallback behavior, confidence gating, circuit breaking,
//! schema completeness, streaming and cancellation.

mod helpers;

use helpers::*;
use opinio_ai::models::{AggregateReport, ClassificationSource, FallbackReason, Sentiment};
use opinio_ai::services::{ChunkReader, Lexicon};
use opinio_ai::{Pipeline, PipelineError, PipelineEvent, PipelineState};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SCENARIO: &[&str] = &[
    "Excelente servicio",
    "excelente servicio",
    "mal",
    "Muy mal servicio, pésimo",
];

async fn run(pipeline: &Pipeline, csv: &str, config: &opinio_ai::PipelineConfig) -> AggregateReport {
    pipeline
        .run_reader(csv_reader(csv, config), CancellationToken::new())
        .await
        .expect("pipeline run")
}

#[tokio::test]
async fn test_scenario_row_accounting() {
    // Given: the four-row scenario and a two-token minimum
    let config = test_config(2);
    let pipeline = Pipeline::new(config.clone(), Lexicon::builtin(), None).unwrap();

    // When: the pipeline runs rules-only
    let report = run(&pipeline, &comment_csv(SCENARIO), &config).await;

    // Then: counts match and rows balance
    assert_eq!(report.total_raw, 4);
    assert_eq!(report.total_unique, 2);
    assert_eq!(report.duplicates_removed, 1);
    assert_eq!(report.rejected_short_rows, 1);
    assert_eq!(report.skipped_rows, 0);
    assert!(report.rows_balance());

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].comment.raw_text, "Excelente servicio");
    assert_eq!(report.results[0].comment.occurrence_count, 2);
    assert_eq!(report.results[0].sentiment, Sentiment::Positive);
    assert_eq!(report.results[1].sentiment, Sentiment::Negative);
    assert_eq!(report.sentiment_counts.total(), report.total_unique);
}

#[tokio::test]
async fn test_scenario_with_default_token_minimum() {
    // Given: the same rows with the default three-token minimum
    let config = test_config(3);
    let pipeline = Pipeline::new(config.clone(), Lexicon::builtin(), None).unwrap();

    let report = run(&pipeline, &comment_csv(SCENARIO), &config).await;

    // Then: both two-token rows are rejected along with "mal"
    assert_eq!(report.total_raw, 4);
    assert_eq!(report.total_unique, 1);
    assert_eq!(report.duplicates_removed, 0);
    assert_eq!(report.rejected_short_rows, 3);
    assert!(report.rows_balance());
}

#[tokio::test]
async fn test_failing_service_falls_back_for_every_comment() {
    // Given: a service that always fails and a breaker that never opens
    let mut config = test_config(2);
    config.ai.circuit_breaker_threshold = 0;
    let client = FailingClient::new();
    let pipeline = Pipeline::new(config.clone(), Lexicon::builtin(), Some(client.clone())).unwrap();

    let comments = [
        "buen trato del personal",
        "precio muy caro",
        "entrega tarde otra vez",
        "todo correcto gracias",
    ];
    let report = run(&pipeline, &comment_csv(&comments), &config).await;

    // Then: every result is rule-based and degraded
    assert_eq!(report.total_unique, 4);
    assert!(report
        .results
        .iter()
        .all(|r| r.source == ClassificationSource::RuleBased
            && r.fallback_reason == Some(FallbackReason::AiError)));
    assert_eq!(report.degraded_count, report.total_unique);
    assert_eq!(report.ai_count, 0);
    assert_eq!(client.calls(), 4);
}

#[tokio::test]
async fn test_confidence_gating() {
    // Given: a service answering below the 0.5 threshold
    let config = test_config(2);
    let client = FixedClient::with_confidence(0.3);
    let pipeline = Pipeline::new(config.clone(), Lexicon::builtin(), Some(client.clone())).unwrap();

    let report = run(&pipeline, &comment_csv(&["el pedido llegó roto"]), &config).await;

    // Then: the rule-based result is used
    let result = &report.results[0];
    assert_eq!(result.source, ClassificationSource::RuleBased);
    assert_eq!(result.fallback_reason, Some(FallbackReason::LowConfidence));
    assert_eq!(report.degraded_count, 1);
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_confident_service_results_are_used() {
    let config = test_config(2);
    let client = FixedClient::with_confidence(0.95);
    let pipeline = Pipeline::new(config.clone(), Lexicon::builtin(), Some(client.clone())).unwrap();

    let report = run(&pipeline, &comment_csv(&["mal servicio hoy", "muy mal servicio"]), &config).await;

    assert_eq!(report.ai_count, 2);
    assert_eq!(report.degraded_count, 0);
    // Service verdict wins over the lexicon
    assert!(report.results.iter().all(|r| r.sentiment == Sentiment::Positive));
    assert_eq!(report.theme_counts["servicio"], 2);
}

#[tokio::test]
async fn test_timeouts_open_breaker_after_threshold() {
    // Given: a service that never answers, breaker threshold 3, one request at a time
    let mut config = test_config(2);
    config.ai.circuit_breaker_threshold = 3;
    config.ai.concurrency = 1;
    let client = HangingClient::new();
    let (tx, mut rx) = mpsc::channel(256);
    let pipeline = Pipeline::new(config.clone(), Lexicon::builtin(), Some(client.clone()))
        .unwrap()
        .with_events(tx);

    let comments: Vec<String> = (0..10).map(|i| format!("comentario numero {}", i)).collect();
    let refs: Vec<&str> = comments.iter().map(String::as_str).collect();
    let report = run(&pipeline, &comment_csv(&refs), &config).await;
    drop(pipeline);

    // Then: all results are rule-based and the service saw exactly K calls
    assert_eq!(client.calls(), 3);
    assert!(report
        .results
        .iter()
        .all(|r| r.source == ClassificationSource::RuleBased));
    let circuit_open = report
        .results
        .iter()
        .filter(|r| r.fallback_reason == Some(FallbackReason::CircuitOpen))
        .count();
    assert_eq!(circuit_open, 7);
    assert_eq!(report.degraded_count, 10);

    let mut opened = 0;
    while let Some(event) = rx.recv().await {
        if matches!(event, PipelineEvent::CircuitOpened { .. }) {
            opened += 1;
        }
    }
    assert_eq!(opened, 1);
}

#[tokio::test]
async fn test_malformed_service_response_is_failure() {
    let config = test_config(2);
    let client = FixedClient::new(json!({"sentiment": "great", "confidence": 0.99}));
    let pipeline = Pipeline::new(config.clone(), Lexicon::builtin(), Some(client)).unwrap();

    let report = run(&pipeline, &comment_csv(&["buena atención siempre"]), &config).await;

    assert_eq!(report.results[0].fallback_reason, Some(FallbackReason::AiError));
    assert_eq!(report.degraded_count, 1);
}

#[tokio::test]
async fn test_empty_input_report_is_complete() {
    // Given: only a header row
    let config = test_config(2);
    let pipeline = Pipeline::new(config.clone(), Lexicon::builtin(), None).unwrap();

    let report = run(&pipeline, "id,comentario\n", &config).await;

    // Then: every field is present with zero values
    assert_eq!(report.total_unique, 0);
    assert_eq!(report.schema_repairs, 0);
    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["sentiment_counts"], json!({"positive": 0, "neutral": 0, "negative": 0}));
    assert_eq!(
        value["sentiment_pcts"],
        json!({"positive": 0.0, "neutral": 0.0, "negative": 0.0})
    );
    assert_eq!(value["results"], json!([]));

    // Round trip through a partial document keeps defaults
    let partial = AggregateReport::from_json_lenient(r#"{"total_raw": 0}"#).unwrap();
    assert_eq!(partial.sentiment_pcts, report.sentiment_pcts);
}

#[tokio::test]
async fn test_streaming_large_synthetic_input() {
    // Given: far more rows than unique comments, in small chunks
    let mut config = test_config(2);
    config.reader.chunk_rows = 500;
    let pipeline = Pipeline::new(config.clone(), Lexicon::builtin(), None).unwrap();
    let reader = ChunkReader::from_csv(SyntheticCsv::new(200_000, 40), b',', &config.reader).unwrap();

    let report = pipeline.run_reader(reader, CancellationToken::new()).await.unwrap();

    // Then: state is bounded by unique comments and counts balance
    assert_eq!(report.total_raw, 200_000);
    assert_eq!(report.total_unique, 40);
    assert_eq!(report.duplicates_removed, 200_000 - 40);
    assert!(report
        .results
        .iter()
        .all(|r| r.comment.occurrence_count == 5_000));
    assert!(report.rows_balance());
}

#[tokio::test]
async fn test_skipped_rows_counted_in_report() {
    let config = test_config(2);
    let pipeline = Pipeline::new(config.clone(), Lexicon::builtin(), None).unwrap();

    let mut data = b"id,comentario\n1,muy buen servicio\n".to_vec();
    data.extend_from_slice(b"2,comentario \xff roto aqui\n");
    data.extend_from_slice(b"3,pedido llego tarde\n");
    let reader = ChunkReader::from_csv(std::io::Cursor::new(data), b',', &config.reader).unwrap();

    let report = pipeline.run_reader(reader, CancellationToken::new()).await.unwrap();

    assert_eq!(report.total_raw, 3);
    assert_eq!(report.skipped_rows, 1);
    assert_eq!(report.total_unique, 2);
    assert!(report.rows_balance());
}

#[tokio::test]
async fn test_cancellation_during_classification() {
    // Given: a hanging service and a token cancelled shortly after start
    let mut config = test_config(2);
    config.ai.timeout = std::time::Duration::from_secs(30);
    let client = HangingClient::new();
    let pipeline = Arc::new(Pipeline::new(config.clone(), Lexicon::builtin(), Some(client)).unwrap());
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let result = pipeline
        .run_reader(csv_reader(&comment_csv(&["uno dos tres", "cuatro cinco seis"]), &config), cancel)
        .await;

    // Then: the run stops with Cancelled instead of waiting for the service
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(pipeline.state(), PipelineState::Cancelled);
}

#[tokio::test]
async fn test_run_file_sets_source_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("encuesta.csv");
    std::fs::write(&path, comment_csv(&["excelente atención del personal"])).unwrap();

    let config = test_config(2);
    let pipeline = Pipeline::new(config, Lexicon::builtin(), None).unwrap();
    let report = pipeline.run_file(&path, CancellationToken::new()).await.unwrap();

    assert_eq!(report.source_file.as_deref(), Some("encuesta.csv"));
    assert_eq!(report.comment_column.as_deref(), Some("comentario"));
    assert!(report.results[0].themes.contains("atencion_cliente"));
}

#[tokio::test]
async fn test_missing_comment_column_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("numeros.csv");
    std::fs::write(&path, "id,score\n1,5\n2,3\n").unwrap();

    let pipeline = Pipeline::new(test_config(2), Lexicon::builtin(), None).unwrap();
    let result = pipeline.run_file(&path, CancellationToken::new()).await;

    assert!(matches!(result, Err(PipelineError::NoCommentColumn { .. })));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}
