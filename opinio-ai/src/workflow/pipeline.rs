//! Pipeline orchestrator
//!
//! Wires the components left to right:
//! ChunkReader → TextNormalizer → Deduplicator → ClassificationOrchestrator →
//! ResultAggregator.
//!
//! Reading is sequential and runs on the blocking pool one chunk at a time,
//! so memory holds one chunk plus the unique comments. Cancellation is checked
//! at every chunk boundary and between classifications.
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::new(config, Lexicon::builtin(), None)?;
//! let report = pipeline.run_file(Path::new("encuesta.xlsx"), CancellationToken::new()).await?;
//! ```

use super::{PipelineEvent, PipelineState};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{AggregateReport, IngestTally};
use crate::services::chunk_reader::ChunkReader;
use crate::services::classification_orchestrator::ClassificationOrchestrator;
use crate::services::column_detector::DetectionMethod;
use crate::services::deduplicator::Deduplicator;
use crate::services::result_aggregator::aggregate;
use crate::services::{AiClassifier, Lexicon, RuleClassifier, TextNormalizer};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Classification progress is published every this many comments
const PROGRESS_EVERY: usize = 25;

/// End-to-end comment pipeline
pub struct Pipeline {
    config: PipelineConfig,
    lexicon: Lexicon,
    normalizer: TextNormalizer,
    ai: Option<Arc<dyn AiClassifier>>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    state: Mutex<PipelineState>,
}

impl Pipeline {
    /// Create pipeline; `ai = None` classifies with rules only
    pub fn new(
        config: PipelineConfig,
        lexicon: Lexicon,
        ai: Option<Arc<dyn AiClassifier>>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let normalizer = TextNormalizer::new(&lexicon.corrections)
            .map_err(|e| PipelineError::Config(format!("Invalid correction table: {}", e)))?;

        info!(
            ai = ai.as_ref().map(|c| c.name()).unwrap_or("none"),
            corrections = normalizer.correction_count(),
            themes = lexicon.themes.len(),
            chunk_rows = config.reader.chunk_rows,
            min_tokens = config.min_tokens,
            "Pipeline initialized"
        );

        Ok(Self {
            config,
            lexicon,
            normalizer,
            ai,
            event_tx: None,
            state: Mutex::new(PipelineState::Idle),
        })
    }

    /// Attach an event channel for progress reporting
    ///
    /// Events are sent without waiting; when the channel is full the event is
    /// dropped.
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// State of the current or most recent run
    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Process a spreadsheet or CSV file
    pub async fn run_file(&self, path: &Path, cancel: CancellationToken) -> PipelineResult<AggregateReport> {
        let run_id = self.start(Some(path.display().to_string()));

        let settings = self.config.reader.clone();
        let owned_path = path.to_path_buf();
        let opened = tokio::task::spawn_blocking(move || ChunkReader::open(&owned_path, &settings))
            .await
            .map_err(join_error)
            .and_then(|r| r);

        let result = match opened {
            Ok(reader) => self.execute(run_id, reader, &cancel).await,
            Err(e) => Err(e),
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.finish(
            run_id,
            result.map(|mut report| {
                report.source_file = Some(file_name);
                report
            }),
        )
    }

    /// Process rows from an already opened reader
    pub async fn run_reader(&self, reader: ChunkReader, cancel: CancellationToken) -> PipelineResult<AggregateReport> {
        let run_id = self.start(None);
        let result = self.execute(run_id, reader, &cancel).await;
        self.finish(run_id, result)
    }

    async fn execute(
        &self,
        run_id: Uuid,
        mut reader: ChunkReader,
        cancel: &CancellationToken,
    ) -> PipelineResult<AggregateReport> {
        self.transition(PipelineState::Reading);

        let column = reader.comment_column().clone();
        self.emit(PipelineEvent::ColumnDetected {
            column: column.name.clone(),
            index: column.index,
            by_header: column.method == DetectionMethod::HeaderName,
        });

        let mut dedup = Deduplicator::new(self.config.min_tokens);
        let mut chunk_number = 0;

        loop {
            if cancel.is_cancelled() {
                info!(chunks = chunk_number, "Run cancelled while reading");
                return Err(PipelineError::Cancelled);
            }

            let (returned, next) = tokio::task::spawn_blocking(move || {
                let next = reader.next_chunk();
                (reader, next)
            })
            .await
            .map_err(join_error)?;
            reader = returned;

            let Some(rows) = next? else {
                break;
            };
            chunk_number += 1;

            for row in &rows {
                let raw = row.comment_text();
                let normalized = self.normalizer.normalize(&raw);
                dedup.accumulate(&raw, &normalized);
            }

            debug!(
                chunk = chunk_number,
                rows = rows.len(),
                total_rows = reader.total_rows(),
                unique = dedup.unique_count(),
                "Chunk processed"
            );
            self.emit(PipelineEvent::ChunkRead {
                chunk: chunk_number,
                rows: rows.len(),
                total_rows: reader.total_rows(),
                unique_comments: dedup.unique_count(),
            });
        }

        let stats = dedup.stats();
        let tally = IngestTally {
            total_raw: reader.total_rows(),
            duplicates_removed: stats.duplicates,
            skipped_rows: reader.skipped_rows(),
            rejected_short_rows: stats.rejected_short,
        };
        drop(reader);

        info!(
            total_raw = tally.total_raw,
            unique = stats.unique,
            duplicates = tally.duplicates_removed,
            skipped = tally.skipped_rows,
            rejected_short = tally.rejected_short_rows,
            "Reading complete"
        );

        self.transition(PipelineState::Classifying);

        let orchestrator = ClassificationOrchestrator::new(
            self.config.ai.clone(),
            RuleClassifier::new(&self.lexicon),
            self.ai.clone(),
        );

        let comments = dedup.into_comments();
        let total = comments.len();
        let mut circuit_reported = false;

        let results = orchestrator
            .classify_all_with_progress(comments, cancel, |completed, _| {
                if !circuit_reported && orchestrator.circuit_open() {
                    circuit_reported = true;
                    self.emit(PipelineEvent::CircuitOpened {
                        failures: orchestrator.ai_failures(),
                    });
                }
                if completed % PROGRESS_EVERY == 0 || completed == total {
                    self.emit(PipelineEvent::ClassificationProgress { completed, total });
                }
            })
            .await?;

        if orchestrator.ai_enabled() && orchestrator.ai_failures() > 0 {
            warn!(
                failures = orchestrator.ai_failures(),
                circuit_open = orchestrator.circuit_open(),
                "Classification service failures during run"
            );
        }

        self.transition(PipelineState::Aggregating);

        let mut report = aggregate(results, tally);
        report.run_id = run_id;
        report.comment_column = Some(column.name);
        Ok(report)
    }

    fn start(&self, source: Option<String>) -> Uuid {
        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, source = source.as_deref().unwrap_or("<reader>"), "Run started");
        self.transition(PipelineState::Idle);
        self.emit(PipelineEvent::RunStarted {
            run_id,
            source,
            timestamp: chrono::Utc::now().timestamp(),
        });
        run_id
    }

    fn finish(&self, run_id: Uuid, result: PipelineResult<AggregateReport>) -> PipelineResult<AggregateReport> {
        match &result {
            Ok(report) => {
                self.transition(PipelineState::Completed);
                info!(
                    run_id = %run_id,
                    total_raw = report.total_raw,
                    total_unique = report.total_unique,
                    degraded = report.degraded_count,
                    "Run completed"
                );
                self.emit(PipelineEvent::RunCompleted {
                    run_id,
                    total_raw: report.total_raw,
                    total_unique: report.total_unique,
                    degraded_count: report.degraded_count,
                    timestamp: chrono::Utc::now().timestamp(),
                });
            }
            Err(e) => {
                let cancelled = matches!(e, PipelineError::Cancelled);
                if cancelled {
                    self.transition(PipelineState::Cancelled);
                    info!(run_id = %run_id, "Run cancelled");
                } else {
                    self.transition(PipelineState::Failed);
                    error!(run_id = %run_id, kind = ?e.kind(), error = %e, "Run failed");
                }
                self.emit(PipelineEvent::RunFailed {
                    run_id,
                    message: e.to_string(),
                    cancelled,
                    timestamp: chrono::Utc::now().timestamp(),
                });
            }
        }
        result
    }

    fn transition(&self, next: PipelineState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug!(from = ?*state, to = ?next, "Pipeline state");
        *state = next;
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            if let Err(e) = tx.try_send(event) {
                debug!(error = %e, "Pipeline event dropped");
            }
        }
    }
}

fn join_error(err: tokio::task::JoinError) -> PipelineError {
    PipelineError::Common(opinio_common::Error::Internal(format!(
        "Reader task failed: {}",
        err
    )))
}
