//! Run-level workflow
//!
//! A run moves through `Reading → Classifying → Aggregating` and ends in
//! `Completed`, `Cancelled` or `Failed`. Progress is published as
//! [`PipelineEvent`]s on an optional channel.

pub mod pipeline;

pub use pipeline::Pipeline;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No run started yet
    Idle,
    /// Streaming rows into the deduplicator
    Reading,
    /// Classifying unique comments
    Classifying,
    /// Building the report
    Aggregating,
    Completed,
    Cancelled,
    Failed,
}

impl PipelineState {
    /// True for `Completed`, `Cancelled` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Cancelled | PipelineState::Failed
        )
    }
}

/// Progress events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Run accepted
    RunStarted {
        run_id: Uuid,
        /// Input path, when reading a file
        source: Option<String>,
        /// Unix timestamp (seconds)
        timestamp: i64,
    },

    /// Comment column found
    ColumnDetected {
        column: String,
        index: usize,
        /// False when found by the free-text heuristic
        by_header: bool,
    },

    /// One chunk normalized and deduplicated
    ChunkRead {
        /// 1-based chunk number
        chunk: usize,
        rows: usize,
        /// Data rows read so far
        total_rows: usize,
        /// Unique comments so far
        unique_comments: usize,
    },

    /// Classification progress
    ClassificationProgress { completed: usize, total: usize },

    /// Classification service disabled for the rest of the run
    CircuitOpened {
        /// Service failures recorded when it opened
        failures: usize,
    },

    RunCompleted {
        run_id: Uuid,
        total_raw: usize,
        total_unique: usize,
        degraded_count: usize,
        timestamp: i64,
    },

    RunFailed {
        run_id: Uuid,
        message: String,
        cancelled: bool,
        timestamp: i64,
    },
}
