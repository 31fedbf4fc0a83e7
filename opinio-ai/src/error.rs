//! Error types for opinio-ai
//!
//! Only run-fatal conditions are represented by [`PipelineError`]. Everything
//! else (bad rows, classification service failures, schema repairs) is
//! absorbed where it happens and recorded as an [`ErrorKind`] on the result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal pipeline error
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No column could be identified as holding free-text comments
    #[error(
        "No comment column found (headers: {headers:?}). Rename the comment column to one of {} \
         or configure [pipeline] comment_columns",
        quoted(.candidates)
    )]
    NoCommentColumn {
        /// Headers present in the file
        headers: Vec<String>,
        /// Header names that would have been accepted
        candidates: Vec<String>,
    },

    /// File extension is not a supported spreadsheet/CSV format
    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),

    /// Input file has no header row
    #[error("Input has no header row")]
    EmptyInput,

    /// Delimited text could not be read
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Workbook could not be opened or read
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run was cancelled by the caller
    #[error("Run cancelled")]
    Cancelled,

    /// opinio-common error
    #[error("Common error: {0}")]
    Common(#[from] opinio_common::Error),
}

impl From<calamine::Error> for PipelineError {
    fn from(err: calamine::Error) -> Self {
        PipelineError::Spreadsheet(err.to_string())
    }
}

impl From<calamine::XlsxError> for PipelineError {
    fn from(err: calamine::XlsxError) -> Self {
        PipelineError::Spreadsheet(err.to_string())
    }
}

impl PipelineError {
    /// Category of this error in the shared taxonomy, where it has one
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PipelineError::NoCommentColumn { .. } => Some(ErrorKind::NoCommentColumn),
            _ => None,
        }
    }
}

fn quoted(names: &[String]) -> String {
    if names.is_empty() {
        return "(none configured)".to_string();
    }
    names
        .iter()
        .map(|n| format!("'{}'", n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Classification service failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiFailure {
    /// No response within the configured timeout
    Timeout,
    /// Connection or transport failure
    Transport,
    /// Non-success HTTP status
    HttpStatus,
    /// Response did not satisfy the structural contract
    MalformedResponse,
}

/// Non-fatal error category attached to results and report events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ErrorKind {
    /// Comment column detection failed
    NoCommentColumn,
    /// A row could not be decoded and was skipped
    RowDecode,
    /// Classification service failed
    AiService(AiFailure),
    /// Aggregate report field was repaired
    SchemaViolation,
    /// Unexpected failure inside a classification path
    Internal,
}
