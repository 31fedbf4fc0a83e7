//! opinio-ai library interface
//!
//! Customer-feedback comment pipeline: streaming spreadsheet ingestion,
//! normalization and deduplication, hybrid service/rule-based classification,
//! and schema-checked aggregation.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::config::PipelineConfig;
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::workflow::{Pipeline, PipelineEvent, PipelineState};
