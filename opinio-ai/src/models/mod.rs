//! Data models for the comment pipeline

pub mod classification;
pub mod comment;
pub mod report;

pub use classification::{ClassificationResult, ClassificationSource, FallbackReason, Sentiment};
pub use comment::{CellValue, Comment, RawRow};
pub use report::{AggregateReport, IngestTally, SentimentCounts, SentimentPcts};
