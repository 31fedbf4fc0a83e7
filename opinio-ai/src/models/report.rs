//! Aggregate report consumed by reporting and export collaborators
//!
//! Every field carries a default so a consumer never meets a missing key,
//! whether the report was built in-process or read back from partial JSON.

use super::{ClassificationResult, Sentiment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Row accounting gathered during ingestion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestTally {
    /// Data rows read (header excluded, blank rows excluded)
    pub total_raw: usize,
    /// Rows collapsed into an existing comment
    pub duplicates_removed: usize,
    /// Rows skipped because they could not be decoded
    pub skipped_rows: usize,
    /// Rows rejected for having too few tokens
    pub rejected_short_rows: usize,
}

/// Per-sentiment counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentCounts {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentCounts {
    /// Increment the bucket for `sentiment`
    pub fn record(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Negative => self.negative += 1,
        }
    }

    /// Sum of all buckets
    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }
}

/// Per-sentiment percentages (0.0-100.0)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentPcts {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateReport {
    /// Run identifier
    pub run_id: Uuid,
    /// Report creation time
    pub generated_at: DateTime<Utc>,
    /// Input file name, if the run read a file
    pub source_file: Option<String>,
    /// Detected comment column
    pub comment_column: Option<String>,
    pub total_raw: usize,
    pub total_unique: usize,
    pub duplicates_removed: usize,
    pub skipped_rows: usize,
    pub rejected_short_rows: usize,
    pub sentiment_counts: SentimentCounts,
    pub sentiment_pcts: SentimentPcts,
    /// Theme name → number of unique comments tagged with it
    pub theme_counts: BTreeMap<String, usize>,
    /// Results accepted from the classification service
    pub ai_count: usize,
    /// Rule-based results caused by service failure or low confidence
    pub degraded_count: usize,
    /// Fields repaired by the schema validator
    pub schema_repairs: usize,
    /// One result per unique comment, in first-seen order
    pub results: Vec<ClassificationResult>,
}

impl Default for AggregateReport {
    fn default() -> Self {
        Self {
            run_id: Uuid::nil(),
            generated_at: DateTime::<Utc>::default(),
            source_file: None,
            comment_column: None,
            total_raw: 0,
            total_unique: 0,
            duplicates_removed: 0,
            skipped_rows: 0,
            rejected_short_rows: 0,
            sentiment_counts: SentimentCounts::default(),
            sentiment_pcts: SentimentPcts::default(),
            theme_counts: BTreeMap::new(),
            ai_count: 0,
            degraded_count: 0,
            schema_repairs: 0,
            results: Vec::new(),
        }
    }
}

impl AggregateReport {
    /// Parse a report, filling any missing field with its default
    pub fn from_json_lenient(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Row tally view of this report
    pub fn tally(&self) -> IngestTally {
        IngestTally {
            total_raw: self.total_raw,
            duplicates_removed: self.duplicates_removed,
            skipped_rows: self.skipped_rows,
            rejected_short_rows: self.rejected_short_rows,
        }
    }

    /// `total_unique + duplicates + skipped + rejected == total_raw`
    pub fn rows_balance(&self) -> bool {
        self.total_unique + self.duplicates_removed + self.skipped_rows + self.rejected_short_rows
            == self.total_raw
    }
}
