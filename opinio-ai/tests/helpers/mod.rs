//! Test helper utilities
//!
//! Mock classification clients with call counters, and input builders.

#![allow(dead_code)]

use async_trait::async_trait;
use opinio_ai::config::PipelineConfig;
use opinio_ai::services::{AiClassifier, AiServiceError, ChunkReader};
use serde_json::{json, Value};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Always fails with a server error
#[derive(Default)]
pub struct FailingClient {
    calls: AtomicUsize,
}

impl FailingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiClassifier for FailingClient {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn classify(&self, _text: &str) -> Result<Value, AiServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AiServiceError::HttpStatus(503, "unavailable".to_string()))
    }
}

/// Never answers within any reasonable timeout
#[derive(Default)]
pub struct HangingClient {
    calls: AtomicUsize,
}

impl HangingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiClassifier for HangingClient {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn classify(&self, _text: &str) -> Result<Value, AiServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(json!({"sentiment": "neutral", "confidence": 1.0}))
    }
}

/// Answers every request with the same body
pub struct FixedClient {
    response: Value,
    calls: AtomicUsize,
}

impl FixedClient {
    pub fn new(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            calls: AtomicUsize::new(0),
        })
    }

    /// Positive verdict with the given confidence
    pub fn with_confidence(confidence: f64) -> Arc<Self> {
        Self::new(json!({
            "sentiment": "positive",
            "confidence": confidence,
            "themes": ["servicio"]
        }))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiClassifier for FixedClient {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn classify(&self, _text: &str) -> Result<Value, AiServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Pipeline config with the given token minimum and a fast service timeout
pub fn test_config(min_tokens: usize) -> PipelineConfig {
    let mut config = PipelineConfig {
        min_tokens,
        ..Default::default()
    };
    config.ai.endpoint = Some("http://mock".to_string());
    config.ai.timeout = Duration::from_millis(50);
    config
}

/// CSV with a `comentario` header and one row per comment
pub fn comment_csv(comments: &[&str]) -> String {
    let mut csv = String::from("id,comentario\n");
    for (i, comment) in comments.iter().enumerate() {
        csv.push_str(&format!("{},\"{}\"\n", i + 1, comment.replace('"', "\"\"")));
    }
    csv
}

/// Reader over an in-memory CSV
pub fn csv_reader(csv: &str, config: &PipelineConfig) -> ChunkReader {
    ChunkReader::from_csv(Cursor::new(csv.as_bytes().to_vec()), b',', &config.reader)
        .expect("valid test CSV")
}

/// Lazily generated CSV: `rows` data rows cycling through `distinct` comments
///
/// Bytes are produced on demand, so the input is never materialized.
pub struct SyntheticCsv {
    rows: usize,
    distinct: usize,
    next_row: usize,
    pending: Vec<u8>,
    header_sent: bool,
}

impl SyntheticCsv {
    pub fn new(rows: usize, distinct: usize) -> Self {
        Self {
            rows,
            distinct: distinct.max(1),
            next_row: 0,
            pending: Vec::new(),
            header_sent: false,
        }
    }
}

impl Read for SyntheticCsv {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            if !self.header_sent {
                self.header_sent = true;
                self.pending.extend_from_slice(b"id,comentario\n");
            } else if self.next_row < self.rows {
                let variant = self.next_row % self.distinct;
                let line = format!(
                    "{},comentario numero {} sobre el servicio\n",
                    self.next_row, variant
                );
                self.pending.extend_from_slice(line.as_bytes());
                self.next_row += 1;
            } else {
                return Ok(0);
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}
