//! Pipeline components
//!
//! Leaves first: reading, normalization, deduplication, classification,
//! aggregation. No component depends on one further down the pipeline.

pub mod ai_client;
pub mod chunk_reader;
pub mod circuit_breaker;
pub mod classification_orchestrator;
pub mod column_detector;
pub mod deduplicator;
pub mod lexicon;
pub mod result_aggregator;
pub mod rule_classifier;
pub mod text_normalizer;

pub use ai_client::{validate_response, AiClassifier, AiServiceError, AiVerdict, HttpAiClassifier};
pub use chunk_reader::ChunkReader;
pub use circuit_breaker::CircuitBreaker;
pub use classification_orchestrator::{ClassificationOrchestrator, ClassificationStage};
pub use column_detector::{ColumnDetector, DetectedColumn, DetectionMethod};
pub use deduplicator::{Accumulated, DedupStats, Deduplicator};
pub use lexicon::{Lexicon, LexiconError};
pub use result_aggregator::{aggregate, validate_schema};
pub use rule_classifier::{RuleClassifier, RuleVerdict};
pub use text_normalizer::{Correction, TextNormalizer};
