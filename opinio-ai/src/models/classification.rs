//! Per-comment classification results

use super::Comment;
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Comment sentiment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    /// Case-insensitive parse of the three labels
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            other => Err(format!("unknown sentiment '{}'", other)),
        }
    }
}

/// Which classification path produced a result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Ai,
    #[default]
    RuleBased,
}

/// Why the rule-based path was used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No classification service configured (rules by configuration)
    AiNotConfigured,
    /// Service call failed
    AiError,
    /// Service answered below the confidence threshold
    LowConfidence,
    /// Service skipped after too many consecutive failures
    CircuitOpen,
}

impl FallbackReason {
    /// True when the fallback was caused by the service rather than configuration
    pub fn is_degraded(&self) -> bool {
        !matches!(self, FallbackReason::AiNotConfigured)
    }
}

/// Classification of one unique comment
///
/// Missing fields deserialize as a neutral rule-based result with no themes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Comment this result belongs to
    #[serde(default)]
    pub comment: Comment,
    /// Detected sentiment
    #[serde(default)]
    pub sentiment: Sentiment,
    /// Confidence (0.0-1.0)
    #[serde(default)]
    pub confidence: f32,
    /// Matched theme names (sorted, unique)
    #[serde(default)]
    pub themes: BTreeSet<String>,
    /// Producing path
    #[serde(default)]
    pub source: ClassificationSource,
    /// Reason for a rule-based result
    #[serde(default)]
    pub fallback_reason: Option<FallbackReason>,
    /// Error absorbed while producing this result
    #[serde(default)]
    pub error: Option<ErrorKind>,
}

impl ClassificationResult {
    /// True for rule-based results caused by a service problem
    pub fn is_degraded(&self) -> bool {
        self.source == ClassificationSource::RuleBased
            && self.fallback_reason.map_or(false, |r| r.is_degraded())
    }
}
