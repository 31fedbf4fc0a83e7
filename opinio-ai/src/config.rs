//! Pipeline configuration resolution
//!
//! Resolves the explicit [`PipelineConfig`] handed to every component.
//!
//! **Priority:** command line → environment → TOML → built-in defaults.
//! Command-line overrides are applied by the binary after [`PipelineConfig::resolve`].

use crate::error::{PipelineError, PipelineResult};
use opinio_common::config::TomlConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Environment override for the classification service URL
pub const AI_ENDPOINT_ENV_VAR: &str = "OPINIO_AI_ENDPOINT";

/// Environment override for the classification service key
pub const AI_API_KEY_ENV_VAR: &str = "OPINIO_AI_API_KEY";

/// Default candidate comment column names, highest priority first
pub const DEFAULT_COMMENT_COLUMNS: &[&str] = &[
    "comentario",
    "comentarios",
    "comment",
    "comments",
    "observacion",
    "observaciones",
    "feedback",
    "opinion",
    "respuesta",
    "texto",
    "text",
];

/// Spreadsheet reading settings
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    /// Rows per chunk
    pub chunk_rows: usize,
    /// Rows sampled for free-text column detection
    pub sample_rows: usize,
    /// Candidate header names, highest priority first
    pub comment_columns: Vec<String>,
    /// Minimum average tokens for a column to count as free text
    pub min_avg_tokens: f64,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            chunk_rows: 1000,
            sample_rows: 50,
            comment_columns: DEFAULT_COMMENT_COLUMNS.iter().map(|s| s.to_string()).collect(),
            min_avg_tokens: 3.0,
        }
    }
}

/// Classification service settings
#[derive(Debug, Clone)]
pub struct AiSettings {
    /// Service URL; `None` means rule-based classification only
    pub endpoint: Option<String>,
    /// Bearer token
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Minimum accepted confidence
    pub min_confidence: f32,
    /// Consecutive failures that open the circuit breaker
    pub circuit_breaker_threshold: usize,
    /// Maximum in-flight requests
    pub concurrency: usize,
    /// Outbound request rate cap
    pub requests_per_second: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout: Duration::from_millis(10_000),
            min_confidence: 0.5,
            circuit_breaker_threshold: 5,
            concurrency: 4,
            requests_per_second: 5,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Reader settings
    pub reader: ReaderSettings,
    /// Minimum whitespace tokens for a comment to be accepted
    pub min_tokens: usize,
    /// Classification service settings
    pub ai: AiSettings,
    /// Lexicon file; `None` uses the built-in lexicon
    pub lexicon_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reader: ReaderSettings::default(),
            min_tokens: 3,
            ai: AiSettings::default(),
            lexicon_path: None,
        }
    }
}

impl PipelineConfig {
    /// Resolve configuration from TOML and environment on top of defaults
    pub fn resolve(toml: &TomlConfig) -> PipelineResult<Self> {
        let mut config = Self::default();

        let p = &toml.pipeline;
        if let Some(v) = p.chunk_rows {
            config.reader.chunk_rows = v;
        }
        if let Some(v) = p.sample_rows {
            config.reader.sample_rows = v;
        }
        if let Some(v) = p.min_tokens {
            config.min_tokens = v;
        }
        if let Some(columns) = &p.comment_columns {
            config.reader.comment_columns = columns.clone();
        }

        let a = &toml.ai;
        config.ai.endpoint = resolve_secret(AI_ENDPOINT_ENV_VAR, a.endpoint.as_deref(), "endpoint");
        config.ai.api_key = resolve_secret(AI_API_KEY_ENV_VAR, a.api_key.as_deref(), "API key");
        if let Some(v) = a.timeout_ms {
            config.ai.timeout = Duration::from_millis(v);
        }
        if let Some(v) = a.min_confidence {
            config.ai.min_confidence = v;
        }
        if let Some(v) = a.circuit_breaker_threshold {
            config.ai.circuit_breaker_threshold = v;
        }
        if let Some(v) = a.concurrency {
            config.ai.concurrency = v;
        }
        if let Some(v) = a.requests_per_second {
            config.ai.requests_per_second = v;
        }

        config.lexicon_path = toml.lexicon_path.clone();

        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> PipelineResult<()> {
        if self.reader.chunk_rows == 0 {
            return Err(PipelineError::Config("chunk_rows must be at least 1".to_string()));
        }
        if self.reader.comment_columns.is_empty() && self.reader.sample_rows == 0 {
            return Err(PipelineError::Config(
                "comment_columns is empty and sample_rows is 0: no way to find the comment column"
                    .to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ai.min_confidence) {
            return Err(PipelineError::Config(format!(
                "min_confidence must be within 0.0-1.0 (got {})",
                self.ai.min_confidence
            )));
        }
        if self.ai.concurrency == 0 {
            return Err(PipelineError::Config("ai concurrency must be at least 1".to_string()));
        }
        if self.ai.requests_per_second == 0 {
            return Err(PipelineError::Config(
                "ai requests_per_second must be at least 1".to_string(),
            ));
        }
        if self.ai.timeout.is_zero() {
            return Err(PipelineError::Config("ai timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// True when a classification service is configured
    pub fn ai_enabled(&self) -> bool {
        self.ai.endpoint.is_some()
    }
}

/// Environment first, then TOML; warns when both are set
fn resolve_secret(env_var: &str, toml_value: Option<&str>, label: &str) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_value(v));
    let toml_value = toml_value.filter(|v| is_valid_value(v)).map(str::to_string);

    match (env_value, toml_value) {
        (Some(env), Some(_)) => {
            warn!(
                "Classification service {} found in both {} and TOML. Using environment.",
                label, env_var
            );
            Some(env)
        }
        (Some(env), None) => {
            info!("Classification service {} loaded from {}", label, env_var);
            Some(env)
        }
        (None, Some(toml)) => {
            info!("Classification service {} loaded from TOML config", label);
            Some(toml)
        }
        (None, None) => None,
    }
}

/// Non-empty, non-whitespace
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}
