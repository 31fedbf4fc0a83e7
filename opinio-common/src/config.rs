//! Bootstrap configuration loading and config file resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable (`OPINIO_CONFIG` for the file path)
//! 3. TOML config file
//! 4. Compiled defaults (applied by the consuming crate)
//!
//! A missing TOML file is never fatal: a warning is logged and defaults are
//! used. A TOML file that exists but does not parse is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "OPINIO_CONFIG";

/// Directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "opinio";

/// Default config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Complete TOML configuration file
///
/// Every section is optional. Fields left unset fall through to the next
/// configuration tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Path to a lexicon TOML file (sentiment words, themes, corrections)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lexicon_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ingestion and deduplication settings
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Classification service settings
    #[serde(default)]
    pub ai: AiSection,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[pipeline]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineSection {
    /// Rows per streamed chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_rows: Option<usize>,

    /// Minimum whitespace-separated tokens for a comment to be accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_tokens: Option<usize>,

    /// Rows sampled for comment column detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rows: Option<usize>,

    /// Candidate comment column names, highest priority first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_columns: Option<Vec<String>>,
}

/// `[ai]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AiSection {
    /// Classification service URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Bearer token for the classification service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Minimum confidence for accepting a service verdict (0.0-1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f32>,

    /// Consecutive failures before the service is skipped for the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker_threshold: Option<usize>,

    /// Maximum in-flight classification requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Outbound request rate cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_second: Option<u32>,
}

/// Resolves which config file to read
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create resolver with an optional `--config` argument
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Resolve the config file path
    ///
    /// Returns `None` when no tier names a file and the platform default does
    /// not exist.
    pub fn resolve(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            debug!(path = %path.display(), "Config path from command line");
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                debug!(path = %path, "Config path from {}", CONFIG_ENV_VAR);
                return Some(PathBuf::from(path));
            }
        }

        let default_path = default_config_path()?;
        if default_path.exists() {
            debug!(path = %default_path.display(), "Config path from platform default");
            Some(default_path)
        } else {
            None
        }
    }
}

/// Platform default config file location (`~/.config/opinio/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load TOML config with graceful degradation
///
/// Missing file → warning + `TomlConfig::default()`.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "Config file not found, continuing with built-in defaults"
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    debug!(path = %path.display(), "Wrote config file");
    Ok(())
}
