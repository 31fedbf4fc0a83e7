//! opinio-ai - customer-feedback comment analysis
//!
//! Reads a spreadsheet or CSV export, classifies every unique comment and
//! writes the aggregate report as JSON to `--output` or stdout. Logs go to
//! stderr (or the configured log file) so stdout stays machine-readable.

use anyhow::{Context, Result};
use clap::Parser;
use opinio_ai::config::PipelineConfig;
use opinio_ai::services::{AiClassifier, HttpAiClassifier, Lexicon};
use opinio_ai::{Pipeline, PipelineError};
use opinio_common::config::{default_config_path, load_toml_config, write_toml_config, ConfigResolver, TomlConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("OPINIO_GIT_HASH"),
    ", ",
    env!("OPINIO_BUILD_PROFILE"),
    ", built ",
    env!("OPINIO_BUILD_TIMESTAMP"),
    ")"
);

/// Analyze customer-feedback comments in a spreadsheet or CSV file
#[derive(Parser, Debug)]
#[command(name = "opinio-ai", version = VERSION, about)]
struct Args {
    /// Input file (.csv, .tsv, .txt, .xlsx, .xlsm, .xls)
    #[arg(required_unless_present = "init_config")]
    file: Option<PathBuf>,

    /// Config file (overrides OPINIO_CONFIG and the default location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Lexicon file (overrides lexicon_path from the config file)
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// Classify with rules only, even if a service endpoint is configured
    #[arg(long)]
    rules_only: bool,

    /// Rows per chunk
    #[arg(long)]
    chunk_rows: Option<usize>,

    /// Minimum service confidence to accept (0.0-1.0)
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        return init_config(args.config.as_deref());
    }
    let Some(file) = args.file.clone() else {
        anyhow::bail!("No input file given");
    };

    // Step 1: Resolve and load config (CLI → OPINIO_CONFIG → default location)
    let config_path = ConfigResolver::new(args.config.clone()).resolve();
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path)?,
        None => TomlConfig::default(),
    };

    // Step 2: Logging
    init_logging(&args, &toml_config)?;

    info!("Starting opinio-ai {}", VERSION);
    match &config_path {
        Some(path) if path.exists() => info!("Config: {}", path.display()),
        Some(path) => warn!("Config file {} not found, using defaults", path.display()),
        None => info!("No config file, using defaults"),
    }

    // Step 3: Pipeline configuration, command line last
    let mut config = PipelineConfig::resolve(&toml_config)?;
    if let Some(rows) = args.chunk_rows {
        config.reader.chunk_rows = rows;
    }
    if let Some(min_confidence) = args.min_confidence {
        config.ai.min_confidence = min_confidence;
    }
    if let Some(path) = &args.lexicon {
        config.lexicon_path = Some(path.clone());
    }
    if args.rules_only {
        config.ai.endpoint = None;
    }
    config.validate()?;

    let lexicon = Lexicon::load_or_builtin(config.lexicon_path.as_deref())
        .context("Failed to load lexicon")?;

    let ai: Option<Arc<dyn AiClassifier>> = if config.ai_enabled() {
        let client = HttpAiClassifier::new(&config.ai).context("Failed to create service client")?;
        info!(
            endpoint = config.ai.endpoint.as_deref().unwrap_or_default(),
            "Classification service enabled"
        );
        Some(Arc::new(client) as Arc<dyn AiClassifier>)
    } else {
        info!("Classification service not configured, using rules only");
        None
    };

    let pipeline = Pipeline::new(config, lexicon, ai)?;

    // Step 4: Ctrl-C cancels cooperatively
    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            ctrl_c_token.cancel();
        }
    });

    let report = match pipeline.run_file(&file, cancel).await {
        Ok(report) => report,
        Err(PipelineError::Cancelled) => {
            warn!("Run cancelled, no report written");
            std::process::exit(130);
        }
        Err(e) => return Err(e.into()),
    };

    // Step 5: Report
    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn init_logging(args: &Args, toml_config: &TomlConfig) -> Result<()> {
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| toml_config.logging.level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match &toml_config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
        }
        None => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
        }
    }
    Ok(())
}

fn init_config(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path().context("No config directory on this platform")?,
    };
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    write_toml_config(&TomlConfig::default(), &path)?;
    eprintln!("Wrote default config to {}", path.display());
    Ok(())
}
