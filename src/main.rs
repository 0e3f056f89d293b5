//! HVAC Sentinel - zone fault detection CLI
//!
//! Reads a batch of zone sensor readings, runs the rule engine and the
//! isolation-forest scorer, and writes the anomaly records as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Rules + a scorer trained on the batch itself
//! hvac-sentinel detect --input readings.jsonl --output anomalies.json
//!
//! # Train on normal-labelled rows and keep the model
//! hvac-sentinel detect --input history.jsonl --normal-only --save-model model.json
//!
//! # Score with a previously trained model
//! hvac-sentinel detect --input today.jsonl --model model.json
//!
//! # Validate the active configuration
//! hvac-sentinel check-config
//! ```
//!
//! # Environment Variables
//!
//! - `HVAC_SENTINEL_CONFIG`: Path to detection_config.toml
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hvac_sentinel::config::{self, DetectionConfig};
use hvac_sentinel::pipeline::{DetectionOrchestrator, DetectionOutcome, ScorerMode};
use hvac_sentinel::scorer::{artifact, UnsupervisedScorer, SCORER_FEATURES};
use hvac_sentinel::types::{AnomalyRecord, RawReading};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "hvac-sentinel")]
#[command(about = "HVAC zone fault detection: diagnostic rules and isolation-forest scoring")]
#[command(version)]
struct CliArgs {
    /// Path to detection_config.toml (overrides the standard search order)
    #[arg(long, global = true, env = "HVAC_SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run detection over a JSON Lines file of sensor readings
    Detect {
        /// Input readings, one JSON object per line
        #[arg(long)]
        input: PathBuf,
        /// Output file for anomaly records (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Score with this trained model instead of training on the batch
        #[arg(long, conflicts_with = "no_scorer")]
        model: Option<PathBuf>,
        /// Write the model trained on this batch to this path
        #[arg(long, conflicts_with_all = ["model", "no_scorer"])]
        save_model: Option<PathBuf>,
        /// Run the rules only
        #[arg(long)]
        no_scorer: bool,
        /// Train only on rows labelled as normal
        #[arg(long)]
        normal_only: bool,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,
}

// ============================================================================
// Input / Output
// ============================================================================

/// Parse JSON Lines readings. Blank lines are skipped.
fn load_readings(path: &Path) -> Result<Vec<RawReading>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut readings = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let reading: RawReading = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid reading", path.display(), idx + 1))?;
        readings.push(reading);
    }
    info!(path = %path.display(), readings = readings.len(), "Readings loaded");
    Ok(readings)
}

fn write_records(records: &[AnomalyRecord], output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(records).context("Failed to serialize anomaly records")?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), records = records.len(), "Anomaly records written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn load_model(path: &Path) -> Result<UnsupervisedScorer> {
    let bytes = artifact::load_from_disk(path)
        .with_context(|| format!("Failed to read model {}", path.display()))?;
    UnsupervisedScorer::restore(&bytes, &SCORER_FEATURES)
        .with_context(|| format!("Model {} is not usable", path.display()))
}

fn save_model(scorer: &UnsupervisedScorer, path: &Path) -> Result<()> {
    let bytes = scorer.persist().context("Failed to serialize model")?;
    artifact::save_to_disk(&bytes, path)
        .with_context(|| format!("Failed to write model {}", path.display()))?;
    info!(path = %path.display(), "Model saved");
    Ok(())
}

// ============================================================================
// Subcommands
// ============================================================================

struct DetectArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    model: Option<PathBuf>,
    save_model: Option<PathBuf>,
    no_scorer: bool,
    normal_only: bool,
}

async fn run_detect(args: DetectArgs, cancel: CancellationToken) -> Result<()> {
    let mut detection_config = config::get().clone();
    if args.normal_only {
        detection_config.scorer.normal_only = true;
    }

    let mode = if args.no_scorer || !detection_config.scorer.enabled {
        ScorerMode::Disabled
    } else if let Some(path) = &args.model {
        ScorerMode::Pretrained(load_model(path)?)
    } else {
        ScorerMode::TrainOnBatch
    };
    let orchestrator = DetectionOrchestrator::new(&detection_config).with_scorer_mode(mode);

    let raw = load_readings(&args.input)?;

    // Detection is CPU-bound; keep it off the async workers
    let run_cancel = cancel.clone();
    let outcome = tokio::task::spawn_blocking(move || orchestrator.run_raw(raw, &run_cancel))
        .await
        .context("Detection task panicked")??;

    if let DetectionOutcome::Partial {
        completed_zones,
        skipped_zones,
        ..
    } = &outcome
    {
        warn!(
            completed = completed_zones.len(),
            skipped = ?skipped_zones,
            "Run was cancelled; output covers completed zones only"
        );
    }

    let complete = outcome.is_complete();
    let report = outcome.into_report();
    write_records(&report.records, args.output.as_deref())?;

    if let Some(path) = &args.save_model {
        match (&report.trained_model, complete) {
            (Some(model), true) => save_model(model, path)?,
            (Some(_), false) => warn!(path = %path.display(), "Partial run, model not saved"),
            (None, _) => warn!(path = %path.display(), "No model was trained, nothing to save"),
        }
    }

    eprintln!("{}", report.summary());
    if !complete {
        anyhow::bail!("Detection cancelled before completion");
    }
    Ok(())
}

fn run_check_config(path: Option<&Path>) -> Result<()> {
    let (detection_config, provenance) = match path {
        Some(p) => DetectionConfig::load_from_file_with_provenance(p)
            .with_context(|| format!("Invalid config {}", p.display()))?,
        None => DetectionConfig::load_with_provenance(),
    };
    match &provenance.source {
        Some(src) => println!("# Source: {}", src.display()),
        None => println!("# Source: built-in defaults"),
    }
    println!("# {} key(s) set explicitly", provenance.explicit_keys.len());
    print!("{}", detection_config.to_toml()?);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let command = match args.command {
        SubCommand::CheckConfig => return run_check_config(args.config.as_deref()),
        SubCommand::Detect {
            input,
            output,
            model,
            save_model,
            no_scorer,
            normal_only,
        } => DetectArgs {
            input,
            output,
            model,
            save_model,
            no_scorer,
            normal_only,
        },
    };

    // Load detection configuration
    let detection_config = match &args.config {
        Some(path) => DetectionConfig::load_from_file(path)
            .with_context(|| format!("Invalid config {}", path.display()))?,
        None => DetectionConfig::load(),
    };
    config::init(detection_config);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, cancelling remaining zones...");
        shutdown_token.cancel();
    });

    run_detect(command, cancel_token).await
}
