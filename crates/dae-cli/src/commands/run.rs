//! `dae run`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::Args;
use dae_core::audit::{Clock, FixedClock, SystemClock};
use dae_core::determinism::canonical_json;
use dae_core::orchestrator::EngineService;
use dae_core::store::MemoryStore;
use dae_core::{DaeConfig, EngineRegistry, RunRequest, RunStatus};
use serde_json::Value;
use tracing::info;

use super::atomic_write;

/// Exit code for a completed run whose status is failed or degraded.
pub const EXIT_ASSESSMENT_FAILED: u8 = 2;

/// Arguments for `dae run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the engine configuration file
    #[arg(short, long, default_value = "dae.toml")]
    pub config: PathBuf,

    /// Engine to run
    #[arg(short, long)]
    pub engine: String,

    /// Dataset version id of the snapshot
    #[arg(long)]
    pub dataset_version: String,

    /// JSON payload of the snapshot
    #[arg(long)]
    pub payload: PathBuf,

    /// Run start time (RFC 3339); defaults to now
    #[arg(long)]
    pub started_at: Option<DateTime<Utc>>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Run parameter as key=value; the value is parsed as JSON when possible
    #[arg(short, long = "parameter", value_parser = parse_parameter)]
    pub parameters: Vec<(String, Value)>,
}

/// Runs the engine and emits the canonical report.
pub fn run(args: &RunArgs) -> Result<ExitCode> {
    let config = DaeConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let payload = read_payload(&args.payload)?;

    let (started_at, clock): (DateTime<Utc>, Arc<dyn Clock>) = match args.started_at {
        Some(at) => (at, Arc::new(FixedClock(at))),
        None => (Utc::now(), Arc::new(SystemClock)),
    };

    let registry = EngineRegistry::from_config_with_clock(&config, clock)?;
    let service = EngineService::new(registry.runner(&args.engine)?, MemoryStore::new());

    let request = args.parameters.iter().fold(
        RunRequest::new(args.dataset_version.clone(), payload, started_at),
        |request, (key, value)| request.with_parameter(key.clone(), value.clone()),
    );
    let report = service.run(&request)?;

    let bytes = canonical_json(&report).context("encoding report")?;
    match &args.out {
        Some(path) => {
            atomic_write(path, &bytes)?;
            info!(path = %path.display(), run_id = %report.run_id, "report written");
        },
        None => println!("{}", String::from_utf8_lossy(&bytes)),
    }

    Ok(exit_code(report.status))
}

fn read_payload(path: &Path) -> Result<Value> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Failed | RunStatus::Degraded => ExitCode::from(EXIT_ASSESSMENT_FAILED),
        _ => ExitCode::SUCCESS,
    }
}

fn parse_parameter(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected key=value, got `{raw}`");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("parameter key is empty in `{raw}`");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
