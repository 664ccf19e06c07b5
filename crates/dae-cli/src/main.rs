//! dae - deterministic assessment engine CLI
//!
//! Runs a configured engine over a JSON dataset snapshot, verifies stored
//! reports and lists configured engines.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// dae - deterministic assessment engine
#[derive(Parser, Debug)]
#[command(name = "dae")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "DAE_LOG", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an engine over a dataset snapshot
    Run(commands::run::RunArgs),

    /// Re-verify a stored report for tampering
    Verify {
        /// Path to a report written by `dae run`
        #[arg(long)]
        report: PathBuf,
    },

    /// List configured engines
    Engines {
        /// Path to the engine configuration file
        #[arg(short, long, default_value = "dae.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(&args),
        Commands::Verify { report } => commands::verify::run(&report).map(|()| ExitCode::SUCCESS),
        Commands::Engines { config } => {
            commands::engines::run(&config).map(|()| ExitCode::SUCCESS)
        },
    }
}
