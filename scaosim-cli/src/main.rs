//! scaosim CLI - launcher for the adaptive-optics loop roles.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scaosim_core::config::ScaoConfig;
use scaosim_runtime::observability::{TracingConfig, TracingGuard, init_tracing};
use std::path::PathBuf;

/// scaosim - simulated single-conjugate adaptive optics over shared memory.
#[derive(Parser)]
#[command(name = "scaosim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the shared segments
    #[arg(long, global = true)]
    shm_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hardware simulator (writes slopes, true_phase, valid_subaps)
    Simulate {
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },

    /// Run the reconstructor (reads slopes, writes reconstructed_phase)
    Reconstruct {
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },

    /// Run the performance monitor (reads true_phase, reconstructed_phase)
    Monitor {
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },

    /// Show segment headers and generations without attaching
    Inspect {
        /// Channel to inspect (all channels if omitted)
        channel: Option<String>,
    },

    /// Remove segment backing files
    Release {
        /// Channel to release
        #[arg(required_unless_present = "all")]
        channel: Option<String>,

        /// Release every channel
        #[arg(long, conflicts_with = "channel")]
        all: bool,
    },

    /// Print the effective configuration as YAML
    Config,

    /// Show version information
    Version,
}

impl Commands {
    fn service_name(&self) -> &'static str {
        match self {
            Self::Simulate { .. } => "simulator",
            Self::Reconstruct { .. } => "reconstructor",
            Self::Monitor { .. } => "monitor",
            _ => "scaosim",
        }
    }
}

fn setup_logging(verbosity: u8, service_name: &str) -> Result<TracingGuard> {
    let config = TracingConfig::from_env()
        .into_builder()
        .service_name(service_name)
        .verbosity(verbosity)
        .build();
    init_tracing(config)
}

/// Load, override and validate the configuration.
fn load_config(path: Option<&PathBuf>, shm_dir: Option<PathBuf>) -> Result<ScaoConfig> {
    let mut config = match path {
        Some(path) => ScaoConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ScaoConfig::default(),
    };
    if let Some(dir) = shm_dir {
        config.segments.directory = dir;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing_guard = setup_logging(cli.verbose, cli.command.service_name())?;

    if let Commands::Version = cli.command {
        return commands::version::run();
    }

    let config = load_config(cli.config.as_ref(), cli.shm_dir)?;

    match cli.command {
        Commands::Simulate { cycles } => commands::roles::simulate(config, cycles).await,
        Commands::Reconstruct { cycles } => commands::roles::reconstruct(config, cycles).await,
        Commands::Monitor { cycles } => commands::roles::monitor(config, cycles).await,
        Commands::Inspect { channel } => commands::inspect::run(&config, channel.as_deref()),
        Commands::Release { channel, all } => {
            commands::release::run(&config, channel.as_deref(), all)
        }
        Commands::Config => commands::config::run(&config),
        Commands::Version => commands::version::run(),
    }
}
