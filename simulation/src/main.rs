//! MANET simulator command line
//!
//! Runs the built-in DSR scenarios and renders topologies.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use manet_dsr::DsrConfig;
use manet_logging::{LogConfig, SubscriberBuilder};
use manet_simulation::{Scenario, SimConfig, TopologyBuilder, TopologyKind, run_scenario};

#[derive(Parser)]
#[command(
    name = "manet-sim",
    about = "Discrete-event simulation of Dynamic Source Routing",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// JSON file with `dsr` and `simulation` settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Send buffer packet limit
    #[arg(long, global = true)]
    buffer_max_packets: Option<usize>,

    /// Send buffer byte limit (0 limits by packet count)
    #[arg(long, global = true)]
    buffer_max_bytes: Option<usize>,

    /// Seed for traffic, random topologies and jitter
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print its report
    Run {
        #[arg(value_enum)]
        scenario: Scenario,
    },

    /// Build and print a topology
    Topology {
        #[arg(value_enum, default_value = "ring")]
        kind: TopologyKind,

        /// Number of nodes
        #[arg(short, long, default_value = "6")]
        nodes: usize,

        /// Link probability for random topologies
        #[arg(short, long, default_value = "0.4")]
        probability: f64,
    },
}

/// Settings file layout
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    dsr: DsrConfig,
    simulation: SimConfig,
}

fn load_config(path: &Path) -> anyhow::Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::development()
    } else {
        LogConfig {
            default_level: "info".to_string(),
            ..LogConfig::development()
        }
    };
    let _guard = SubscriberBuilder::new().with_config(log_config).init();

    let mut settings = match &cli.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };
    if let Some(max_packets) = cli.buffer_max_packets {
        settings.dsr.send_buffer.max_packets = max_packets;
    }
    if let Some(max_bytes) = cli.buffer_max_bytes {
        settings.dsr.send_buffer.max_bytes = max_bytes;
    }
    if let Some(seed) = cli.seed {
        settings.simulation.seed = seed;
    }
    settings.dsr.validate().context("invalid DSR configuration")?;

    match cli.command {
        Commands::Run { scenario } => {
            let report = run_scenario(scenario, &settings.dsr, settings.simulation)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.summary());
            }
        }
        Commands::Topology {
            kind,
            nodes,
            probability,
        } => {
            let topology = TopologyBuilder::new(nodes)?.build(
                kind,
                probability,
                settings.simulation.seed,
            )?;
            println!("{}", topology.visualize());
        }
    }

    Ok(())
}
