//! CLI entry point for l2mps-bsa
//!
//! # Usage
//!
//! Start the configured streams and accept console commands on stdin:
//! ```bash
//! l2mps-bsa run --config config/l2mps_bsa.toml
//! ```
//!
//! Print the effective configuration (file merged with `L2MPS_BSA_*`):
//! ```bash
//! l2mps-bsa dump-config
//! ```
//!
//! List the archived channel names for a record prefix:
//! ```bash
//! l2mps-bsa channels --prefix MPLN:LI21:MP01
//! ```

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use l2mps_bsa::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use l2mps_bsa::{logging, registry, Console, DefaultStreamFactory};

#[derive(Parser)]
#[command(name = "l2mps-bsa")]
#[command(about = "LCLS1 BSA bridge for the LCLS2 MPS Link Node", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the configured streams and read console commands from stdin
    Run,

    /// Print the effective configuration as TOML
    DumpConfig,

    /// List the archived channel names for a record prefix
    Channels {
        /// Record prefix
        #[arg(long)]
        prefix: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run(load_config(&cli.config)?),
        Commands::DumpConfig => {
            print!("{}", load_config(&cli.config)?.to_toml()?);
            Ok(())
        }
        Commands::Channels { prefix } => {
            for name in registry::channel_names(&prefix) {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<BridgeConfig> {
    let config = BridgeConfig::load_from(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    config.validate().map_err(|e| anyhow!(e))?;
    Ok(config)
}

fn run(config: BridgeConfig) -> Result<()> {
    logging::init_from_config(&config).map_err(|e| anyhow!(e))?;
    info!(name = %config.application.name, streams = config.streams.len(), "Starting bridge");

    let factory = DefaultStreamFactory::new(config.archive.clone());
    let mut console = Console::new(Box::new(factory));

    for stream in config.stream_configs()? {
        console
            .start(stream)
            .context("Failed to start configured stream")?;
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim() == "exit" {
            break;
        }
        match console.execute(&line) {
            Ok(output) if output.is_empty() => {}
            Ok(output) => writeln!(stdout, "{output}")?,
            Err(e) => {
                warn!(command = %line.trim(), "Console command failed: {}", e);
                eprintln!("{e}");
            }
        }
        stdout.flush()?;
    }

    let stopped = console.stop_all();
    info!(stopped, "Bridge shutting down");
    Ok(())
}
