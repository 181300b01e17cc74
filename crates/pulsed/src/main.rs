//! pulsed — the pulsewatch daemon.
//!
//! Loads a TOML config, validates it fully, then runs one health worker
//! per service until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! pulsed run --config /etc/pulsewatch/config.toml
//! pulsed check --config /etc/pulsewatch/config.toml
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,pulsed=debug,pulse=debug";

#[derive(Parser)]
#[command(name = "pulsed", version, about = "HTTP endpoint health monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor every configured service until interrupted.
    Run {
        /// Path to the TOML configuration file.
        #[arg(long, short, default_value = "config.toml")]
        config: PathBuf,

        /// Log at debug level regardless of RUST_LOG.
        #[arg(long, short)]
        verbose: bool,

        /// Emit logs as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration and print a summary.
    Check {
        /// Path to the TOML configuration file.
        #[arg(long, short, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            verbose,
            json,
        } => {
            init_tracing(verbose, json);
            daemon::run(&config).await
        }
        Command::Check { config } => {
            init_tracing(false, false);
            daemon::check(&config)
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
