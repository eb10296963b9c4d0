//! Courier command-line entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Courier - encrypted worker for ledger job marketplaces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ./courier.toml, then ~/.courier/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap the identity and run both poll timers until Ctrl-C
    Run(commands::run::RunCommand),

    /// Generate a fresh identity seed
    Keygen,

    /// Fetch an object through the configured gateways
    Fetch(commands::inspect::FetchCommand),

    /// Print the locator for a hex digest, or the digest behind a locator
    Locator {
        /// 64-character hex digest or `Qm...` locator
        value: String,
    },

    /// Load and validate the configuration without starting anything
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run(cmd) => commands::run::run(cmd, config).await?,
        Commands::Keygen => commands::keygen::run()?,
        Commands::Fetch(cmd) => commands::inspect::fetch(cmd, config).await?,
        Commands::Locator { value } => commands::inspect::locator(&value)?,
        Commands::CheckConfig => commands::config::check(config)?,
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
