//! Worker process
//!
//! Loads the configuration, makes sure the directory publishes our key and
//! then drives the lifecycle timers until Ctrl-C or a timer task fails.

use anyhow::{Context, Result};
use clap::Args;
use courier_agent::{AgentBuilder, IdentityStatus};
use courier_core::CourierConfig;
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Args)]
pub struct RunCommand {
    /// Run one discovery pass and one active poll, print the state, and exit
    #[arg(long)]
    pub once: bool,
}

pub async fn run(cmd: RunCommand, config_path: Option<&Path>) -> Result<()> {
    let config = CourierConfig::load(config_path).context("loading configuration")?;
    let agent = AgentBuilder::new(config)
        .build()
        .context("assembling the agent")?;

    match agent
        .bootstrap_identity()
        .await
        .context("checking the published identity")?
    {
        IdentityStatus::Unregistered => {
            warn!("Identity is not registered; creators cannot open our messages")
        }
        status => info!(?status, "Identity ready"),
    }

    if cmd.once {
        let manager = agent.manager();
        let discovery = manager.discovery_tick().await?;
        let active = manager.active_tick().await?;
        info!(?discovery, ?active, "Single pass finished");
        println!("{}", serde_json::to_string_pretty(&manager.snapshot())?);
        return Ok(());
    }

    let exit = agent.start().run_until(shutdown_signal()).await?;
    info!(?exit, "Courier stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Cannot listen for Ctrl-C, shutting down");
    }
}
