//! Tier autoscaler CLI
//!
//! A command-line tool for inspecting service replica state and the
//! health of a running autoscaler daemon.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, status};

/// Tier autoscaler CLI
#[derive(Parser)]
#[command(name = "scalectl")]
#[command(author, version, about = "CLI for the Tier Autoscaler", long_about = None)]
pub struct Cli {
    /// Autoscaler API URL (can also be set via SCALECTL_API_URL env var)
    #[arg(long, env = "SCALECTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show replica state for all services, or one service in detail
    Status {
        /// Service name
        service: Option<String>,
    },

    /// Check whether the control loop is ticking on schedule
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Status { service: None } => {
            status::show_status(&client, cli.format).await?;
        }
        Commands::Status {
            service: Some(service),
        } => {
            status::show_service(&client, &service, cli.format).await?;
        }
        Commands::Health => {
            if !health::show_health(&client, cli.format).await? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
