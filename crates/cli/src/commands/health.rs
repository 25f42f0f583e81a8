//! Daemon health command

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, HealthResponse};
use crate::output::{color_status, format_timestamp, print_json, print_success, print_warning, OutputFormat};

/// Show daemon health; returns false when the daemon reports degraded
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<bool> {
    let (code, health): (_, HealthResponse) = client.get_any("healthz").await?;
    let healthy = code.is_success();

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("{}", "Autoscaler Health".bold());
            println!("{}", "=".repeat(60));
            println!("Status:    {}", color_status(&health.status));
            println!(
                "Last tick: {}",
                format_timestamp(health.last_tick_completed.as_deref())
            );
            println!();
            if healthy {
                print_success("Control loop is ticking on schedule");
            } else {
                print_warning(health.message.as_deref().unwrap_or("Autoscaler is degraded"));
            }
        }
    }

    Ok(healthy)
}
