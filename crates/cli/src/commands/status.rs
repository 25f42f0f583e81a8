//! Service status commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ServiceStatus, StatusSnapshot};
use crate::output::{
    color_status, format_percent, format_timestamp, print_info, print_json, print_warning,
    OutputFormat,
};

/// Row for the services table
#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    name: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "Algorithm")]
    algorithm: String,
    #[tabled(rename = "CPU avg")]
    cpu: String,
    #[tabled(rename = "Mem avg")]
    memory: String,
    #[tabled(rename = "Last action")]
    last_action: String,
    #[tabled(rename = "Cooldown until")]
    cooldown: String,
}

impl From<&ServiceStatus> for ServiceRow {
    fn from(s: &ServiceStatus) -> Self {
        let last_action = match (&s.last_direction, &s.last_outcome) {
            (Some(direction), Some(outcome)) if direction != "none" => {
                format!("{} ({})", color_status(direction), color_status(outcome))
            }
            _ => "-".to_string(),
        };
        let sample = if s.last_sample_valid {
            String::new()
        } else {
            format!(" {}", "no data".red())
        };

        Self {
            name: format!("{}{}", s.name, sample),
            replicas: format!("{} [{}-{}]", s.replicas, s.min_replicas, s.max_replicas),
            algorithm: s.algorithm.clone(),
            cpu: format_percent(s.cpu_average),
            memory: format_percent(s.memory_average),
            last_action,
            cooldown: format_timestamp(s.cooldown_until.as_deref()),
        }
    }
}

/// Show all services with loop progress
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let snapshot: StatusSnapshot = client.get("status").await?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => {
            let l = &snapshot.loop_status;
            println!("{}", "Autoscaler Status".bold());
            println!("{}", "=".repeat(60));
            println!("Ticks completed: {}", l.ticks_completed.to_string().cyan());
            println!("Interval:        {}s", l.interval_secs);
            println!(
                "Last tick:       {}",
                format_timestamp(l.last_tick_completed.as_deref())
            );
            if l.dry_run {
                print_info("Monitoring only: scale commands are logged, not sent; replicas are as last observed");
            }
            if l.stalled {
                print_warning("Control loop appears stalled");
            }
            println!();

            if snapshot.services.is_empty() {
                print_warning("No services reported yet");
                return Ok(());
            }

            let rows: Vec<ServiceRow> = snapshot.services.values().map(ServiceRow::from).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Show the detailed state of one service
pub async fn show_service(client: &ApiClient, service: &str, format: OutputFormat) -> Result<()> {
    let status: ServiceStatus = client.get(&format!("status/{}", service)).await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            println!("{}", "Service Status".bold());
            println!("{}", "=".repeat(60));
            println!("Service:        {}", status.name.cyan());
            println!(
                "Replicas:       {} (min {}, max {})",
                status.replicas.to_string().bold(),
                status.min_replicas,
                status.max_replicas
            );
            println!("Algorithm:      {}", status.algorithm);
            println!("CPU average:    {}", format_percent(status.cpu_average));
            println!("Memory average: {}", format_percent(status.memory_average));
            println!(
                "Last sample:    {}",
                if status.last_sample_valid {
                    "valid".green()
                } else {
                    "invalid".red()
                }
            );
            println!();
            println!(
                "Last decision:  {}",
                status
                    .last_direction
                    .as_deref()
                    .map(color_status)
                    .unwrap_or_else(|| "-".to_string())
            );
            println!(
                "Reason:         {}",
                status.last_reason.as_deref().unwrap_or("-")
            );
            println!(
                "Outcome:        {}",
                status
                    .last_outcome
                    .as_deref()
                    .map(color_status)
                    .unwrap_or_else(|| "-".to_string())
            );
            println!(
                "Last scaled:    {}",
                format_timestamp(status.last_scaled_at.as_deref())
            );
            println!(
                "Cooldown until: {}",
                format_timestamp(status.cooldown_until.as_deref())
            );
            if let Some(error) = &status.last_error {
                println!();
                println!(
                    "Last failure:   {} at {}",
                    error.red(),
                    format_timestamp(status.last_failed_at.as_deref())
                );
            }
        }
    }

    Ok(())
}
