//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Pretty-print any serializable value as JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color a health or outcome label
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "applied" | "up" => status.green().to_string(),
        "degraded" | "rejected" | "duplicate" | "down" => status.yellow().to_string(),
        "failed" | "stalled" => status.red().to_string(),
        "simulated" => status.cyan().to_string(),
        _ => status.to_string(),
    }
}

/// Percentage with one decimal, or a dash when unknown
pub fn format_percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}%", v))
        .unwrap_or_else(|| "-".to_string())
}

/// RFC 3339 timestamp as `YYYY-MM-DD HH:MM:SS`, or a dash when absent
pub fn format_timestamp(ts: Option<&str>) -> String {
    match ts {
        Some(ts) => chrono::DateTime::parse_from_rfc3339(ts)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|_| ts.to_string()),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(Some(71.24)), "71.2%");
        assert_eq!(format_percent(None), "-");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(Some("2024-05-01T12:30:45.123Z")),
            "2024-05-01 12:30:45"
        );
        assert_eq!(format_timestamp(Some("not a time")), "not a time");
        assert_eq!(format_timestamp(None), "-");
    }
}
