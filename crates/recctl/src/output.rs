//! Output formatting utilities

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print records as JSON, or as a table built from `to_row`
pub fn print_records<T, R, F>(items: &[T], format: OutputFormat, empty: &str, to_row: F) -> Result<()>
where
    T: Serialize,
    R: Tabled,
    F: Fn(&T) -> R,
{
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
        OutputFormat::Table => {
            if items.is_empty() {
                print_warning(empty);
                return Ok(());
            }
            let rows: Vec<R> = items.iter().map(to_row).collect();
            println!("{}", Table::new(rows).with(Style::rounded()).to_string());
        }
    }
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}Gi", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}Mi", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}Ki", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Format millicores as human-readable string
pub fn format_cpu(millicores: i64) -> String {
    if millicores >= 1000 {
        format!("{:.1}", millicores as f64 / 1000.0)
    } else {
        format!("{}m", millicores)
    }
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Color a timeframe status
pub fn color_status(status: &str) -> String {
    match status {
        "on" => status.green().to_string(),
        "off" => status.dimmed().to_string(),
        _ => status.to_string(),
    }
}

/// Parse an RFC 3339 timestamp or `YYYY-MM-DD HH:MM:SS` in UTC
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        Ok(naive) => Ok(naive.and_utc()),
        Err(_) => bail!(
            "invalid timestamp '{}': expected RFC 3339 or YYYY-MM-DD HH:MM:SS",
            value
        ),
    }
}
