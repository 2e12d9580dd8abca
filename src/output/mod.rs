pub mod reporter;

use chrono::{DateTime, Local};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::probe::ProbeOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    #[value(alias = "jsonl")]
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" | "jsonl" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") || lower.ends_with(".jsonl") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

// the Finding struct is one hit, as written to the output file
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub url: String,
    pub status: u16,
    pub content_length: usize,
    pub timestamp: DateTime<Local>,
}

impl Finding {
    pub fn from_outcome(outcome: &ProbeOutcome) -> Option<Self> {
        match outcome {
            ProbeOutcome::Found {
                url,
                status,
                content_length,
                timestamp,
            } => Some(Self {
                url: url.clone(),
                status: *status,
                content_length: *content_length,
                timestamp: *timestamp,
            }),
            _ => None,
        }
    }
}

pub fn clock() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

pub fn format_record_line(finding: &Finding) -> String {
    format!(
        "{} (STATUS CODE : {}) (CONTENT LENGTH : {})",
        finding.url, finding.status, finding.content_length
    )
}

pub fn format_found_line(finding: &Finding) -> String {
    format!(
        "[FOUND] [{}] {}",
        finding.timestamp.format("%H:%M:%S"),
        format_record_line(finding)
    )
}

/// One complete sink line, newline included.
pub fn render_record(finding: &Finding, format: OutputFormat) -> Vec<u8> {
    let mut out = match format {
        OutputFormat::Text => format_record_line(finding).into_bytes(),
        OutputFormat::Json => serde_json::to_vec(finding)
            .unwrap_or_else(|_| format_record_line(finding).into_bytes()),
    };
    out.push(b'\n');
    out
}

pub fn found_line(finding: &Finding) -> String {
    format_found_line(finding).green().to_string()
}

pub fn info_line(message: &str) -> String {
    format!("[INFO] [{}] {}", clock(), message).blue().to_string()
}

pub fn error_line(message: &str) -> String {
    format!("[ERROR] [{}] {}", clock(), message).red().to_string()
}
