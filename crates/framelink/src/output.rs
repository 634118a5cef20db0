use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framelink_bridge::BridgeStats;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    port: &'a str,
    payload_size: usize,
    payload: String,
    payload_hex: String,
    timestamp: String,
}

pub fn print_frame(payload: &[u8], port: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                port,
                payload_size: payload.len(),
                payload: payload_preview(payload),
                payload_hex: hex(payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "SIZE", "PAYLOAD", "HEX"])
                .add_row(vec![
                    port.to_string(),
                    payload.len().to_string(),
                    payload_preview(payload),
                    hex(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "port={} size={} payload={}",
                port,
                payload.len(),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

#[derive(Serialize)]
struct StatsOutput<'a> {
    primary: &'a str,
    secondaries: &'a [String],
    #[serde(flatten)]
    stats: &'a BridgeStats,
}

pub fn print_stats(stats: &BridgeStats, primary: &str, secondaries: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let out = StatsOutput {
                primary,
                secondaries,
                stats,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METRIC", "VALUE"])
                .add_row(vec!["primary".to_string(), primary.to_string()])
                .add_row(vec!["secondaries".to_string(), secondaries.join(", ")])
                .add_row(vec!["cycles".to_string(), stats.cycles.to_string()])
                .add_row(vec!["idle cycles".to_string(), stats.idle_cycles.to_string()])
                .add_row(vec![
                    "bytes primary -> secondaries".to_string(),
                    stats.bytes_downstream.to_string(),
                ])
                .add_row(vec![
                    "bytes secondaries -> primary".to_string(),
                    stats.bytes_upstream.to_string(),
                ])
                .add_row(vec![
                    "transient errors".to_string(),
                    stats.transient_errors.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "cycles={} down={} up={} errors={}",
                stats.cycles, stats.bytes_downstream, stats.bytes_upstream, stats.transient_errors
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

pub fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
