use std::fmt::Write as _;
use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfolink_session::{Discovered, GatewayStatus, InboundMessage, RegisteredApp};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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
struct MessageOutput<'a> {
    kind: u16,
    kind_name: &'static str,
    status: GatewayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<u32>,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_message(message: &InboundMessage, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                kind: message.kind,
                kind_name: message.kind_name(),
                status: message.status,
                description: message.description.as_deref(),
                reference: message.reference,
                payload_size: message.payload.len(),
                payload: hex(&message.payload),
                timestamp: unix_seconds(message.received_at),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "STATUS", "REF", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    format!("{} ({})", message.kind_name(), message.kind),
                    message.status.to_string(),
                    message
                        .reference
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    message.payload.len().to_string(),
                    hex(&message.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "kind={} ({}) status={} size={} payload={}",
                message.kind,
                message.kind_name(),
                message.status,
                message.payload.len(),
                hex(&message.payload)
            );
        }
    }
}

#[derive(Serialize)]
struct DiscoveredOutput {
    address: String,
    port: u16,
    device_id: String,
    version: Option<u32>,
}

pub fn print_discovered(found: &Discovered, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DiscoveredOutput {
            address: found.address.to_string(),
            port: found.port,
            device_id: found.device_id.to_string(),
            version: found.version,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDRESS", "DEVICE ID", "VERSION"])
                .add_row(vec![
                    found.socket_addr().to_string(),
                    found.device_id.to_string(),
                    optional(found.version),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Gateway:");
            println!("  Address:   {}", found.socket_addr());
            println!("  Device ID: {}", found.device_id);
            println!("  Version:   {}", optional(found.version));
        }
    }
}

pub fn print_apps(apps: &[RegisteredApp], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&apps),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["APP ID", "NAME"]);
            for app in apps {
                table.add_row(vec![app.id.to_string(), app.device_name.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if apps.is_empty() {
                println!("no registered apps");
            }
            for app in apps {
                println!("{}  {}", app.id, app.device_name);
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn optional(value: Option<u32>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn unix_seconds(at: SystemTime) -> String {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
