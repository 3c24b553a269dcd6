use std::io::{IsTerminal, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ipclink_frame::{Message, MessageType};
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
struct MessageOutput<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    tag: u32,
    payload_size: usize,
    payload: Option<String>,
    endpoint: &'a str,
    endpoint_id: u64,
    timestamp: String,
}

#[derive(Serialize)]
struct SentOutput<'a> {
    sent: bool,
    #[serde(rename = "type")]
    kind: &'static str,
    payload_size: usize,
    socket_path: &'a str,
}

/// The socket path always goes out as a bare first line so scripts can
/// read it before any message output.
pub fn print_socket_path(path: &Path) {
    let mut out = std::io::stdout();
    let _ = writeln!(out, "{}", path.display());
    let _ = out.flush();
}

pub fn print_message(message: &Message, endpoint: &str, endpoint_id: u64, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                kind: message.kind.name(),
                tag: message.kind.bit(),
                payload_size: message.len(),
                payload: message.payload.as_deref().map(payload_preview),
                endpoint,
                endpoint_id,
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
                .set_header(vec!["TYPE", "SIZE", "ENDPOINT", "PAYLOAD"])
                .add_row(vec![
                    message.kind.name().to_string(),
                    message.len().to_string(),
                    format!("{endpoint}#{endpoint_id}"),
                    message.payload.as_deref().map_or_else(String::new, payload_preview),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} (0x{:02x}) size={} endpoint={}#{} payload={}",
                message.kind,
                message.kind.bit(),
                message.len(),
                endpoint,
                endpoint_id,
                message.payload.as_deref().map_or_else(|| "-".to_string(), payload_preview)
            );
        }
        OutputFormat::Raw => {
            print_raw(message.payload_bytes());
        }
    }
    let _ = std::io::stdout().flush();
}

pub fn print_sent(kind: MessageType, payload_size: usize, path: &Path, format: OutputFormat) {
    let socket_path = path.display().to_string();
    match format {
        OutputFormat::Json => {
            let out = SentOutput {
                sent: true,
                kind: kind.name(),
                payload_size,
                socket_path: &socket_path,
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
                .set_header(vec!["SENT", "TYPE", "SIZE", "SOCKET"])
                .add_row(vec![
                    "yes".to_string(),
                    kind.name().to_string(),
                    payload_size.to_string(),
                    socket_path,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("sent type={kind} size={payload_size} socket={socket_path}");
        }
        OutputFormat::Raw => {}
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

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_marks_binary_payloads() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }

    #[test]
    fn json_output_names_the_type() {
        let out = MessageOutput {
            kind: MessageType::EvalJs.name(),
            tag: MessageType::EvalJs.bit(),
            payload_size: 0,
            payload: None,
            endpoint: "UI",
            endpoint_id: 1,
            timestamp: "0".to_string(),
        };
        let json = serde_json::to_string(&out).expect("output should serialize");
        assert!(json.contains("\"type\":\"eval_js\""));
        assert!(json.contains("\"tag\":16"));
        assert!(json.contains("\"payload\":null"));
    }
}
