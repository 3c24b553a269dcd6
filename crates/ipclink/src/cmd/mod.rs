use clap::{Args, Subcommand};
use ipclink_frame::MessageType;
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen as the UI process and print messages from workers.
    Listen(ListenArgs),
    /// Connect as a worker and send a single message.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Directory for the generated socket path. Default: system temp dir.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
    /// Application name used in the socket path.
    #[arg(long, default_value = "ipclink")]
    pub app: String,
    /// Only print these message types (comma-separated).
    #[arg(long, value_delimiter = ',', value_parser = parse_message_type)]
    pub types: Option<Vec<MessageType>>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit with status 1 as soon as any worker hangs up.
    #[arg(long)]
    pub exit_on_hangup: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path of the listening UI process.
    pub path: PathBuf,
    /// Message type (e.g. log, scroll, eval_js).
    #[arg(long = "type", short = 't', default_value = "ipc", value_parser = parse_message_type)]
    pub kind: MessageType,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Endpoint name used in logs.
    #[arg(long, default_value = "UI")]
    pub name: String,
    /// Connection attempts before giving up.
    #[arg(long, default_value_t = 5)]
    pub attempts: u32,
    /// Delay between connection attempts (e.g. 1s, 100ms).
    #[arg(long, default_value = "100ms", value_parser = parse_duration)]
    pub retry_delay: Duration,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_message_type(input: &str) -> Result<MessageType, String> {
    MessageType::from_name(input.trim()).ok_or_else(|| {
        let known: Vec<_> = MessageType::ALL.iter().map(|kind| kind.name()).collect();
        format!("unknown message type '{input}' (expected one of: {})", known.join(", "))
    })
}

pub fn parse_duration(input: &str) -> Result<Duration, String> {
    parse_duration_checked(input).map_err(|err| err.message)
}

fn parse_duration_checked(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
