use std::fs;

use bytes::Bytes;
use ipclink_channel::{connect_endpoint, ChannelConfig, Dispatcher, IpcRuntime};

use crate::cmd::SendArgs;
use crate::exit::{channel_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_sent, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let payload_size = payload.len();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    let config = ChannelConfig {
        connect_attempts: args.attempts,
        connect_retry_delay: args.retry_delay,
        ..ChannelConfig::default()
    };
    let runtime = IpcRuntime::new(config, Dispatcher::new(), rt.handle().clone());
    let endpoint = runtime.endpoint(args.name.clone());

    // queued until the connection exists
    endpoint.send(args.kind, (!payload.is_empty()).then_some(payload));
    connect_endpoint(&endpoint, &args.path)
        .map_err(|err| channel_error("connect failed", err))?;
    runtime.shutdown();

    print_sent(args.kind, payload_size, &args.path, format);
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Bytes> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(Bytes::from(json.clone()));
    }
    if let Some(data) = &args.data {
        return Ok(Bytes::from(data.clone()));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map(Bytes::from)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Bytes::new())
}
