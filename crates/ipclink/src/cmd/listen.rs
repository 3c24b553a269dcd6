use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use ipclink_channel::payload::{self, LogRecord};
use ipclink_channel::{ChannelConfig, Dispatcher, HangupPolicy, IpcRuntime};
use ipclink_frame::{Message, MessageType};
use tracing::{debug, info};

use crate::cmd::ListenArgs;
use crate::exit::{channel_error, io_error, CliError, CliResult, SUCCESS};
use crate::logging::forward_record;
use crate::output::{print_message, print_socket_path, OutputFormat};

struct Received {
    endpoint: String,
    endpoint_id: u64,
    message: Message,
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;

    let (tx, rx) = mpsc::channel();
    let dispatcher = collecting_dispatcher(tx);
    let config = ChannelConfig {
        app_name: args.app.clone(),
        socket_dir: args.dir.clone(),
        hangup_policy: if args.exit_on_hangup {
            HangupPolicy::ExitProcess
        } else {
            HangupPolicy::Release
        },
        ..ChannelConfig::default()
    };
    let runtime = IpcRuntime::new(config, dispatcher, rt.handle().clone());
    let listener = runtime
        .listen()
        .map_err(|err| channel_error("listen failed", err))?;
    print_socket_path(listener.path());

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let received = match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(received) => received,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Some(types) = &args.types {
            if !types.contains(&received.message.kind) {
                continue;
            }
        }

        print_message(
            &received.message,
            &received.endpoint,
            received.endpoint_id,
            format,
        );
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    info!(printed, connected = runtime.connected_count(), "listener stopping");
    drop(listener);
    runtime.shutdown();
    Ok(SUCCESS)
}

/// A dispatcher that forwards every message type to `tx`. Worker log
/// records are also re-emitted on stderr.
fn collecting_dispatcher(tx: mpsc::Sender<Received>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new().on_hangup(|endpoint| {
        info!(endpoint = endpoint.name(), id = endpoint.id(), "worker hung up");
    });
    for kind in MessageType::ALL {
        let tx = tx.clone();
        dispatcher = dispatcher.on(kind, move |endpoint, message| {
            if message.kind == MessageType::Log {
                match payload::decode::<LogRecord>(message) {
                    Ok(record) => forward_record(endpoint.name(), &record),
                    Err(err) => {
                        debug!(endpoint = endpoint.name(), error = %err, "unreadable log record")
                    }
                }
            }
            let _ = tx.send(Received {
                endpoint: endpoint.name().to_string(),
                endpoint_id: endpoint.id(),
                message: message.clone(),
            });
        });
    }
    dispatcher
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
