//! Receive driver: one task per connected endpoint.
//!
//! The task waits for readability, lets [`FrameDecoder`] pull what the
//! socket has, and routes each completed message. It is also woken to
//! dispatch messages a cancelled selective receive held back. EOF or a
//! hard error takes the hangup path.

use std::io::{self, ErrorKind, Read};
use std::process;

use ipclink_frame::{FrameDecoder, FrameError, Message, ReadStatus};
use tokio::net::UnixStream;
use tracing::{debug, error, info};

use crate::config::HangupPolicy;
use crate::endpoint::Endpoint;

/// Adapts a tokio stream to the non-blocking [`Read`] the decoder expects.
struct TryRead<'a>(&'a UnixStream);

impl Read for TryRead<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_read(buf)
    }
}

/// Drive receives for `endpoint` until the peer hangs up.
///
/// `endpoint` is the connection reference; it is released when this
/// returns. Cancelled by [`Endpoint::disconnect`].
pub(crate) async fn drive(endpoint: Endpoint, stream: UnixStream, generation: u64) {
    let runtime = endpoint.runtime_inner().clone();
    let mut decoder = FrameDecoder::with_config(&runtime.config.frame);

    let failure = loop {
        tokio::select! {
            ready = stream.readable() => {
                if let Err(err) = ready {
                    break Some(FrameError::Io(err));
                }
            }
            () = endpoint.flush_requested() => {
                while let Some(message) = next_deferred(&endpoint).await {
                    runtime.dispatcher.dispatch(&endpoint, &message);
                }
                continue;
            }
        }
        match decoder.read_from(&mut TryRead(&stream)) {
            Ok(ReadStatus::Pending) => {}
            Ok(ReadStatus::Closed) => break None,
            Ok(ReadStatus::Message(message)) => {
                if let Some(message) = endpoint.route_incoming(message) {
                    runtime.dispatcher.dispatch(&endpoint, &message);
                }
                while let Some(message) = next_deferred(&endpoint).await {
                    runtime.dispatcher.dispatch(&endpoint, &message);
                }
            }
            Err(err) => break Some(err),
        }
    };

    match &failure {
        None => info!(endpoint = endpoint.name(), "peer hung up"),
        Some(FrameError::Io(err)) if err.kind() == ErrorKind::ConnectionReset => {
            debug!(endpoint = endpoint.name(), error = %err, "connection reset by peer");
        }
        Some(err) => error!(endpoint = endpoint.name(), error = %err, "receive failed"),
    }

    let Some(held) = endpoint.hangup(generation) else {
        return;
    };
    for message in &held {
        runtime.dispatcher.dispatch(&endpoint, message);
    }
    runtime.dispatcher.hangup(&endpoint);
    if runtime.config.hangup_policy == HangupPolicy::ExitProcess {
        error!(endpoint = endpoint.name(), "lost connection, exiting");
        runtime.remove_socket_files();
        process::exit(1);
    }
}

/// Give the task that completed a selective receive a turn, then hand
/// out the next held-back message.
async fn next_deferred(endpoint: &Endpoint) -> Option<Message> {
    if endpoint.deferred_len() == 0 {
        return None;
    }
    tokio::task::yield_now().await;
    endpoint.next_deferred()
}
