use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use ipclink_transport::{peer_credentials, socket_path_in, TransportError, UnixDomainSocket};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::runtime::IpcRuntime;

/// How long one accept waits before checking for a stop request.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

type Bound = std::result::Result<PathBuf, TransportError>;

/// Accepts worker connections on a background thread.
///
/// Every accepted connection becomes a new endpoint named after
/// [`ChannelConfig::accept_role`](crate::ChannelConfig::accept_role),
/// connected and registered with the runtime; the connection reference
/// keeps it alive until the worker hangs up.
///
/// The runtime owns the socket file, so it is also removed when a hangup
/// exits the process. Dropping the listener stops the accept thread and
/// removes the file.
pub struct Listener {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    runtime: IpcRuntime,
}

/// Hands the bind result from the accept thread to the spawning thread.
#[derive(Default)]
struct Ready {
    slot: Mutex<Option<Bound>>,
    cond: Condvar,
}

impl Ready {
    fn publish(&self, bound: Bound) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(bound);
        self.cond.notify_one();
    }

    fn wait(&self) -> Bound {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(bound) = slot.take() {
                return bound;
            }
            slot = self.cond.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Listener {
    /// Bind a generated socket path and start accepting.
    ///
    /// Returns once the socket is bound, so the path can be handed to
    /// workers right away.
    pub fn spawn(runtime: &IpcRuntime) -> Result<Self> {
        let ready = Arc::new(Ready::default());
        let stop = Arc::new(AtomicBool::new(false));

        let thread_ready = Arc::clone(&ready);
        let thread_stop = Arc::clone(&stop);
        let thread_runtime = runtime.clone();
        thread::Builder::new()
            .name("ipclink-accept".to_string())
            .spawn(move || accept_loop(thread_runtime, thread_ready, thread_stop))?;

        let path = ready.wait()?;
        Ok(Self {
            path,
            stop,
            runtime: runtime.clone(),
        })
    }

    /// Socket path workers connect to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.runtime.release_socket_file(&self.path);
    }
}

fn bind(runtime: &IpcRuntime) -> ipclink_transport::Result<UnixDomainSocket> {
    let config = runtime.config();
    let path = socket_path_in(&config.socket_dir(), &config.app_name)?;
    UnixDomainSocket::bind(path)
}

fn accept_loop(runtime: IpcRuntime, ready: Arc<Ready>, stop: Arc<AtomicBool>) {
    let mut socket = match bind(&runtime) {
        Ok(socket) => socket,
        Err(err) => {
            ready.publish(Err(err));
            return;
        }
    };
    let path = socket.path().to_path_buf();
    if let Some(guard) = socket.take_guard() {
        runtime.own_socket_file(guard);
    }
    ready.publish(Ok(path.clone()));
    drop(ready);
    info!(path = %path.display(), "listening for workers");

    while !stop.load(Ordering::Acquire) {
        let stream = match socket.accept_timeout(ACCEPT_POLL) {
            Ok(Some(stream)) => stream,
            Ok(None) => continue,
            Err(err) => {
                error!(error = %err, "accept failed, listener stopping");
                break;
            }
        };
        if stop.load(Ordering::Acquire) {
            break;
        }

        let peer_pid = peer_credentials(&stream).map(|creds| creds.pid);
        let endpoint = runtime.endpoint(runtime.config().accept_role.clone());
        match endpoint.connect_to_socket(stream) {
            Ok(()) => info!(
                endpoint = endpoint.name(),
                id = endpoint.id(),
                ?peer_pid,
                "accepted worker connection"
            ),
            Err(err) => warn!(?peer_pid, error = %err, "failed to set up accepted connection"),
        }
    }
    debug!(path = %path.display(), "accept thread exiting");
}
