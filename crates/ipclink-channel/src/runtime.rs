use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use ipclink_frame::MessageType;
use ipclink_transport::SocketFileGuard;
use tokio::runtime::Handle;
use tracing::debug;

use crate::config::ChannelConfig;
use crate::connector;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::handler::Dispatcher;
use crate::listener::Listener;
use crate::registry::EndpointRegistry;
use crate::sender::SendWorker;

/// Process-wide channel context.
///
/// Owns the live-endpoint registry, the send worker, the dispatcher, the
/// tokio handle receive drivers run on and the socket files its listeners
/// created. Cheap to clone; every clone refers to the same context.
#[derive(Clone)]
pub struct IpcRuntime {
    inner: Arc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    pub(crate) config: ChannelConfig,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) handle: Handle,
    pub(crate) registry: EndpointRegistry,
    pub(crate) sender: SendWorker,
    next_id: AtomicU64,
    freed: AtomicU64,
    socket_files: Mutex<Vec<SocketFileGuard>>,
}

impl IpcRuntime {
    /// Create a runtime whose receive drivers run on `handle`.
    pub fn new(config: ChannelConfig, dispatcher: Dispatcher, handle: Handle) -> Self {
        debug!(app = %config.app_name, ?dispatcher, "channel runtime created");
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                dispatcher,
                handle,
                registry: EndpointRegistry::default(),
                sender: SendWorker::default(),
                next_id: AtomicU64::new(1),
                freed: AtomicU64::new(0),
                socket_files: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a runtime on the tokio runtime of the calling context.
    pub fn with_current_handle(config: ChannelConfig, dispatcher: Dispatcher) -> Result<Self> {
        let handle = Handle::try_current()?;
        Ok(Self::new(config, dispatcher, handle))
    }

    pub(crate) fn from_inner(inner: Arc<RuntimeInner>) -> Self {
        Self { inner }
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &RuntimeInner {
        &self.inner
    }

    #[cfg(test)]
    pub(crate) fn clone_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub(crate) fn own_socket_file(&self, guard: SocketFileGuard) {
        self.inner.lock_socket_files().push(guard);
    }

    /// Remove the socket file at `path`, if this runtime created it.
    pub(crate) fn release_socket_file(&self, path: &Path) {
        self.inner.lock_socket_files().retain(|guard| guard.path() != path);
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Create a disconnected endpoint named `name`.
    pub fn endpoint(&self, name: impl Into<String>) -> Endpoint {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        Endpoint::new(Arc::clone(&self.inner), id, name.into())
    }

    /// Handles to every connected endpoint.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.inner.registry.snapshot()
    }

    /// Number of connected endpoints.
    pub fn connected_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Send one message to every connected endpoint; returns how many.
    pub fn broadcast(&self, kind: MessageType, payload: Option<Bytes>) -> usize {
        let endpoints = self.endpoints();
        for endpoint in &endpoints {
            endpoint.send(kind, payload.clone());
        }
        endpoints.len()
    }

    /// Number of endpoints freed so far.
    pub fn endpoints_freed(&self) -> u64 {
        self.inner.freed.load(Ordering::Relaxed)
    }

    /// Start accepting worker connections on a generated socket path.
    pub fn listen(&self) -> Result<Listener> {
        Listener::spawn(self)
    }

    /// Connect `endpoint` to the socket at `path`, retrying per config.
    pub fn connect(&self, endpoint: &Endpoint, path: impl AsRef<Path>) -> Result<()> {
        connector::connect_endpoint(endpoint, path)
    }

    /// Write everything queued so far, then stop the send worker.
    ///
    /// Later sends to connected endpoints are dropped.
    pub fn shutdown(&self) {
        self.inner.sender.shutdown();
        debug!(app = %self.inner.config.app_name, "channel runtime shut down");
    }
}

impl RuntimeInner {
    pub(crate) fn note_freed(&self) {
        self.freed.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove every socket file this runtime still owns.
    ///
    /// Used before `process::exit`, which skips destructors.
    pub(crate) fn remove_socket_files(&self) {
        let guards = std::mem::take(&mut *self.lock_socket_files());
        drop(guards);
    }

    fn lock_socket_files(&self) -> MutexGuard<'_, Vec<SocketFileGuard>> {
        self.socket_files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for IpcRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcRuntime")
            .field("app_name", &self.inner.config.app_name)
            .field("connected", &self.inner.registry.len())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    use ipclink_frame::Message;
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn requires_tokio_context() {
        let err = IpcRuntime::with_current_handle(ChannelConfig::default(), Dispatcher::new())
            .unwrap_err();
        assert!(err.to_string().contains("no event loop"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn endpoint_ids_are_unique() {
        let runtime =
            IpcRuntime::with_current_handle(ChannelConfig::default(), Dispatcher::new()).unwrap();
        let a = runtime.endpoint("a");
        let b = runtime.endpoint("b");
        assert_ne!(a.id(), b.id());
        assert!(a.runtime().endpoints().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn broadcast_skips_disconnected_endpoints() {
        let runtime = IpcRuntime::new(ChannelConfig::default(), Dispatcher::new(), Handle::current());
        let mut peers = Vec::new();
        let mut endpoints = Vec::new();
        for _ in 0..3 {
            let endpoint = runtime.endpoint("Web");
            let (local, peer) = UnixStream::pair().unwrap();
            endpoint.connect_to_socket(local).unwrap();
            endpoints.push(endpoint);
            peers.push(peer);
        }
        endpoints[1].disconnect();
        assert_eq!(runtime.connected_count(), 2);

        assert_eq!(runtime.broadcast(MessageType::ExtensionInit, None), 2);
        assert_eq!(endpoints[1].pending_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn broadcast_delivers_to_peers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new().on(MessageType::Scroll, move |_, message: &Message| {
            let _ = tx.send(message.clone());
        });
        let ui_runtime = IpcRuntime::new(ChannelConfig::default(), Dispatcher::new(), Handle::current());
        let web_runtime = IpcRuntime::new(ChannelConfig::default(), dispatcher, Handle::current());

        let mut keep = Vec::new();
        for _ in 0..3 {
            let ui = ui_runtime.endpoint("Web");
            let web = web_runtime.endpoint("UI");
            let (a, b) = UnixStream::pair().unwrap();
            ui.connect_to_socket(a).unwrap();
            web.connect_to_socket(b).unwrap();
            keep.push((ui, web));
        }

        let sent = ui_runtime.broadcast(MessageType::Scroll, Some(Bytes::from_static(b"all")));
        assert_eq!(sent, 3);
        for _ in 0..3 {
            let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(message, Message::new(MessageType::Scroll, "all"));
        }
    }
}
