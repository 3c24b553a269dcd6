//! Endpoints: one per peer connection.
//!
//! An [`Endpoint`] is a counted handle. Every clone is one logical
//! reference; the endpoint is torn down (disconnected if still connected,
//! queues dropped) when the last handle goes away, and a [`WeakEndpoint`]
//! can never bring it back once that happened.
//!
//! While connected, the receive driver holds one handle (the connection
//! reference) and every queued outgoing message holds another.

use std::collections::VecDeque;
use std::fmt;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;
use ipclink_frame::{Message, MessageMask, MessageType};
use serde::Serialize;
use tokio::sync::futures::Notified;
use tokio::sync::{oneshot, Notify};
use tokio::task::AbortHandle;
use tracing::{debug, info, trace};

use crate::error::{ChannelError, Result};
use crate::payload;
use crate::receiver;
use crate::runtime::{IpcRuntime, RuntimeInner};
use crate::sender::Outgoing;

/// Connection status of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStatus {
    Disconnected,
    Connected,
    /// Terminal. Only observable through a [`WeakEndpoint`].
    Freed,
}

/// Counted handle to an endpoint.
#[derive(Clone)]
pub struct Endpoint {
    shared: Arc<Shared>,
}

/// Non-owning handle, e.g. for registries or callbacks.
#[derive(Clone)]
pub struct WeakEndpoint {
    shared: Weak<Shared>,
}

pub(crate) struct Shared {
    id: u64,
    name: String,
    runtime: Arc<RuntimeInner>,
    state: Mutex<State>,
    /// Wakes the receive driver to dispatch held-back messages.
    flush: Notify,
}

struct State {
    status: EndpointStatus,
    connection: Option<Connection>,
    /// Messages sent while disconnected.
    pending: VecDeque<Message>,
    /// Received messages held back while a selective receive is waiting.
    deferred: VecDeque<Message>,
    waiter: Option<Waiter>,
    generation: u64,
}

struct Connection {
    stream: Arc<UnixStream>,
    reader: AbortHandle,
    generation: u64,
}

struct Waiter {
    mask: MessageMask,
    tx: oneshot::Sender<Message>,
}

impl Endpoint {
    pub(crate) fn new(runtime: Arc<RuntimeInner>, id: u64, name: String) -> Self {
        let shared = Shared {
            id,
            name,
            runtime,
            state: Mutex::new(State {
                status: EndpointStatus::Disconnected,
                connection: None,
                pending: VecDeque::new(),
                deferred: VecDeque::new(),
                waiter: None,
                generation: 0,
            }),
            flush: Notify::new(),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Process-unique identifier.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Diagnostic name (the process role of the peer).
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn status(&self) -> EndpointStatus {
        self.shared.lock_state().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == EndpointStatus::Connected
    }

    /// Number of live handles, including the connection reference and
    /// queued outgoing messages.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Number of messages waiting for a connection.
    pub fn pending_len(&self) -> usize {
        self.shared.lock_state().pending.len()
    }

    /// Number of received messages held back by a selective receive.
    pub fn deferred_len(&self) -> usize {
        self.shared.lock_state().deferred.len()
    }

    pub fn downgrade(&self) -> WeakEndpoint {
        WeakEndpoint {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Whether both handles refer to the same endpoint.
    pub fn ptr_eq(&self, other: &Endpoint) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// The runtime this endpoint belongs to.
    pub fn runtime(&self) -> IpcRuntime {
        IpcRuntime::from_inner(Arc::clone(&self.shared.runtime))
    }

    pub(crate) fn runtime_inner(&self) -> &Arc<RuntimeInner> {
        &self.shared.runtime
    }

    /// Attach a connected stream and start receiving on it.
    ///
    /// The endpoint becomes Connected, joins the live registry, and any
    /// messages sent while it was disconnected are queued for writing in
    /// their original order.
    ///
    /// # Panics
    ///
    /// If the endpoint is already connected.
    pub fn connect_to_socket(&self, stream: UnixStream) -> Result<()> {
        stream.set_nonblocking(true)?;
        let writer = Arc::new(stream.try_clone()?);
        let runtime = &self.shared.runtime;

        let mut state = self.shared.lock_state();
        assert_eq!(
            state.status,
            EndpointStatus::Disconnected,
            "endpoint {} is already connected",
            self.name()
        );

        let stream = {
            let _enter = runtime.handle.enter();
            tokio::net::UnixStream::from_std(stream)?
        };
        state.generation += 1;
        let generation = state.generation;
        let reader = runtime
            .handle
            .spawn(receiver::drive(self.clone(), stream, generation));

        state.connection = Some(Connection {
            stream: writer,
            reader: reader.abort_handle(),
            generation,
        });
        state.status = EndpointStatus::Connected;
        runtime.registry.insert(self.id(), self.downgrade());

        let flushed = state.pending.len();
        for message in state.pending.drain(..) {
            runtime.sender.enqueue(Outgoing {
                endpoint: self.clone(),
                message,
            });
        }
        drop(state);

        info!(endpoint = self.name(), id = self.id(), flushed, "endpoint connected");
        Ok(())
    }

    /// Hand over a disconnected endpoint's queued messages to a connected
    /// one and release the stale handle.
    ///
    /// Returns a new handle to `fresh`, which the caller keeps in place of
    /// `stale`. The transferred messages are written before anything sent
    /// through the returned handle.
    ///
    /// # Panics
    ///
    /// If `stale` is connected, `fresh` is not, or both are the same endpoint.
    pub fn replace(stale: Endpoint, fresh: &Endpoint) -> Endpoint {
        assert!(
            !stale.ptr_eq(fresh),
            "endpoint {} cannot replace itself",
            fresh.name()
        );

        let fresh_state = fresh.shared.lock_state();
        assert_eq!(
            fresh_state.status,
            EndpointStatus::Connected,
            "replacement endpoint {} is not connected",
            fresh.name()
        );
        let transferred = {
            let mut stale_state = stale.shared.lock_state();
            assert_eq!(
                stale_state.status,
                EndpointStatus::Disconnected,
                "replaced endpoint {} is still connected",
                stale.name()
            );
            std::mem::take(&mut stale_state.pending)
        };

        let count = transferred.len();
        for message in transferred {
            fresh.shared.runtime.sender.enqueue(Outgoing {
                endpoint: fresh.clone(),
                message,
            });
        }
        drop(fresh_state);

        debug!(
            from = stale.name(),
            to = fresh.name(),
            count,
            "transferred pending messages"
        );
        drop(stale);
        fresh.clone()
    }

    /// Close the connection.
    ///
    /// The endpoint leaves the registry, stops receiving, and fails any
    /// waiting selective receive. Received messages still held back are
    /// dropped. Messages sent afterwards are queued until the next connect.
    ///
    /// # Panics
    ///
    /// If the endpoint is not connected.
    pub fn disconnect(&self) {
        let mut state = self.shared.lock_state();
        assert_eq!(
            state.status,
            EndpointStatus::Connected,
            "endpoint {} is not connected",
            self.name()
        );
        let dropped = self.shared.disconnect_locked(&mut state);
        if !dropped.is_empty() {
            debug!(
                endpoint = self.name(),
                count = dropped.len(),
                "dropped held-back messages"
            );
        }
    }

    /// Send a message; fire and forget.
    ///
    /// `None` sends a header-only message. While disconnected the message
    /// is queued and written after the next connect.
    ///
    /// # Panics
    ///
    /// If `payload` is `Some` but empty.
    pub fn send(&self, kind: MessageType, payload: Option<Bytes>) {
        self.send_message(Message { kind, payload });
    }

    /// Send a prepared message. See [`send`](Self::send).
    pub fn send_message(&self, message: Message) {
        assert!(
            message.payload.as_ref().is_none_or(|payload| !payload.is_empty()),
            "{} message with an empty payload; send None instead",
            message.kind
        );
        assert!(
            u32::try_from(message.len()).is_ok(),
            "{} payload of {} bytes does not fit a frame",
            message.kind,
            message.len()
        );
        if message.kind != MessageType::Log {
            debug!(
                endpoint = self.name(),
                kind = %message.kind,
                len = message.len(),
                "send message"
            );
        }

        let mut state = self.shared.lock_state();
        if state.status == EndpointStatus::Connected {
            self.shared.runtime.sender.enqueue(Outgoing {
                endpoint: self.clone(),
                message,
            });
        } else {
            state.pending.push_back(message);
        }
    }

    /// Serialize `value` as the payload of a `kind` message and send it.
    pub fn send_payload<T: Serialize>(&self, kind: MessageType, value: &T) -> Result<()> {
        let payload = payload::encode(value)?;
        self.send(kind, (!payload.is_empty()).then_some(payload));
        Ok(())
    }

    /// Wait for the next message whose type is in `mask`.
    ///
    /// Messages of other types that arrive meanwhile are held back and
    /// dispatched in arrival order once this receive completes or is
    /// dropped. A matching message already held back is returned
    /// immediately.
    pub async fn recv_matching(&self, mask: MessageMask) -> Result<Message> {
        let rx = {
            let mut state = self.shared.lock_state();
            if let Some(index) = state.deferred.iter().position(|m| mask.contains(m.kind)) {
                if let Some(message) = state.deferred.remove(index) {
                    return Ok(message);
                }
            }
            if state.status != EndpointStatus::Connected {
                return Err(ChannelError::Disconnected(self.name().to_string()));
            }
            if state.waiter.as_ref().is_some_and(|w| !w.tx.is_closed()) {
                return Err(ChannelError::WaiterBusy(self.name().to_string()));
            }
            let (tx, rx) = oneshot::channel();
            state.waiter = Some(Waiter { mask, tx });
            rx
        };
        let mut waiting = Waiting {
            endpoint: self,
            rx,
            done: false,
        };
        let result = (&mut waiting.rx).await;
        waiting.done = true;
        result.map_err(|_| ChannelError::Disconnected(self.name().to_string()))
    }

    /// Route a received message.
    ///
    /// Returns the message when it should go to the dispatcher now.
    pub(crate) fn route_incoming(&self, message: Message) -> Option<Message> {
        let mut state = self.shared.lock_state();
        let message = match state.waiter.take() {
            Some(waiter) if waiter.mask.contains(message.kind) => match waiter.tx.send(message) {
                Ok(()) => return None,
                // receiver went away
                Err(message) => message,
            },
            Some(waiter) if !waiter.tx.is_closed() => {
                state.waiter = Some(waiter);
                state.deferred.push_back(message);
                return None;
            }
            _ => message,
        };
        if state.deferred.is_empty() {
            Some(message)
        } else {
            state.deferred.push_back(message);
            None
        }
    }

    /// Next held-back message, once no selective receive is waiting.
    pub(crate) fn next_deferred(&self) -> Option<Message> {
        let mut state = self.shared.lock_state();
        if state.waiter.as_ref().is_some_and(|w| !w.tx.is_closed()) {
            return None;
        }
        state.waiter = None;
        state.deferred.pop_front()
    }

    /// Resolves once a cancelled selective receive left messages behind.
    pub(crate) fn flush_requested(&self) -> Notified<'_> {
        self.shared.flush.notified()
    }

    /// Clear the waiter of a selective receive dropped before completion.
    ///
    /// A message already handed to it goes back to the front of the
    /// held-back list; the receive driver is woken to dispatch that list.
    fn abandon_waiter(&self, unclaimed: Option<Message>) {
        let mut state = self.shared.lock_state();
        if state.waiter.as_ref().is_some_and(|w| w.tx.is_closed()) {
            state.waiter = None;
        }
        if let Some(message) = unclaimed {
            if state.status == EndpointStatus::Connected {
                state.deferred.push_front(message);
            } else {
                debug!(
                    endpoint = self.name(),
                    kind = %message.kind,
                    "dropping unclaimed message"
                );
            }
        }
        if !state.deferred.is_empty() {
            self.shared.flush.notify_one();
        }
    }

    /// Disconnect after the receive driver of `generation` saw a hangup.
    ///
    /// Returns the messages still held back, or `None` when that
    /// connection was already closed.
    pub(crate) fn hangup(&self, generation: u64) -> Option<VecDeque<Message>> {
        let mut state = self.shared.lock_state();
        let current = state
            .connection
            .as_ref()
            .is_some_and(|c| c.generation == generation);
        current.then(|| self.shared.disconnect_locked(&mut state))
    }

    /// Writable stream of the current connection.
    pub(crate) fn writer(&self) -> Option<Arc<UnixStream>> {
        let state = self.shared.lock_state();
        state.connection.as_ref().map(|c| Arc::clone(&c.stream))
    }
}

/// A selective receive in progress.
struct Waiting<'a> {
    endpoint: &'a Endpoint,
    rx: oneshot::Receiver<Message>,
    done: bool,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.rx.close();
        let unclaimed = self.rx.try_recv().ok();
        self.endpoint.abandon_waiter(unclaimed);
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("status", &self.status())
            .finish()
    }
}

impl WeakEndpoint {
    /// Take a new reference, unless the endpoint has been freed.
    pub fn upgrade(&self) -> Option<Endpoint> {
        self.shared.upgrade().map(|shared| Endpoint { shared })
    }

    pub fn status(&self) -> EndpointStatus {
        self.upgrade()
            .map_or(EndpointStatus::Freed, |endpoint| endpoint.status())
    }

    /// Send if the endpoint still exists; otherwise drop the message.
    pub fn send(&self, kind: MessageType, payload: Option<Bytes>) {
        match self.upgrade() {
            Some(endpoint) => endpoint.send(kind, payload),
            None => trace!(kind = %kind, "endpoint freed, dropping message"),
        }
    }
}

impl fmt::Debug for WeakEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEndpoint")
            .field("status", &self.status())
            .finish()
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the messages that were held back for this connection.
    fn disconnect_locked(&self, state: &mut State) -> VecDeque<Message> {
        self.runtime.registry.remove(self.id);
        if let Some(connection) = state.connection.take() {
            connection.reader.abort();
            if let Err(err) = connection.stream.shutdown(Shutdown::Both) {
                debug!(endpoint = %self.name, error = %err, "socket shutdown failed");
            }
        }
        state.status = EndpointStatus::Disconnected;
        state.waiter = None;
        info!(endpoint = %self.name, id = self.id, "endpoint disconnected");
        std::mem::take(&mut state.deferred)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let mut state = std::mem::replace(
            state,
            State {
                status: EndpointStatus::Freed,
                connection: None,
                pending: VecDeque::new(),
                deferred: VecDeque::new(),
                waiter: None,
                generation: 0,
            },
        );
        if state.status == EndpointStatus::Connected {
            let held = self.disconnect_locked(&mut state);
            state.deferred.extend(held);
        }
        self.runtime.note_freed();
        debug!(
            endpoint = %self.name,
            id = self.id,
            dropped = state.pending.len() + state.deferred.len(),
            "endpoint freed"
        );
    }
}
