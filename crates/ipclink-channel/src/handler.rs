use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ipclink_frame::{Message, MessageType};
use tracing::{debug, error};

use crate::endpoint::Endpoint;

type MessageHandler = dyn Fn(&Endpoint, &Message) + Send + Sync;
type HangupHandler = dyn Fn(&Endpoint) + Send + Sync;

/// Routes received messages to the handler registered for their type.
///
/// Built once at startup and handed to the runtime:
///
/// ```ignore
/// let dispatcher = Dispatcher::new()
///     .on(MessageType::Log, |endpoint, message| { /* ... */ })
///     .on_hangup(|endpoint| { /* ... */ });
/// ```
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<MessageType, Arc<MessageHandler>>,
    hangup: Option<Arc<HangupHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for one message type.
    ///
    /// # Panics
    ///
    /// If a handler for `kind` is already registered.
    pub fn on<F>(mut self, kind: MessageType, handler: F) -> Self
    where
        F: Fn(&Endpoint, &Message) + Send + Sync + 'static,
    {
        let previous = self.handlers.insert(kind, Arc::new(handler));
        assert!(previous.is_none(), "handler for {kind} registered twice");
        self
    }

    /// Register the hook invoked after an endpoint's peer hangs up.
    pub fn on_hangup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Endpoint) + Send + Sync + 'static,
    {
        self.hangup = Some(Arc::new(hook));
        self
    }

    /// Whether a handler is registered for `kind`.
    pub fn handles(&self, kind: MessageType) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub(crate) fn dispatch(&self, endpoint: &Endpoint, message: &Message) {
        if message.kind != MessageType::Log {
            debug!(
                endpoint = endpoint.name(),
                kind = %message.kind,
                len = message.len(),
                "recv message"
            );
        }
        match self.handlers.get(&message.kind) {
            Some(handler) => handler(endpoint, message),
            None => error!(
                endpoint = endpoint.name(),
                kind = %message.kind,
                "no handler for message type, dropping message"
            ),
        }
    }

    pub(crate) fn hangup(&self, endpoint: &Endpoint) {
        if let Some(hook) = &self.hangup {
            hook(endpoint);
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().map(|kind| kind.name()).collect();
        kinds.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("handlers", &kinds)
            .field("hangup", &self.hangup.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_reports_registered_types() {
        let dispatcher = Dispatcher::new()
            .on(MessageType::Log, |_, _| {})
            .on(MessageType::Scroll, |_, _| {});
        assert!(dispatcher.handles(MessageType::Log));
        assert!(dispatcher.handles(MessageType::Scroll));
        assert!(!dispatcher.handles(MessageType::Ipc));
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        let _ = Dispatcher::new()
            .on(MessageType::Ipc, |_, _| {})
            .on(MessageType::Ipc, |_, _| {});
    }

    #[test]
    fn debug_lists_handled_types() {
        let dispatcher = Dispatcher::new()
            .on(MessageType::Scroll, |_, _| {})
            .on(MessageType::Crash, |_, _| {});
        let rendered = format!("{dispatcher:?}");
        assert!(rendered.contains("crash"));
        assert!(rendered.contains("scroll"));
        assert!(rendered.contains("hangup: false"));
    }
}
