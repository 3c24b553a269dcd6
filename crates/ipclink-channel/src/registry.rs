use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::endpoint::{Endpoint, WeakEndpoint};

/// The live-endpoint registry: exactly the connected endpoints of a
/// runtime, in connect order.
///
/// Holds weak handles, so membership never keeps an endpoint alive.
#[derive(Default)]
pub(crate) struct EndpointRegistry {
    entries: Mutex<Vec<(u64, WeakEndpoint)>>,
}

impl EndpointRegistry {
    fn lock(&self) -> MutexGuard<'_, Vec<(u64, WeakEndpoint)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// # Panics
    ///
    /// If `id` is already registered.
    pub(crate) fn insert(&self, id: u64, endpoint: WeakEndpoint) {
        let mut entries = self.lock();
        assert!(
            entries.iter().all(|(existing, _)| *existing != id),
            "endpoint {id} registered twice"
        );
        entries.push((id, endpoint));
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut entries = self.lock();
        match entries.iter().position(|(existing, _)| *existing == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Handles to every registered endpoint that is still alive.
    pub(crate) fn snapshot(&self) -> Vec<Endpoint> {
        self.lock()
            .iter()
            .filter_map(|(_, endpoint)| endpoint.upgrade())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ChannelConfig;
    use crate::handler::Dispatcher;
    use crate::runtime::IpcRuntime;

    #[tokio::test]
    async fn insert_and_remove() {
        let runtime = IpcRuntime::new(
            ChannelConfig::default(),
            Dispatcher::new(),
            tokio::runtime::Handle::current(),
        );
        let registry = &runtime.inner().registry;
        let a = runtime.endpoint("a");
        let b = runtime.endpoint("b");
        registry.insert(a.id(), a.downgrade());
        registry.insert(b.id(), b.downgrade());
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(a.id()));
        assert!(!registry.remove(a.id()));
        let live: Vec<_> = registry.snapshot().iter().map(|e| e.id()).collect();
        assert_eq!(live, vec![b.id()]);

        // a dead weak handle is skipped, not resurrected
        let b_id = b.id();
        drop(b);
        assert!(registry.snapshot().is_empty());
        registry.remove(b_id);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    #[should_panic(expected = "registered twice")]
    async fn duplicate_insert_panics() {
        let runtime = IpcRuntime::new(
            ChannelConfig::default(),
            Dispatcher::new(),
            tokio::runtime::Handle::current(),
        );
        let registry = &runtime.inner().registry;
        let a = runtime.endpoint("a");
        registry.insert(a.id(), a.downgrade());
        registry.insert(a.id(), a.downgrade());
    }
}
