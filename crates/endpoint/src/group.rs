use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::Endpoint;

/// Notified of every snapshot change on an [`EndpointGroup`] (§4.5 "Dynamic group").
pub trait EndpointListener: Send + Sync {
    fn on_endpoints_updated(&self, endpoints: &Arc<Vec<Endpoint>>);
}

/// Resolves exactly once, the first time a group's snapshot becomes
/// non-empty (§3 "EndpointGroup", "completion signal").
#[derive(Default)]
pub struct ReadySignal {
    ready: AtomicBool,
    notify: Notify,
}

impl ReadySignal {
    pub(crate) fn mark_ready(&self) {
        if !self.ready.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub async fn wait(&self) {
        if self.ready.load(Ordering::SeqCst) {
            return;
        }
        let notified = self.notify.notified();
        if self.ready.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// An observable collection of endpoints (§3 "EndpointGroup").
pub trait EndpointGroup: Send + Sync {
    fn snapshot(&self) -> Arc<Vec<Endpoint>>;
    fn add_listener(&self, listener: Arc<dyn EndpointListener>);
    fn ready(&self) -> Arc<ReadySignal>;
}

/// A mutable [`EndpointGroup`] whose contents are managed by `add`/`remove`/`set`.
///
/// Mutations serialize through a short mutex but publish the resulting
/// snapshot atomically via [`ArcSwap`]; reads never take a lock.
pub struct DynamicEndpointGroup {
    snapshot: ArcSwap<Vec<Endpoint>>,
    mutate: Mutex<()>,
    listeners: Mutex<Vec<Arc<dyn EndpointListener>>>,
    ready: Arc<ReadySignal>,
}

impl Default for DynamicEndpointGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicEndpointGroup {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
            mutate: Mutex::new(()),
            listeners: Mutex::new(Vec::new()),
            ready: Arc::new(ReadySignal::default()),
        }
    }

    pub fn add(&self, endpoint: Endpoint) {
        self.update(|endpoints| {
            if !endpoints.contains(&endpoint) {
                endpoints.push(endpoint);
                endpoints.sort();
            }
        });
    }

    pub fn remove(&self, endpoint: &Endpoint) {
        self.update(|endpoints| endpoints.retain(|e| e != endpoint));
    }

    pub fn set(&self, mut endpoints: Vec<Endpoint>) {
        endpoints.sort();
        self.update(|current| *current = endpoints);
    }

    fn update(&self, f: impl FnOnce(&mut Vec<Endpoint>)) {
        let _guard = self.mutate.lock();
        let before = self.snapshot.load_full();
        let mut next = (*before).clone();
        f(&mut next);

        if next == *before {
            return;
        }

        let next = Arc::new(next);
        self.snapshot.store(Arc::clone(&next));
        if !next.is_empty() {
            self.ready.mark_ready();
        }

        for listener in self.listeners.lock().iter() {
            listener.on_endpoints_updated(&next);
        }
    }
}

impl EndpointGroup for DynamicEndpointGroup {
    fn snapshot(&self) -> Arc<Vec<Endpoint>> {
        self.snapshot.load_full()
    }

    fn add_listener(&self, listener: Arc<dyn EndpointListener>) {
        self.listeners.lock().push(listener);
    }

    fn ready(&self) -> Arc<ReadySignal> {
        Arc::clone(&self.ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingListener(Arc<AtomicUsize>);
    impl EndpointListener for CountingListener {
        fn on_endpoints_updated(&self, _endpoints: &Arc<Vec<Endpoint>>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn add_remove_set_publish_sorted_snapshots() {
        let group = DynamicEndpointGroup::new();
        let count = Arc::new(AtomicUsize::new(0));
        group.add_listener(Arc::new(CountingListener(Arc::clone(&count))));

        group.add(Endpoint::new("b"));
        group.add(Endpoint::new("a"));
        assert_eq!(group.snapshot().as_slice(), &[Endpoint::new("a"), Endpoint::new("b")]);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        group.remove(&Endpoint::new("b"));
        assert_eq!(group.snapshot().as_slice(), &[Endpoint::new("a")]);
        assert_eq!(count.load(Ordering::SeqCst), 3);

        // A no-op set does not notify listeners again.
        group.set(vec![Endpoint::new("a")]);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn ready_resolves_once_non_empty() {
        let group = DynamicEndpointGroup::new();
        let ready = group.ready();
        assert!(!ready.is_ready());
        group.add(Endpoint::new("a"));
        ready.wait().await;
        assert!(ready.is_ready());
    }
}
