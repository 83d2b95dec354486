use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::group::{EndpointGroup, EndpointListener, ReadySignal};
use crate::Endpoint;

struct Republish {
    composite_snapshot: ArcSwap<Vec<Endpoint>>,
    mutate: Mutex<()>,
    delegates: Vec<Arc<dyn EndpointGroup>>,
    listeners: Mutex<Vec<Arc<dyn EndpointListener>>>,
    ready: Arc<ReadySignal>,
}

impl Republish {
    fn recompute(&self) {
        let _guard = self.mutate.lock();
        let mut merged: Vec<Endpoint> = self.delegates.iter().flat_map(|d| (*d.snapshot()).clone()).collect();
        merged.sort();
        merged.dedup();

        let before = self.composite_snapshot.load_full();
        if merged == *before {
            return;
        }

        let merged = Arc::new(merged);
        self.composite_snapshot.store(Arc::clone(&merged));
        if !merged.is_empty() {
            self.ready.mark_ready();
        }
        for listener in self.listeners.lock().iter() {
            listener.on_endpoints_updated(&merged);
        }
    }
}

struct DelegateListener(Arc<Republish>);

impl EndpointListener for DelegateListener {
    fn on_endpoints_updated(&self, _endpoints: &Arc<Vec<Endpoint>>) {
        self.0.recompute();
    }
}

/// Merges N delegate groups into a single sorted, deduplicated view (§4.5.1).
pub struct CompositeEndpointGroup {
    inner: Arc<Republish>,
}

impl CompositeEndpointGroup {
    pub fn new(delegates: Vec<Arc<dyn EndpointGroup>>) -> Self {
        let inner = Arc::new(Republish {
            composite_snapshot: ArcSwap::from_pointee(Vec::new()),
            mutate: Mutex::new(()),
            delegates,
            listeners: Mutex::new(Vec::new()),
            ready: Arc::new(ReadySignal::default()),
        });

        for delegate in &inner.delegates {
            delegate.add_listener(Arc::new(DelegateListener(Arc::clone(&inner))));
        }
        inner.recompute();

        Self { inner }
    }
}

impl EndpointGroup for CompositeEndpointGroup {
    fn snapshot(&self) -> Arc<Vec<Endpoint>> {
        self.inner.composite_snapshot.load_full()
    }

    fn add_listener(&self, listener: Arc<dyn EndpointListener>) {
        self.inner.listeners.lock().push(listener);
    }

    fn ready(&self) -> Arc<ReadySignal> {
        Arc::clone(&self.inner.ready)
    }
}
