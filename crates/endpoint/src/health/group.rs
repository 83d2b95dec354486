use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::group::{EndpointGroup, EndpointListener, ReadySignal};
use crate::health::checker::{CheckerFactory, HealthChecker};
use crate::health::context::{is_healthy, CheckerContext};
use crate::Endpoint;

struct Tracked {
    context: Arc<CheckerContext>,
    checker: Arc<dyn HealthChecker>,
}

/// Wraps a delegate group, exposing only endpoints whose checker currently
/// reports a strictly positive health (§4.6).
///
/// A checker is started for every endpoint the delegate adds and stopped
/// for every one it removes; checkers for endpoints present in both the old
/// and new delegate snapshot are left running untouched. Health itself is
/// evaluated lazily, at [`EndpointGroup::snapshot`] time, rather than
/// pushed eagerly on every probe — the checkers update their
/// [`CheckerContext`] independently of how often callers actually read the
/// group.
pub struct HealthCheckedEndpointGroup {
    delegate: Arc<dyn EndpointGroup>,
    checkers: DashMap<Endpoint, Tracked>,
    listeners: Mutex<Vec<Arc<dyn EndpointListener>>>,
    ready: Arc<ReadySignal>,
}

impl HealthCheckedEndpointGroup {
    pub fn new(delegate: Arc<dyn EndpointGroup>, factory: Arc<dyn CheckerFactory>) -> Arc<Self> {
        let group = Arc::new(Self {
            delegate: Arc::clone(&delegate),
            checkers: DashMap::new(),
            listeners: Mutex::new(Vec::new()),
            ready: Arc::new(ReadySignal::default()),
        });

        group.reconcile(&delegate.snapshot(), &factory);
        delegate.add_listener(Arc::new(DelegateListener {
            group: Arc::clone(&group),
            factory,
        }));

        group
    }

    fn reconcile(&self, current: &[Endpoint], factory: &Arc<dyn CheckerFactory>) {
        for endpoint in current {
            if self.checkers.contains_key(endpoint) {
                continue;
            }
            let context = Arc::new(CheckerContext::new(endpoint.clone()));
            let checker = factory.create(Arc::clone(&context));
            self.checkers.insert(endpoint.clone(), Tracked { context, checker });
        }

        let stale: Vec<Endpoint> = self
            .checkers
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|e| !current.contains(e))
            .collect();

        for endpoint in stale {
            if let Some((_, tracked)) = self.checkers.remove(&endpoint) {
                tokio::spawn(async move { tracked.checker.close().await });
            }
        }

        let healthy = self.healthy_snapshot();
        if !healthy.is_empty() {
            self.ready.mark_ready();
        }
        for listener in self.listeners.lock().iter() {
            listener.on_endpoints_updated(&Arc::new(healthy.clone()));
        }
    }

    fn healthy_snapshot(&self) -> Vec<Endpoint> {
        let mut healthy: Vec<Endpoint> = self
            .checkers
            .iter()
            .filter(|entry| is_healthy(entry.value().context.health()))
            .map(|entry| entry.key().clone())
            .collect();
        healthy.sort();
        healthy
    }
}

impl EndpointGroup for HealthCheckedEndpointGroup {
    fn snapshot(&self) -> Arc<Vec<Endpoint>> {
        let healthy = self.healthy_snapshot();
        if !healthy.is_empty() {
            self.ready.mark_ready();
        }
        Arc::new(healthy)
    }

    fn add_listener(&self, listener: Arc<dyn EndpointListener>) {
        self.listeners.lock().push(listener);
    }

    fn ready(&self) -> Arc<ReadySignal> {
        Arc::clone(&self.ready)
    }
}

struct DelegateListener {
    group: Arc<HealthCheckedEndpointGroup>,
    factory: Arc<dyn CheckerFactory>,
}

impl EndpointListener for DelegateListener {
    fn on_endpoints_updated(&self, endpoints: &Arc<Vec<Endpoint>>) {
        self.group.reconcile(endpoints, &self.factory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::DynamicEndpointGroup;
    use async_trait::async_trait;

    struct AlwaysHealthy;

    #[async_trait]
    impl HealthChecker for AlwaysHealthy {
        async fn close(&self) {}
    }

    struct AlwaysHealthyFactory;
    impl CheckerFactory for AlwaysHealthyFactory {
        fn create(&self, context: Arc<CheckerContext>) -> Arc<dyn HealthChecker> {
            context.update_health(1.0);
            Arc::new(AlwaysHealthy)
        }
    }

    #[tokio::test]
    async fn exposes_only_healthy_endpoints_and_tracks_delegate_changes() {
        let delegate = Arc::new(DynamicEndpointGroup::new());
        delegate.add(Endpoint::new("a"));
        let group = HealthCheckedEndpointGroup::new(delegate.clone(), Arc::new(AlwaysHealthyFactory));
        assert_eq!(group.snapshot().as_slice(), &[Endpoint::new("a")]);

        delegate.add(Endpoint::new("b"));
        // allow the listener-driven reconcile to run.
        tokio::task::yield_now().await;
        assert_eq!(group.snapshot().len(), 2);

        delegate.remove(&Endpoint::new("a"));
        tokio::task::yield_now().await;
        assert_eq!(group.snapshot().as_slice(), &[Endpoint::new("b")]);
    }
}
