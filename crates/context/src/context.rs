use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::attributes::AttributeMap;
use crate::meter::MeterRegistry;
use crate::session::SessionProtocol;

type Callback = dyn Fn(&Arc<RequestContext>) + Send + Sync;
type ChildCallback = dyn Fn(&Arc<RequestContext>, &Arc<RequestContext>) + Send + Sync;

/// Per-request state threaded from caller to I/O thread and back (§4.11, §3).
pub struct RequestContext {
    pub session_protocol: SessionProtocol,
    pub method: String,
    pub path: String,
    pub decoded_path: String,
    pub query: Option<String>,
    pub event_loop_id: usize,
    pub meter_registry: Arc<dyn MeterRegistry>,
    pub attributes: AttributeMap,
    on_enter: Mutex<Vec<Arc<Callback>>>,
    on_exit: Mutex<Vec<Arc<Callback>>>,
    on_child: Mutex<Vec<Arc<ChildCallback>>>,
}

static NEXT_REQUEST_HANDLE: AtomicUsize = AtomicUsize::new(0);

/// Opaque per-attempt identifier (§3 "request handle").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(usize);

impl RequestHandle {
    pub fn next() -> Self {
        Self(NEXT_REQUEST_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct RequestContextBuilder {
    session_protocol: SessionProtocol,
    method: String,
    path: String,
    decoded_path: Option<String>,
    query: Option<String>,
    event_loop_id: usize,
    meter_registry: Arc<dyn MeterRegistry>,
}

impl RequestContext {
    pub fn builder(session_protocol: SessionProtocol, method: impl Into<String>, path: impl Into<String>) -> RequestContextBuilder {
        RequestContextBuilder {
            session_protocol,
            method: method.into(),
            path: path.into(),
            decoded_path: None,
            query: None,
            event_loop_id: 0,
            meter_registry: Arc::new(crate::meter::NoopMeterRegistry),
        }
    }

    /// Registers a callback run every time this context is pushed onto the
    /// thread-local stack. Running it is optional at push time (§4.11).
    pub fn on_enter(&self, callback: impl Fn(&Arc<RequestContext>) + Send + Sync + 'static) {
        self.on_enter.lock().push(Arc::new(callback));
    }

    pub fn on_exit(&self, callback: impl Fn(&Arc<RequestContext>) + Send + Sync + 'static) {
        self.on_exit.lock().push(Arc::new(callback));
    }

    /// Registers a callback run when a *different* context is pushed on top
    /// of this one while it is current.
    pub fn on_child(&self, callback: impl Fn(&Arc<RequestContext>, &Arc<RequestContext>) + Send + Sync + 'static) {
        self.on_child.lock().push(Arc::new(callback));
    }

    pub(crate) fn run_on_enter(self: &Arc<Self>) {
        for cb in self.on_enter.lock().iter() {
            cb(self);
        }
    }

    pub(crate) fn run_on_exit(self: &Arc<Self>) {
        for cb in self.on_exit.lock().iter() {
            cb(self);
        }
    }

    pub(crate) fn run_on_child(self: &Arc<Self>, child: &Arc<Self>) {
        for cb in self.on_child.lock().iter() {
            cb(self, child);
        }
    }
}

impl RequestContextBuilder {
    pub fn decoded_path(mut self, decoded_path: impl Into<String>) -> Self {
        self.decoded_path = Some(decoded_path.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn event_loop_id(mut self, id: usize) -> Self {
        self.event_loop_id = id;
        self
    }

    pub fn meter_registry(mut self, registry: Arc<dyn MeterRegistry>) -> Self {
        self.meter_registry = registry;
        self
    }

    pub fn build(self) -> Arc<RequestContext> {
        let decoded_path = self.decoded_path.unwrap_or_else(|| self.path.clone());
        Arc::new(RequestContext {
            session_protocol: self.session_protocol,
            method: self.method,
            path: self.path,
            decoded_path,
            query: self.query,
            event_loop_id: self.event_loop_id,
            meter_registry: self.meter_registry,
            attributes: AttributeMap::new(),
            on_enter: Mutex::new(Vec::new()),
            on_exit: Mutex::new(Vec::new()),
            on_child: Mutex::new(Vec::new()),
        })
    }
}
