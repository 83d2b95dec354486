use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::error::LifecycleError;
use crate::listener::{notify_listeners, LifecycleListener};
use crate::state::LifecycleState;

/// A component with an asynchronous start/stop life-cycle (§4.7).
///
/// `do_stop` also serves as the rollback path: if `do_start` fails,
/// [`StartStopSupport`] calls `do_stop(rollback_arg)` with a caller-supplied
/// argument before propagating the original error.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    type StartArg: Send + 'static;
    type StopArg: Clone + Send + Sync + 'static;
    type Output: Clone + Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn do_start(&self, arg: Self::StartArg) -> Result<Self::Output, Self::Error>;

    async fn do_stop(&self, arg: Self::StopArg) -> Result<(), Self::Error>;

    /// Called when rollback itself fails; does not change the error
    /// returned to the original `start()` caller.
    fn rollback_failed(&self, _original_cause: &Self::Error, _rollback_cause: &Self::Error) {}
}

enum Inner<C: Component> {
    Stopped,
    Started(C::Output),
}

/// Reusable async start/stop life-cycle wrapper.
///
/// Start and stop serialize against each other through a
/// [`tokio::sync::Mutex`] held for the full duration of the operation
/// (including the user's `do_start`/`do_stop`), which is what lets a
/// concurrent `start()` simply wait for the in-flight one and then observe
/// its (cached, `Clone`) result rather than starting twice. The externally
/// observable [`LifecycleState`] is a separate atomic snapshot so readers
/// (metrics, listeners) never contend with the mutex.
pub struct StartStopSupport<C: Component> {
    component: Arc<C>,
    inner: tokio::sync::Mutex<Inner<C>>,
    state: ArcSwap<LifecycleState>,
    listeners: parking_lot::Mutex<Vec<Arc<dyn LifecycleListener>>>,
}

impl<C: Component> StartStopSupport<C> {
    pub fn new(component: C) -> Self {
        Self {
            component: Arc::new(component),
            inner: tokio::sync::Mutex::new(Inner::Stopped),
            state: ArcSwap::from_pointee(LifecycleState::Stopped),
            listeners: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    fn set_state(&self, to: LifecycleState) {
        let from = **self.state.swap(Arc::new(to));
        if from != to {
            notify_listeners(&self.listeners.lock(), from, to);
        }
    }

    /// Starts the component, or returns the already-started output if a
    /// start (possibly concurrent) already completed.
    ///
    /// On `do_start` failure, `do_stop(rollback_arg)` runs automatically
    /// before the original error is returned; a rollback failure is
    /// reported via [`Component::rollback_failed`] and does not replace the
    /// original cause.
    pub async fn start(&self, arg: C::StartArg, rollback_arg: C::StopArg) -> Result<C::Output, LifecycleError<C::Error>> {
        let mut inner = self.inner.lock().await;
        if let Inner::Started(output) = &*inner {
            return Ok(output.clone());
        }

        self.set_state(LifecycleState::Starting);
        match self.component.do_start(arg).await {
            Ok(output) => {
                *inner = Inner::Started(output.clone());
                self.set_state(LifecycleState::Started);
                Ok(output)
            }
            Err(start_cause) => {
                self.set_state(LifecycleState::Stopping);
                if let Err(rollback_cause) = self.component.do_stop(rollback_arg).await {
                    self.component.rollback_failed(&start_cause, &rollback_cause);
                }
                *inner = Inner::Stopped;
                self.set_state(LifecycleState::Stopped);
                Err(LifecycleError::Component(start_cause))
            }
        }
    }

    /// Stops the component. Idempotent: stopping an already-stopped
    /// component is a no-op that returns `Ok(())`.
    pub async fn stop(&self, arg: C::StopArg) -> Result<(), LifecycleError<C::Error>> {
        let mut inner = self.inner.lock().await;
        if let Inner::Stopped = &*inner {
            return Ok(());
        }

        self.set_state(LifecycleState::Stopping);
        let result = self.component.do_stop(arg).await;
        *inner = Inner::Stopped;
        self.set_state(LifecycleState::Stopped);
        result.map_err(LifecycleError::Component)
    }
}
