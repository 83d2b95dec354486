use std::sync::Arc;

use crate::error::StreamError;

/// A one-shot callback interface attached to a [`crate::StreamMessage`] via
/// `subscribe`. At most one subscriber may ever attach to a given stream
/// (§4.2 invariants).
///
/// `on_subscribe` is always the first callback delivered. `on_next` is never
/// re-entered: if the subscriber calls `request` from within `on_next`, the
/// additional delivery is deferred to the same notification loop iteration
/// rather than recursing.
pub trait Subscriber<T>: Send {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>);
    fn on_next(&mut self, item: T);
    fn on_error(&mut self, error: StreamError);
    fn on_complete(&mut self);
}

/// Handle given to a subscriber to pull elements and to cancel.
pub trait Subscription: Send + Sync {
    /// Requests `n` additional elements be delivered.
    fn request(&self, n: u64);

    /// Cancels the subscription. Queued elements are drained (dropped) by
    /// the stream; no further callbacks are delivered unless
    /// [`SubscriptionOption::NotifyCancellation`] was set, in which case a
    /// single `on_error(StreamError::CancelledSubscription)` follows.
    fn cancel(&self);
}

/// Options passed to `subscribe` (§4.2 "Options").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub with_pooled_objects: bool,
    pub notify_cancellation: bool,
}

impl SubscriptionOptions {
    pub const NONE: Self = Self {
        with_pooled_objects: false,
        notify_cancellation: false,
    };

    #[must_use]
    pub fn with_pooled_objects(mut self) -> Self {
        self.with_pooled_objects = true;
        self
    }

    #[must_use]
    pub fn notify_cancellation(mut self) -> Self {
        self.notify_cancellation = true;
        self
    }
}

/// A boxed closure-based [`Subscriber`], convenient for tests and simple
/// call sites that don't need a named type.
pub struct FnSubscriber<T> {
    on_subscribe: Option<Box<dyn FnMut(Arc<dyn Subscription>) + Send>>,
    on_next: Box<dyn FnMut(T) + Send>,
    on_error: Box<dyn FnMut(StreamError) + Send>,
    on_complete: Box<dyn FnMut() + Send>,
}

impl<T> FnSubscriber<T> {
    pub fn new(
        on_next: impl FnMut(T) + Send + 'static,
        on_error: impl FnMut(StreamError) + Send + 'static,
        on_complete: impl FnMut() + Send + 'static,
    ) -> Self {
        Self {
            on_subscribe: None,
            on_next: Box::new(on_next),
            on_error: Box::new(on_error),
            on_complete: Box::new(on_complete),
        }
    }

    #[must_use]
    pub fn on_subscribe(mut self, cb: impl FnMut(Arc<dyn Subscription>) + Send + 'static) -> Self {
        self.on_subscribe = Some(Box::new(cb));
        self
    }
}

impl<T: Send> Subscriber<T> for FnSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if let Some(cb) = self.on_subscribe.as_mut() {
            cb(subscription);
        }
    }

    fn on_next(&mut self, item: T) {
        (self.on_next)(item);
    }

    fn on_error(&mut self, error: StreamError) {
        (self.on_error)(error);
    }

    fn on_complete(&mut self) {
        (self.on_complete)();
    }
}
