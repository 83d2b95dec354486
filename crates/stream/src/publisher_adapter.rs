use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_core::Stream as FuturesStream;
use tokio::sync::Notify;

use crate::demand::Demand;
use crate::error::StreamError;
use crate::subscriber::{Subscriber, Subscription, SubscriptionOptions};

/// Adapts an external [`futures_core::Stream`] (e.g. a body decoded off the
/// wire) into the single-subscriber contract of §4.2 ("Publisher adapter").
///
/// `request` is forwarded as demand; `on_next`/`on_error`/`on_complete` are
/// translated directly. A pending `abort` cancels the polling loop exactly
/// once: no further polls of the inner stream occur after cancellation.
pub struct PublisherAdapter<S> {
    inner: Pin<Box<S>>,
}

impl<S> PublisherAdapter<S>
where
    S: FuturesStream + Send + 'static,
    S::Item: Send,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner: Box::pin(inner),
        }
    }

    pub fn subscribe(self, mut subscriber: Box<dyn Subscriber<S::Item>>, _options: SubscriptionOptions) {
        let demand = Arc::new(Demand::new());
        let notify = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicBool::new(false));

        let subscription: Arc<dyn Subscription> = Arc::new(AdapterSubscription {
            demand: Arc::clone(&demand),
            notify: Arc::clone(&notify),
            cancelled: Arc::clone(&cancelled),
        });
        subscriber.on_subscribe(Arc::clone(&subscription));

        let mut inner = self.inner;
        tokio::spawn(async move {
            loop {
                if cancelled.load(Ordering::Acquire) {
                    return;
                }
                if !demand.is_positive() {
                    notify.notified().await;
                    continue;
                }
                let next = PollNext { stream: inner.as_mut() }.await;
                if cancelled.load(Ordering::Acquire) {
                    return;
                }
                match next {
                    Some(item) => {
                        demand.take_one();
                        subscriber.on_next(item);
                    }
                    None => {
                        subscriber.on_complete();
                        return;
                    }
                }
            }
        });
    }
}

struct PollNext<'a, S> {
    stream: Pin<&'a mut S>,
}

impl<S: FuturesStream> Future for PollNext<'_, S> {
    type Output = Option<S::Item>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<Self::Output> {
        self.stream.as_mut().poll_next(cx)
    }
}

struct AdapterSubscription {
    demand: Arc<Demand>,
    notify: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
}

impl Subscription for AdapterSubscription {
    fn request(&self, n: u64) {
        self.demand.request(n);
        self.notify.notify_one();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// Surfaces an upstream error through the normal `on_error` channel instead
/// of panicking; used by adapters over fallible streams (e.g. a decoded
/// response body) where `S::Item = Result<T, E>`.
pub fn flatten_error<T, E>(item: Result<T, E>) -> Result<T, StreamError>
where
    E: std::fmt::Display,
{
    item.map_err(|e| StreamError::cause(e.to_string()))
}
