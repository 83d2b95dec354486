use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::demand::Demand;
use crate::error::StreamError;
use crate::subscriber::{Subscriber, Subscription, SubscriptionOptions};

/// Stream state (§3 "Stream state"). No transition ever returns to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Open = 0,
    Closed = 1,
    Cleanup = 2,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => State::Open,
            1 => State::Closed,
            _ => State::Cleanup,
        }
    }
}

struct AtomicState(AtomicU8);

impl AtomicState {
    fn new() -> Self {
        Self(AtomicU8::new(State::Open as u8))
    }

    fn load(&self) -> State {
        State::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `Open -> Closed`. Returns `true` if this call performed the transition.
    fn close(&self) -> bool {
        self.0
            .compare_exchange(
                State::Open as u8,
                State::Closed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Moves `Open -> Cleanup` directly (cancel/abort). Returns `true` if this
    /// call performed the transition.
    fn cleanup_from_open(&self) -> bool {
        self.0
            .compare_exchange(
                State::Open as u8,
                State::Cleanup as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Moves `Closed -> Cleanup`. Returns `true` if this call performed the transition.
    fn cleanup_from_closed(&self) -> bool {
        self.0
            .compare_exchange(
                State::Closed as u8,
                State::Cleanup as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

enum Completion {
    Ok,
    Err(StreamError),
}

struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    state: AtomicState,
    demand: Demand,
    notify: Notify,
    subscribed: AtomicBool,
    aborted: AtomicBool,
    close_cause: Mutex<Option<StreamError>>,
    options: Mutex<SubscriptionOptions>,
    completion: Mutex<Option<Completion>>,
    completion_notify: Arc<Notify>,
}

/// A single-subscriber publisher-writer stream (§4.2).
///
/// Cloning a [`StreamMessage`] gives another write handle onto the same
/// underlying queue; only one of the clones may ever call [`subscribe`][Self::subscribe]
/// successfully.
pub struct StreamMessage<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for StreamMessage<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Default for StreamMessage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> StreamMessage<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                state: AtomicState::new(),
                demand: Demand::new(),
                notify: Notify::new(),
                subscribed: AtomicBool::new(false),
                aborted: AtomicBool::new(false),
                close_cause: Mutex::new(None),
                options: Mutex::new(SubscriptionOptions::NONE),
                completion: Mutex::new(None),
                completion_notify: Arc::new(Notify::new()),
            }),
        }
    }

    /// Queues `item` if the stream is still open. Returns `false` if the
    /// stream has already been closed, cancelled or aborted (the item is
    /// dropped, releasing it).
    pub fn try_write(&self, item: T) -> bool {
        if self.inner.state.load() != State::Open {
            drop(item);
            return false;
        }
        self.inner.queue.lock().push_back(item);
        self.inner.notify.notify_one();
        true
    }

    /// Like [`try_write`][Self::try_write], but fails with
    /// [`StreamError::ClosedStream`] instead of silently dropping.
    pub fn write(&self, item: T) -> Result<(), StreamError> {
        if self.try_write(item) {
            Ok(())
        } else {
            Err(StreamError::ClosedStream)
        }
    }

    /// Signals orderly completion. No-op if already closed/aborted.
    pub fn close(&self) {
        if self.inner.state.close() {
            self.inner.notify.notify_one();
        }
    }

    /// Signals failure with `cause`. No-op if already closed/aborted.
    pub fn close_with(&self, cause: StreamError) {
        if self.inner.state.close() {
            *self.inner.close_cause.lock() = Some(cause);
            self.inner.notify.notify_one();
        }
    }

    /// Signals upstream refusal: drains any queued elements and prevents any
    /// future `subscribe` from succeeding.
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::Release);
        *self.inner.close_cause.lock() = Some(StreamError::AbortedStream);
        if self.inner.state.cleanup_from_open() || self.inner.state.cleanup_from_closed() {
            self.drain();
        }
        self.inner.notify.notify_one();
        self.fulfill_completion_once(Completion::Err(StreamError::AbortedStream));
    }

    fn drain(&self) {
        self.inner.queue.lock().clear();
    }

    fn fulfill_completion_once(&self, result: Completion) {
        let mut slot = self.inner.completion.lock();
        if slot.is_none() {
            *slot = Some(result);
            self.inner.completion_notify.notify_waiters();
        }
    }

    /// Resolves exactly once: `Ok(())` on orderly drain, `Err(cause)` on
    /// error, cancel or abort.
    pub async fn completed(&self) -> Result<(), StreamError> {
        loop {
            {
                let slot = self.inner.completion.lock();
                match slot.as_ref() {
                    Some(Completion::Ok) => return Ok(()),
                    Some(Completion::Err(e)) => return Err(e.clone()),
                    None => {}
                }
            }
            self.inner.completion_notify.notified().await;
        }
    }

    /// Attaches `subscriber`, spawning the delivery loop on the current Tokio
    /// runtime. At most one subscriber may ever attach.
    pub fn subscribe(
        &self,
        mut subscriber: Box<dyn Subscriber<T>>,
        options: SubscriptionOptions,
    ) {
        if self
            .inner
            .subscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            subscriber.on_error(StreamError::IllegalState("stream already has a subscriber"));
            return;
        }
        if self.inner.aborted.load(Ordering::Acquire) {
            subscriber.on_error(StreamError::AbortedStream);
            return;
        }

        *self.inner.options.lock() = options;

        let subscription: Arc<dyn Subscription> = Arc::new(StreamSubscription {
            inner: Arc::clone(&self.inner),
        });
        subscriber.on_subscribe(Arc::clone(&subscription));

        let stream = self.clone();
        tokio::spawn(async move {
            stream.drive(subscriber).await;
        });
    }

    async fn drive(&self, mut subscriber: Box<dyn Subscriber<T>>) {
        loop {
            // Deliver as many elements as demand and the queue allow.
            loop {
                if self.inner.state.load() == State::Cleanup {
                    break;
                }
                if !self.inner.demand.take_one() {
                    break;
                }
                let item = {
                    let mut q = self.inner.queue.lock();
                    q.pop_front()
                };
                match item {
                    Some(item) => {
                        subscriber.on_next(item);
                    }
                    None => {
                        // Demand was consumed but nothing to deliver; put it back.
                        self.inner.demand.request(1);
                        break;
                    }
                }
            }

            let state = self.inner.state.load();
            let queue_empty = self.inner.queue.lock().is_empty();

            if state == State::Cleanup {
                let cause = self.inner.close_cause.lock().clone();
                let notify_cancellation = self.inner.options.lock().notify_cancellation;
                self.drain();
                match cause {
                    Some(cause) => {
                        tracing::debug!(%cause, "stream cleanup: reporting cause");
                        if notify_cancellation || !matches!(cause, StreamError::AbortedStream) {
                            subscriber.on_error(cause.clone());
                        }
                        self.fulfill_completion_once(Completion::Err(cause));
                    }
                    None => {
                        tracing::debug!("stream cleanup: cancelled without a cause");
                        if notify_cancellation {
                            subscriber.on_error(StreamError::CancelledSubscription);
                        }
                        self.fulfill_completion_once(Completion::Err(
                            StreamError::CancelledSubscription,
                        ));
                    }
                }
                return;
            }

            if state == State::Closed && queue_empty {
                self.inner.state.cleanup_from_closed();
                match self.inner.close_cause.lock().clone() {
                    Some(cause) => {
                        tracing::debug!(%cause, "stream closed with cause");
                        subscriber.on_error(cause.clone());
                        self.fulfill_completion_once(Completion::Err(cause));
                    }
                    None => {
                        tracing::trace!("stream completed successfully");
                        subscriber.on_complete();
                        self.fulfill_completion_once(Completion::Ok);
                    }
                }
                return;
            }

            self.inner.notify.notified().await;
        }
    }
}

struct StreamSubscription<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send> Subscription for StreamSubscription<T> {
    fn request(&self, n: u64) {
        self.inner.demand.request(n);
        self.inner.notify.notify_one();
    }

    fn cancel(&self) {
        if self.inner.state.cleanup_from_open() || self.inner.state.cleanup_from_closed() {
            tracing::trace!("subscription cancelled, draining queued elements");
            self.inner.queue.lock().clear();
        }
        self.inner.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::subscriber::FnSubscriber;

    #[tokio::test]
    async fn delivers_in_order_then_completes() {
        let stream = StreamMessage::<i32>::new();
        for i in 0..5 {
            assert!(stream.try_write(i));
        }
        stream.close();

        let received = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&received);
        let c = Arc::clone(&completed);
        let sub = FnSubscriber::new(
            move |item: i32| r.lock().push(item),
            |_err| panic!("unexpected error"),
            move || c.store(true, Ordering::SeqCst),
        )
        .on_subscribe(|s: Arc<dyn Subscription>| s.request(u64::MAX));

        stream.subscribe(Box::new(sub), SubscriptionOptions::NONE);
        stream.completed().await.expect("should complete cleanly");

        assert_eq!(*received.lock(), vec![0, 1, 2, 3, 4]);
        assert!(completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn second_subscribe_fails_with_illegal_state() {
        let stream = StreamMessage::<i32>::new();
        stream.subscribe(
            Box::new(FnSubscriber::new(|_| {}, |_| {}, || {})),
            SubscriptionOptions::NONE,
        );

        let got_error = Arc::new(AtomicBool::new(false));
        let g = Arc::clone(&got_error);
        stream.subscribe(
            Box::new(FnSubscriber::new(
                |_| {},
                move |e| {
                    assert!(matches!(e, StreamError::IllegalState(_)));
                    g.store(true, Ordering::SeqCst);
                },
                || {},
            )),
            SubscriptionOptions::NONE,
        );
        assert!(got_error.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn abort_before_subscribe_fails_later_subscriber() {
        let stream = StreamMessage::<i32>::new();
        stream.abort();

        let got_error = Arc::new(AtomicBool::new(false));
        let g = Arc::clone(&got_error);
        stream.subscribe(
            Box::new(FnSubscriber::new(
                |_| {},
                move |e| {
                    assert!(matches!(e, StreamError::AbortedStream));
                    g.store(true, Ordering::SeqCst);
                },
                || {},
            )),
            SubscriptionOptions::NONE,
        );
        assert!(got_error.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn closed_write_is_rejected_and_element_dropped() {
        let marker = Arc::new(());
        let stream = StreamMessage::<Arc<()>>::new();
        stream.close();
        assert!(!stream.try_write(Arc::clone(&marker)));
        // Only our local `marker` strong ref should remain.
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[tokio::test]
    async fn cancel_drains_queue_without_leaking() {
        let marker = Arc::new(AtomicUsize::new(0));
        struct Dropped(Arc<AtomicUsize>);
        impl Drop for Dropped {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let stream = StreamMessage::<Dropped>::new();
        for _ in 0..3 {
            stream.try_write(Dropped(Arc::clone(&marker)));
        }

        let sub = FnSubscriber::new(|_| {}, |_| {}, || {})
            .on_subscribe(|s: Arc<dyn Subscription>| s.cancel());
        stream.subscribe(Box::new(sub), SubscriptionOptions::NONE);

        // Give the drive loop a chance to run and observe cancellation.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(marker.load(Ordering::SeqCst), 3);
    }

    proptest::proptest! {
        /// Every element written before an orderly `close()` is delivered to
        /// the subscriber, in order, with no loss or duplication, regardless
        /// of how many elements there are (§4.2 "delivers as many elements
        /// as demand and the queue allow").
        #[test]
        fn all_written_elements_are_delivered_in_order_before_completion(items in proptest::collection::vec(proptest::num::i32::ANY, 0..100)) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let stream = StreamMessage::<i32>::new();
                for &item in &items {
                    assert!(stream.try_write(item));
                }
                stream.close();

                let received = Arc::new(Mutex::new(Vec::new()));
                let r = Arc::clone(&received);
                let sub = FnSubscriber::new(move |item: i32| r.lock().push(item), |_err| panic!("unexpected error"), || {})
                    .on_subscribe(|s: Arc<dyn Subscription>| s.request(u64::MAX));

                stream.subscribe(Box::new(sub), SubscriptionOptions::NONE);
                stream.completed().await.expect("should complete cleanly");

                assert_eq!(*received.lock(), items);
            });
        }
    }
}

/// Loom model of `AtomicState`'s `Open -> Closed` vs. `Open -> Cleanup` race
/// (an orderly `close()`/`close_with()` racing a concurrent `abort()`/`cancel()`,
/// message.rs:43-65), isolated from the full `StreamMessage` since its `Notify`
/// and `Mutex`-guarded queue have no loom-instrumented build. Same `#[cfg(loom)]`
/// gating convention as the teacher's `crates/jmux-proxy/src/sync.rs`.
#[cfg(loom)]
mod loom_tests {
    use loom::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
    use loom::sync::Arc;
    use loom::thread;

    const OPEN: u8 = 0;
    const CLOSED: u8 = 1;
    const CLEANUP: u8 = 2;

    #[test]
    fn close_and_cleanup_from_open_never_both_win() {
        loom::model(|| {
            let state = Arc::new(AtomicU8::new(OPEN));
            let wins = Arc::new(AtomicUsize::new(0));

            let close_state = Arc::clone(&state);
            let close_wins = Arc::clone(&wins);
            let closer = thread::spawn(move || {
                if close_state
                    .compare_exchange(OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    close_wins.fetch_add(1, Ordering::SeqCst);
                }
            });

            let cleanup_state = Arc::clone(&state);
            let cleanup_wins = Arc::clone(&wins);
            let aborter = thread::spawn(move || {
                if cleanup_state
                    .compare_exchange(OPEN, CLEANUP, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    cleanup_wins.fetch_add(1, Ordering::SeqCst);
                }
            });

            closer.join().unwrap();
            aborter.join().unwrap();

            assert_eq!(wins.load(Ordering::SeqCst), 1, "exactly one of close()/abort() must win the Open transition");
        });
    }
}
