use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Caller's hook for rejecting a connection over the cap (§4.10).
pub trait ConnectionControl: Send + Sync {
    fn set_linger_zero(&self);
    fn force_close(&self);
}

/// Caps simultaneously accepted connections to `M`; connections over the
/// cap are linger-zero force-closed and logged at most once per second.
pub struct ConnectionPoolLimiter {
    max: usize,
    active: AtomicUsize,
    dropped: AtomicU64,
    last_warning: Mutex<Option<Instant>>,
}

impl ConnectionPoolLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            active: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
            last_warning: Mutex::new(None),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Accepts one connection, returning a guard that decrements the count
    /// on drop, or rejects it over the `control` hook if at capacity.
    pub fn accept(&self, control: &dyn ConnectionControl, now: Instant) -> Option<AcceptedConnection<'_>> {
        let before = self.active.fetch_add(1, Ordering::SeqCst);
        if before < self.max {
            return Some(AcceptedConnection { limiter: self });
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        control.set_linger_zero();
        control.force_close();
        self.dropped.fetch_add(1, Ordering::SeqCst);
        self.maybe_warn(now);
        None
    }

    fn maybe_warn(&self, now: Instant) {
        let mut last = self.last_warning.lock();
        if last.is_some_and(|t| now.duration_since(t) < Duration::from_secs(1)) {
            return;
        }
        *last = Some(now);
        tracing::warn!(dropped = self.dropped(), max = self.max, "dropping connections over the accepted-connection cap");
    }
}

/// A slot held for the lifetime of one accepted connection.
#[must_use]
pub struct AcceptedConnection<'a> {
    limiter: &'a ConnectionPoolLimiter,
}

impl Drop for AcceptedConnection<'_> {
    fn drop(&mut self) {
        self.limiter.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as Counter;
    use std::sync::Arc;

    struct Counting {
        lingered: Arc<Counter>,
        closed: Arc<Counter>,
    }

    impl ConnectionControl for Counting {
        fn set_linger_zero(&self) {
            self.lingered.fetch_add(1, Ordering::SeqCst);
        }
        fn force_close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn caps_accepted_connections_and_force_closes_excess() {
        let limiter = ConnectionPoolLimiter::new(2);
        let lingered = Arc::new(Counter::new(0));
        let closed = Arc::new(Counter::new(0));
        let control = Counting {
            lingered: Arc::clone(&lingered),
            closed: Arc::clone(&closed),
        };

        let now = Instant::now();
        let a = limiter.accept(&control, now).unwrap();
        let b = limiter.accept(&control, now).unwrap();
        assert!(limiter.accept(&control, now).is_none());
        assert_eq!(limiter.dropped(), 1);
        assert_eq!(lingered.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        drop(a);
        let c = limiter.accept(&control, now).unwrap();
        assert_eq!(limiter.active(), 2);
        drop(b);
        drop(c);
        assert_eq!(limiter.active(), 0);
    }
}
