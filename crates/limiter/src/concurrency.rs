use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::LimiterError;

/// Caps in-flight calls through a delegate to `N`, deferring excess callers
/// in an implicit FIFO queue up to an enqueue timeout (§4.8).
///
/// `N = 0` disables the limiter: every call runs immediately. Queuing,
/// the active-count cap, and "each waiter runs exactly once or times out
/// exactly once" are what [`tokio::sync::Semaphore`] already guarantees
/// (its internal waiter list is the queue; a dropped acquire future is the
/// "task could not cancel its timer in time" case folding into the same
/// code path as a normal timeout), so this wraps it rather than
/// reimplementing a CAS-based active counter by hand.
pub struct ConcurrencyLimiter {
    semaphore: Option<Arc<Semaphore>>,
    enqueue_timeout: Duration,
    active: AtomicUsize,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrency: usize, enqueue_timeout: Duration) -> Self {
        Self {
            semaphore: (max_concurrency > 0).then(|| Arc::new(Semaphore::new(max_concurrency))),
            enqueue_timeout,
            active: AtomicUsize::new(0),
        }
    }

    /// Number of calls currently executing through the delegate.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn run<F, Fut, T>(&self, delegate: F) -> Result<T, LimiterError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(semaphore) = &self.semaphore else {
            return Ok(delegate().await);
        };

        let permit = tokio::time::timeout(self.enqueue_timeout, Arc::clone(semaphore).acquire_owned())
            .await
            .map_err(|_elapsed| LimiterError::RequestTimeout)?
            .expect("semaphore is never closed");

        self.active.fetch_add(1, Ordering::SeqCst);
        let output = delegate().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        drop(permit);

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    #[tokio::test]
    async fn caps_active_and_drains_the_queue() {
        let limiter = Arc::new(ConcurrencyLimiter::new(2, Duration::from_millis(100)));
        let peak = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                limiter
                    .run(|| async {
                        let observed = limiter.active() as u32;
                        peak.fetch_max(observed, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn fifth_task_times_out_without_running_delegate() {
        let limiter = Arc::new(ConcurrencyLimiter::new(2, Duration::from_millis(100)));
        let ran = Arc::new(AtomicU32::new(0));

        // Occupy both slots for 200ms.
        for _ in 0..2 {
            let limiter = Arc::clone(&limiter);
            let ran = Arc::clone(&ran);
            tokio::spawn(async move {
                limiter
                    .run(|| async {
                        ran.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    })
                    .await
            });
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let start = Instant::now();
        let result = limiter
            .run(|| async {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(matches!(result, Err(LimiterError::RequestTimeout)));
        assert!(start.elapsed() >= Duration::from_millis(90));
        assert_eq!(ran.load(Ordering::SeqCst), 2, "the 5th task must not invoke the delegate");
    }

    #[tokio::test]
    async fn zero_disables_limiting() {
        let limiter = ConcurrencyLimiter::new(0, Duration::from_millis(10));
        let result = limiter.run(|| async { 42 }).await.unwrap();
        assert_eq!(result, 42);
    }
}
