use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use breaker::{BreakerConfig, BreakerKeyFn, BreakerRegistry};
use endpoint::{Endpoint, EndpointError, Selector};
use limiter::ConcurrencyLimiter;
use scheduler::EventLoopScheduler;

use crate::error::CoreError;

/// Ties the scheduler, circuit breaker, and concurrency limiter together
/// around one outbound call, the way §2's data-flow describes it: select an
/// endpoint, acquire a scheduler slot for it, gate on the breaker, run the
/// call through the limiter, and report the outcome back to the breaker.
pub struct OutboundClient<K, F> {
    selector: Arc<dyn Selector>,
    scheduler: Arc<EventLoopScheduler>,
    breakers: BreakerRegistry<K, F>,
    limiter: ConcurrencyLimiter,
}

impl<K, F> OutboundClient<K, F>
where
    K: BreakerKeyFn,
    F: Fn(&str) -> Result<BreakerConfig, String>,
{
    pub fn new(selector: Arc<dyn Selector>, scheduler: Arc<EventLoopScheduler>, key_fn: K, breaker_factory: F, limiter: ConcurrencyLimiter) -> Self {
        Self {
            selector,
            scheduler,
            breakers: BreakerRegistry::new(key_fn, breaker_factory),
            limiter,
        }
    }

    /// Runs `f` against a selected endpoint, honoring the breaker and the
    /// concurrency limiter. `f`'s own error type must convert into
    /// [`CoreError`] so failures still report back to the breaker.
    #[tracing::instrument(skip_all, fields(method))]
    pub async fn call<C, Fut, T, E>(&self, method: &str, f: C) -> Result<T, CoreError>
    where
        C: FnOnce(Endpoint, usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<CoreError>,
    {
        let endpoint = self.selector.select().ok_or_else(|| {
            tracing::warn!(%method, "endpoint selection failed, group is empty or all members unhealthy");
            EndpointError::EndpointGroup
        })?;
        let breaker = self.breakers.get_or_create(method, endpoint.authority())?;

        if !breaker.can_request(Instant::now()) {
            tracing::warn!(%method, authority = endpoint.authority(), "circuit breaker rejected request");
            return Err(CoreError::CircuitOpen);
        }

        let entry = self.scheduler.acquire(endpoint.authority());
        let event_loop_id = entry.event_loop_id;
        let called_endpoint = endpoint.clone();

        let outcome = self.limiter.run(move || f(called_endpoint, event_loop_id)).await;
        entry.release();

        let now = Instant::now();
        match outcome {
            Ok(Ok(value)) => {
                breaker.on_success(now);
                Ok(value)
            }
            Ok(Err(cause)) => {
                breaker.on_failure(now);
                Err(cause.into())
            }
            Err(limiter_err) => {
                breaker.on_failure(now);
                Err(limiter_err.into())
            }
        }
    }
}
