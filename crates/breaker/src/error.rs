use thiserror::Error;

/// Errors a [`crate::BreakerRegistry`] can report.
///
/// `CircuitBreaker::can_request` itself never fails: a rejected call is
/// reported by its `bool` return, which callers surface as their own
/// rejection error (e.g. `client-core`'s `CoreError::CircuitOpen`).
#[derive(Debug, Error)]
pub enum BreakerError {
    #[error("breaker factory for key {0:?} failed")]
    FactoryFailed(String),
}
