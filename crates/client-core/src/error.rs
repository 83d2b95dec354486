use thiserror::Error;

/// The unified error surface of the resilience core (§7).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Stream(#[from] stream::StreamError),

    #[error(transparent)]
    Endpoint(#[from] endpoint::EndpointError),

    #[error(transparent)]
    Limiter(#[from] limiter::LimiterError),

    #[error(transparent)]
    Http(#[from] http_request_publisher::HttpClientError),

    #[error(transparent)]
    Breaker(#[from] breaker::BreakerError),

    /// The circuit guarding this call is open; callers should not retry
    /// immediately (§4.4 "OPEN").
    #[error("circuit breaker rejected the request")]
    CircuitOpen,

    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}
