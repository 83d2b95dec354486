use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("session refuses to send requests")]
    ClosedSession,

    /// The request never reached the wire; callers may retry safely.
    #[error("request never reached the wire")]
    UnprocessedRequest(#[source] Box<HttpClientError>),

    #[error("first byte not written before deadline")]
    WriteTimeout,

    #[error("h2 transport error")]
    Wire(#[from] h2::Error),
}
