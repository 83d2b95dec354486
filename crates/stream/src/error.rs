/// Failure kinds surfaced by a [`crate::StreamMessage`] and its subscription.
///
/// These mirror the error taxonomy of §7: a stream never panics on a
/// protocol violation, it reports one of these instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// A write was attempted after the stream observed a close or abort.
    #[error("stream is closed")]
    ClosedStream,

    /// A second `subscribe` was attempted on a stream that already has a subscriber.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// `subscribe` was called after `abort()` had already been observed.
    #[error("stream was aborted before a subscriber attached")]
    AbortedStream,

    /// The subscriber cancelled its subscription (only surfaced when
    /// [`crate::SubscriptionOption::NotifyCancellation`] is set).
    #[error("subscription was cancelled")]
    CancelledSubscription,

    /// `close(cause)` was called with an application-supplied cause.
    #[error("{0}")]
    Cause(String),
}

impl StreamError {
    pub fn cause(message: impl Into<String>) -> Self {
        Self::Cause(message.into())
    }
}
