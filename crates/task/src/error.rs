use std::fmt;

/// Errors a [`crate::StartStopSupport`] can report.
#[derive(Debug)]
pub enum LifecycleError<E> {
    /// A precondition was violated, e.g. a strict `start()` while already starting.
    IllegalState(&'static str),
    /// `do_start` or `do_stop` itself failed.
    Component(E),
}

impl<E: fmt::Display> fmt::Display for LifecycleError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalState(msg) => write!(f, "illegal lifecycle state: {msg}"),
            Self::Component(err) => write!(f, "{err}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for LifecycleError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IllegalState(_) => None,
            Self::Component(err) => Some(err),
        }
    }
}

impl<E> From<E> for LifecycleError<E> {
    fn from(value: E) -> Self {
        Self::Component(value)
    }
}
