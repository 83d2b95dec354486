mod backoff;
mod checker;
mod context;
mod group;

pub use backoff::{Backoff, FixedJitterBackoff};
pub use checker::{CheckerFactory, HealthChecker, LongPollingChecker};
pub use context::{is_healthy, CheckerContext};
pub use group::HealthCheckedEndpointGroup;
