//! In-flight concurrency limiting, inbound backpressure, and accepted-connection
//! capping (§4.8, §4.9, §4.10).

mod concurrency;
mod error;
mod pool_limiter;
mod traffic;

pub use concurrency::ConcurrencyLimiter;
pub use error::LimiterError;
pub use pool_limiter::{AcceptedConnection, ConnectionControl, ConnectionPoolLimiter};
pub use traffic::{InboundTrafficController, ReadControl};
