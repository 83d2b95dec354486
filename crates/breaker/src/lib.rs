//! Non-blocking three-state circuit breaker over a sliding-window failure
//! counter (§4.4).
//!
//! A [`CircuitBreaker`] tracks recent call outcomes in a
//! [`SlidingWindowCounter`] and flips CLOSED -> OPEN once both the minimum
//! request threshold and the failure rate threshold are crossed. After
//! `circuit_open_window`, the breaker admits a single HALF_OPEN trial; its
//! outcome alone decides whether the circuit closes or reopens.
//! [`BreakerRegistry`] keys breakers by method, authority, or a custom
//! function, creating one lazily per key via an injected factory.

mod config;
mod counter;
mod error;
mod listener;
mod registry;
mod state;

pub use config::BreakerConfig;
pub use counter::{EventCount, SlidingWindowCounter};
pub use error::BreakerError;
pub use listener::BreakerListener;
pub use registry::{by_authority, by_method, by_method_and_authority, BreakerKeyFn, BreakerRegistry};
pub use state::{CircuitBreaker, CircuitState};
