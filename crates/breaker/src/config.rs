use std::time::Duration;

use typed_builder::TypedBuilder;

/// Tunables for a [`crate::CircuitBreaker`] (§6 "Configuration options").
#[derive(Debug, Clone, TypedBuilder)]
pub struct BreakerConfig {
    /// Failure rate above which CLOSED transitions to OPEN, in `(0.0, 1.0]`.
    #[builder(default = 0.5)]
    pub failure_rate_threshold: f64,

    /// Minimum number of events before the rate is evaluated at all.
    #[builder(default = 10)]
    pub minimum_request_threshold: u64,

    /// Duration OPEN remains before a HALF_OPEN trial is permitted.
    #[builder(default = Duration::from_secs(10))]
    pub circuit_open_window: Duration,

    /// Duration between trial requests while HALF_OPEN.
    #[builder(default = Duration::from_secs(3))]
    pub trial_request_interval: Duration,

    /// `W`: duration of the sliding window.
    #[builder(default = Duration::from_secs(10))]
    pub counter_sliding_window: Duration,

    /// `U`: bucket rotation interval, must be `<= counter_sliding_window`.
    #[builder(default = Duration::from_secs(1))]
    pub counter_update_interval: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
