use std::sync::atomic::{AtomicU64, Ordering};

use crate::Endpoint;

/// Per-candidate state handed to a health checker factory (§4.6 "Checker context").
///
/// `update_health` is the only mutation surface a checker implementation
/// needs; the health value is clamped to `[0.0, 1.0]` at both ends (§9,
/// Open Question (b)) regardless of what the checker reports.
pub struct CheckerContext {
    endpoint: Endpoint,
    health_bits: AtomicU64,
}

impl CheckerContext {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            health_bits: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn health(&self) -> f64 {
        f64::from_bits(self.health_bits.load(Ordering::Acquire))
    }

    pub fn update_health(&self, value: f64) {
        let clamped = value.clamp(0.0, 1.0);
        self.health_bits.store(clamped.to_bits(), Ordering::Release);
    }
}

/// An endpoint is considered healthy once its reported health is strictly
/// positive (§4.6 "Responsibility").
pub fn is_healthy(health: f64) -> bool {
    health > 0.0
}
