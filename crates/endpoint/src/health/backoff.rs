use std::time::Duration;

use rand::Rng;

/// Computes the delay before the next health probe (§4.6 "Lifecycle",
/// "injectable backoff").
pub trait Backoff: Send + Sync {
    fn next_delay(&self) -> Duration;
}

/// Default backoff: a fixed interval with +/-20% jitter.
pub struct FixedJitterBackoff {
    base: Duration,
    jitter_ratio: f64,
}

impl FixedJitterBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, jitter_ratio: 0.2 }
    }

    pub fn with_jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio;
        self
    }
}

impl Backoff for FixedJitterBackoff {
    fn next_delay(&self) -> Duration {
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter_ratio..=self.jitter_ratio);
        self.base.mul_f64(factor.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_ratio() {
        let backoff = FixedJitterBackoff::new(Duration::from_millis(1000));
        for _ in 0..100 {
            let delay = backoff.next_delay();
            assert!(delay.as_millis() >= 800 && delay.as_millis() <= 1200);
        }
    }
}
