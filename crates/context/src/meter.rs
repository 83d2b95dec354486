/// Minimal metrics sink a request context carries a handle to.
///
/// Metrics export itself is out of scope; this is the narrow surface
/// components in this core call into (counters and timers keyed by name),
/// so that a real registry can be plugged in by the embedding application.
pub trait MeterRegistry: Send + Sync {
    fn increment_counter(&self, name: &'static str, amount: u64);
    fn record_duration(&self, name: &'static str, duration: std::time::Duration);
}

/// A registry that discards everything, used where no metrics backend is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMeterRegistry;

impl MeterRegistry for NoopMeterRegistry {
    fn increment_counter(&self, _name: &'static str, _amount: u64) {}
    fn record_duration(&self, _name: &'static str, _duration: std::time::Duration) {}
}
