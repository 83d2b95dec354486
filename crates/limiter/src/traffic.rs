use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Toggles channel auto-read based on undelivered inbound byte count (§4.9).
pub trait ReadControl: Send + Sync {
    fn disable_auto_read(&self);
    fn enable_auto_read(&self);
}

/// Backpressure gate between two watermarks. `inc`/`dec` report exactly one
/// [`ReadControl`] call per boundary crossing, never on every call.
pub struct InboundTrafficController<C> {
    high: usize,
    low: usize,
    pending: AtomicUsize,
    reading: AtomicBool,
    control: C,
}

impl<C: ReadControl> InboundTrafficController<C> {
    pub fn new(high: usize, low: usize, control: C) -> Self {
        assert!(low <= high, "low watermark must not exceed high watermark");
        Self {
            high,
            low,
            pending: AtomicUsize::new(0),
            reading: AtomicBool::new(true),
            control,
        }
    }

    pub fn inc(&self, n: usize) {
        let before = self.pending.fetch_add(n, Ordering::SeqCst);
        let after = before + n;
        if before < self.high && after >= self.high && self.reading.swap(false, Ordering::SeqCst) {
            self.control.disable_auto_read();
        }
    }

    pub fn dec(&self, n: usize) {
        let before = self.pending.fetch_sub(n, Ordering::SeqCst);
        let after = before - n;
        if before > self.low && after <= self.low && !self.reading.swap(true, Ordering::SeqCst) {
            self.control.enable_auto_read();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}
