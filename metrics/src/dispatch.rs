use metrics::{counter, histogram};

/// Fan-out counters for the dispatcher (spec §4.E).
pub struct DispatchMetrics {
    ns: &'static str,
}

impl DispatchMetrics {
    pub fn new(namespace: &'static str) -> Self {
        Self { ns: namespace }
    }

    #[inline]
    pub fn call_notified(&self) {
        counter!(format!("{}_dispatch_calls_notified_total", self.ns)).increment(1);
    }

    #[inline]
    pub fn call_matched(&self, fanout: usize) {
        counter!(format!("{}_dispatch_calls_matched_total", self.ns)).increment(1);
        histogram!(format!("{}_dispatch_fanout", self.ns)).record(fanout as f64);
    }

    #[inline]
    pub fn enqueue_dropped(&self) {
        counter!(format!("{}_dispatch_enqueue_dropped_total", self.ns)).increment(1);
    }
}
