use metrics::counter;

/// Downstream-forwarder counters (spec §4.H).
pub struct ForwardMetrics {
    ns: &'static str,
}

impl ForwardMetrics {
    pub fn new(namespace: &'static str) -> Self {
        Self { ns: namespace }
    }

    #[inline]
    pub fn posted(&self) {
        counter!(format!("{}_forward_posted_total", self.ns)).increment(1);
    }

    #[inline]
    pub fn retried(&self) {
        counter!(format!("{}_forward_retried_total", self.ns)).increment(1);
    }

    #[inline]
    pub fn dropped(&self, reason: &'static str) {
        counter!(format!("{}_forward_dropped_total", self.ns), "reason" => reason).increment(1);
    }

    #[inline]
    pub fn queue_full(&self) {
        counter!(format!("{}_forward_queue_full_total", self.ns)).increment(1);
    }
}
