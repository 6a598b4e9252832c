use metrics::{counter, histogram};

/// Ingestion validation/persist counters (spec §4.F).
pub struct IngestMetrics {
    ns: &'static str,
}

impl IngestMetrics {
    pub fn new(namespace: &'static str) -> Self {
        Self { ns: namespace }
    }

    #[inline]
    pub fn accepted(&self) {
        counter!(format!("{}_ingest_accepted_total", self.ns)).increment(1);
    }

    #[inline]
    pub fn rejected(&self, reason: &'static str) {
        counter!(format!("{}_ingest_rejected_total", self.ns), "reason" => reason).increment(1);
    }

    #[inline]
    pub fn store_seconds(&self, seconds: f64) {
        histogram!(format!("{}_ingest_store_seconds", self.ns)).record(seconds);
    }

    #[inline]
    pub fn talkgroup_auto_populated(&self) {
        counter!(format!("{}_ingest_talkgroup_auto_populated_total", self.ns)).increment(1);
    }
}
