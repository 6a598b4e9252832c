use metrics::counter;

/// Session lifecycle and control-frame counters (spec §4.D), named after the
/// teacher's `GatewayMetrics`.
pub struct GatewayMetrics {
    ns: &'static str,
}

impl GatewayMetrics {
    pub fn new(namespace: &'static str) -> Self {
        Self { ns: namespace }
    }

    #[inline]
    pub fn session_opened(&self) {
        counter!(format!("{}_gateway_sessions_opened_total", self.ns)).increment(1);
    }

    #[inline]
    pub fn session_closed(&self) {
        counter!(format!("{}_gateway_sessions_closed_total", self.ns)).increment(1);
    }

    #[inline]
    pub fn auth_accepted(&self) {
        counter!(format!("{}_gateway_auth_accepted_total", self.ns)).increment(1);
    }

    #[inline]
    pub fn auth_rejected(&self, kind: &'static str) {
        counter!(format!("{}_gateway_auth_rejected_total", self.ns), "kind" => kind).increment(1);
    }

    #[inline]
    pub fn admission_too_many(&self) {
        counter!(format!("{}_gateway_admission_too_many_total", self.ns)).increment(1);
    }

    #[inline]
    pub fn control_msg_rx(&self, tag: &'static str) {
        counter!(format!("{}_gateway_control_rx_total", self.ns), "tag" => tag).increment(1);
    }

    #[inline]
    pub fn control_msg_tx(&self, tag: &'static str) {
        counter!(format!("{}_gateway_control_tx_total", self.ns), "tag" => tag).increment(1);
    }

    #[inline]
    pub fn session_dropped_slow_consumer(&self) {
        counter!(format!("{}_gateway_sessions_dropped_slow_consumer_total", self.ns)).increment(1);
    }
}
