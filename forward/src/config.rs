use std::time::Duration;

/// Downstream-forwarder tunables (spec §4.H, §9 open question: "implementers
/// should pick a conservative default and make it configurable").
#[derive(Clone, Debug)]
pub struct ForwardConfig {
    /// Bounded work-queue depth; a full queue drops the oldest pending
    /// forward and logs (spec §5).
    pub queue_depth: usize,
    /// Fixed-size worker pool POSTing to downstream peers.
    pub workers: usize,
    /// Maximum POST attempts before a forward is dropped.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub backoff_base: Duration,
    /// Backoff ceiling; doubles from `backoff_base` up to this on each retry.
    pub backoff_max: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            queue_depth: 256,
            workers: 4,
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(32),
            request_timeout: Duration::from_secs(10),
        }
    }
}
