//! Downstream forwarder (spec §4.H): re-posts each accepted call to every
//! enabled `Downstream` whose allow-list admits it, asynchronously and
//! without ever blocking ingestion.

mod config;
mod queue;

pub use config::ForwardConfig;

use std::sync::Arc;
use std::time::Duration;

use callfeed_metrics::ForwardMetrics;
use callfeed_protocol::{Call, Downstream};
use queue::ForwardQueue;
use tracing::warn;

struct ForwardJob {
    downstream: Downstream,
    call: Arc<Call>,
    attempt: u32,
}

/// Owns the bounded queue and worker pool; `submit` is the only entry point
/// ingestion calls, and it never awaits store/network I/O.
pub struct Forwarder {
    queue: Arc<ForwardQueue<ForwardJob>>,
}

impl Forwarder {
    /// Spawns `cfg.workers` background tasks sharing one `reqwest::Client`.
    pub fn spawn(cfg: ForwardConfig, metrics: Arc<ForwardMetrics>) -> Self {
        let queue = Arc::new(ForwardQueue::new(cfg.queue_depth, metrics.clone()));
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .expect("reqwest client");

        for _ in 0..cfg.workers {
            let queue = queue.clone();
            let client = client.clone();
            let cfg = cfg.clone();
            let metrics = metrics.clone();
            tokio::spawn(async move {
                loop {
                    let job = queue.pop().await;
                    run_job(&client, &cfg, &metrics, job).await;
                    queue.complete();
                }
            });
        }

        Self { queue }
    }

    /// Enqueues a forward for every downstream whose allow-list admits
    /// `call`. Never blocks: a full queue drops the oldest pending job.
    pub fn submit(&self, downstreams: impl IntoIterator<Item = Downstream>, call: Arc<Call>) {
        for downstream in downstreams {
            if downstream.disabled || !downstream.systems.allows(call.system, call.talkgroup) {
                continue;
            }
            self.queue.push(ForwardJob {
                downstream,
                call: call.clone(),
                attempt: 0,
            });
        }
    }

    /// Waits for every queued/in-flight forward to finish, up to `timeout`
    /// (spec §5: "flushes pending downstream posts with a bounded timeout").
    /// Returns `true` if the queue drained, `false` if the timeout elapsed
    /// with posts still outstanding.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let remaining = self.queue.in_flight();
        if remaining == 0 {
            return true;
        }
        warn!(remaining, "flushing pending downstream forwards before shutdown");
        match tokio::time::timeout(timeout, self.queue.wait_drained()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(remaining = self.queue.in_flight(), "shutdown timeout reached with forwards still pending");
                false
            }
        }
    }
}

async fn run_job(
    client: &reqwest::Client,
    cfg: &ForwardConfig,
    metrics: &ForwardMetrics,
    mut job: ForwardJob,
) {
    loop {
        job.attempt += 1;
        let body = serde_json::to_vec(job.call.as_ref()).unwrap_or_default();
        let result = client
            .post(&job.downstream.url)
            .header("x-api-key", &job.downstream.api_key)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                metrics.posted();
                return;
            }
            Ok(resp) => {
                warn!(url = %job.downstream.url, status = %resp.status(), "downstream rejected forward");
            }
            Err(e) => {
                warn!(url = %job.downstream.url, error = %e, "downstream forward failed");
            }
        }

        if job.attempt >= cfg.max_attempts {
            metrics.dropped("max_attempts_exceeded");
            return;
        }
        metrics.retried();
        let backoff = backoff_for_attempt(cfg, job.attempt);
        tokio::time::sleep(backoff).await;
    }
}

fn backoff_for_attempt(cfg: &ForwardConfig, attempt: u32) -> Duration {
    let doubled = cfg.backoff_base.saturating_mul(1u32 << attempt.min(8));
    doubled.min(cfg.backoff_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_escalates_then_caps() {
        let cfg = ForwardConfig::default();
        assert_eq!(backoff_for_attempt(&cfg, 1), Duration::from_secs(2));
        assert_eq!(backoff_for_attempt(&cfg, 5), Duration::from_secs(32));
        assert_eq!(backoff_for_attempt(&cfg, 20), Duration::from_secs(32));
    }
}
