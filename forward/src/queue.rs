use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::warn;

use callfeed_metrics::ForwardMetrics;

/// A bounded FIFO of pending forward jobs. Unlike a `tokio::sync::mpsc`
/// channel (which rejects the newest item on overflow), a full queue here
/// evicts the *oldest* pending forward and logs it, per spec §5's "a bounded
/// worker pool with a task queue that, when full, drops the oldest pending
/// forward and logs."
///
/// `in_flight` tracks jobs that are queued *or* currently being executed by a
/// worker (including retries), so `Forwarder::flush` can tell when every
/// submitted forward has actually finished rather than merely left the
/// queue.
pub struct ForwardQueue<T> {
    inner: Mutex<VecDeque<T>>,
    notify: Notify,
    drained: Notify,
    cap: usize,
    in_flight: AtomicUsize,
    metrics: Arc<ForwardMetrics>,
}

impl<T> ForwardQueue<T> {
    pub fn new(cap: usize, metrics: Arc<ForwardMetrics>) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            notify: Notify::new(),
            drained: Notify::new(),
            cap,
            in_flight: AtomicUsize::new(0),
            metrics,
        }
    }

    pub fn push(&self, job: T) {
        let mut q = self.inner.lock().unwrap();
        let evicted = if q.len() >= self.cap {
            q.pop_front();
            warn!("forward queue full, dropping oldest pending forward");
            self.metrics.queue_full();
            true
        } else {
            false
        };
        q.push_back(job);
        drop(q);
        if !evicted {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
        }
        self.notify.notify_one();
    }

    pub async fn pop(&self) -> T {
        loop {
            {
                let mut q = self.inner.lock().unwrap();
                if let Some(job) = q.pop_front() {
                    return job;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Marks one previously-popped job as finished (delivered, dropped after
    /// exhausting retries, or evicted). Wakes any pending `wait_drained`.
    pub fn complete(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once `in_flight` reaches zero. Callers are expected to race
    /// this against a timeout.
    pub async fn wait_drained(&self) {
        loop {
            // Register interest before checking, so a `complete()` racing
            // between the check and the await can't be missed.
            let notified = self.drained.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
