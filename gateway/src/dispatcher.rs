//! Single fan-out point (spec §4.E): matches every newly accepted call
//! against every session's subscription and enqueues a copy to each match,
//! without ever blocking the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use callfeed_control::{Permission, SessionToken};
use callfeed_metrics::DispatchMetrics;
use callfeed_protocol::{Call, CallId, LivefeedMap, ServerMessage, SystemId, TalkgroupId};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tracing::warn;

/// Credential allow-list intersected with the session's `LivefeedMap` (spec
/// §4.E step 1). Immutable; replaced wholesale on every `LFM`.
#[derive(Clone)]
pub struct FilterSnapshot {
    pub permission: Permission,
    pub livefeed: LivefeedMap,
}

impl FilterSnapshot {
    pub fn new(permission: Permission) -> Self {
        Self { permission, livefeed: LivefeedMap::default() }
    }

    /// True if `call` matches directly, or via a patched talkgroup, and the
    /// matching pair is active in the session's `LivefeedMap` (spec §8: "the
    /// session's LivefeedMap marks one of those pairs active").
    fn matches(&self, call: &Call) -> bool {
        if self.pair_matches(call.system, call.talkgroup) {
            return true;
        }
        call.patches.iter().any(|&tg| self.pair_matches(call.system, tg))
    }

    fn pair_matches(&self, sys: SystemId, tg: TalkgroupId) -> bool {
        self.permission.allows(sys, tg) && self.livefeed.is_active(sys, tg)
    }
}

/// Handle a session keeps after registering: lets it update its own filter
/// and learn when the dispatcher has dropped it for a saturated queue.
pub struct SessionHandle {
    pub filter: Arc<ArcSwap<FilterSnapshot>>,
    overflowed: Arc<AtomicBool>,
    kill: Arc<Notify>,
}

impl SessionHandle {
    pub fn set_filter(&self, snapshot: FilterSnapshot) {
        self.filter.store(Arc::new(snapshot));
    }

    /// Resolves once the dispatcher has marked this session for drop.
    pub async fn dropped(&self) {
        self.kill.notified().await;
    }

    pub fn is_dropped(&self) -> bool {
        self.overflowed.load(Ordering::Relaxed)
    }
}

struct DispatchEntry {
    sender: mpsc::Sender<ServerMessage>,
    filter: Arc<ArcSwap<FilterSnapshot>>,
    overflowed: Arc<AtomicBool>,
    kill: Arc<Notify>,
}

/// Process-wide session table (spec §4.E). A `DashMap` gives sharded,
/// lock-striped reads so `notify_call` never serializes behind one global
/// lock, mirroring the sharded session map already used by the teacher's
/// gateway state for its fan-out hub.
pub struct Dispatcher {
    sessions: DashMap<SessionToken, DispatchEntry>,
    metrics: Arc<DispatchMetrics>,
    shutting_down: AtomicBool,
    shutdown: Notify,
}

impl Dispatcher {
    pub fn new(metrics: Arc<DispatchMetrics>) -> Self {
        Self {
            sessions: DashMap::new(),
            metrics,
            shutting_down: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Signals every session to close its transport (spec §5: "a server
    /// shutdown signal closes all transports").
    pub fn shutdown_all(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// Resolves once `shutdown_all` has been called. Race-free against a
    /// call landing between the check and the await.
    pub async fn shutdown_signal(&self) {
        loop {
            let notified = self.shutdown.notified();
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    pub fn register(
        &self,
        token: SessionToken,
        sender: mpsc::Sender<ServerMessage>,
        initial: FilterSnapshot,
    ) -> SessionHandle {
        let filter = Arc::new(ArcSwap::from_pointee(initial));
        let overflowed = Arc::new(AtomicBool::new(false));
        let kill = Arc::new(Notify::new());
        self.sessions.insert(
            token,
            DispatchEntry {
                sender,
                filter: filter.clone(),
                overflowed: overflowed.clone(),
                kill: kill.clone(),
            },
        );
        SessionHandle { filter, overflowed, kill }
    }

    pub fn unregister(&self, token: SessionToken) {
        self.sessions.remove(&token);
    }

    pub fn live_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Matches `call` against every registered session's filter and enqueues
    /// a `CAL` push to each match (spec §4.E). Never awaits: a full queue
    /// marks the session for drop instead of blocking the dispatcher.
    pub fn notify_call(&self, call: Arc<Call>) {
        self.metrics.call_notified();
        let mut fanout = 0usize;
        for entry in self.sessions.iter() {
            let snapshot = entry.filter.load();
            if !snapshot.matches(&call) {
                continue;
            }
            fanout += 1;
            let msg = ServerMessage::Cal { call: Box::new((*call).clone()), flag: Value::Null };
            self.try_enqueue(entry.key(), &entry, msg);
        }
        if fanout > 0 {
            self.metrics.call_matched(fanout);
        }
    }

    pub fn broadcast_lsc(&self, count: i64) {
        for entry in self.sessions.iter() {
            self.try_enqueue(entry.key(), &entry, ServerMessage::Lsc(count));
        }
    }

    fn try_enqueue(&self, token: &SessionToken, entry: &DispatchEntry, msg: ServerMessage) {
        match entry.sender.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(?token, "session outbound queue full, marking for drop");
                entry.overflowed.store(true, Ordering::Relaxed);
                entry.kill.notify_one();
                self.metrics.enqueue_dropped();
            }
            Err(TrySendError::Closed(_)) => {
                // Writer already gone; the session's own teardown will unregister it.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callfeed_protocol::{AllMarker, SystemsAllow};
    use chrono::Utc;

    fn call(system: i64, talkgroup: i64, patches: Vec<i64>) -> Arc<Call> {
        Arc::new(Call {
            id: CallId(1),
            date_time: Utc::now(),
            system: SystemId(system),
            talkgroup: TalkgroupId(talkgroup),
            frequency: None,
            source: None,
            sources: vec![],
            frequencies: vec![],
            patches: patches.into_iter().map(TalkgroupId).collect(),
            audio: Some(vec![1, 2, 3]),
            audio_url: None,
            audio_name: None,
            audio_type: None,
        })
    }

    fn permission_all() -> Permission {
        Permission { code: "X".into(), systems: SystemsAllow::All(AllMarker), limit: None }
    }

    fn livefeed_on(system: i64, talkgroup: i64) -> LivefeedMap {
        let mut inner = std::collections::HashMap::new();
        inner.insert(TalkgroupId(talkgroup), true);
        let mut outer = std::collections::HashMap::new();
        outer.insert(SystemId(system), inner);
        LivefeedMap(outer)
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(DispatchMetrics::new("test")))
    }

    #[tokio::test]
    async fn direct_match_is_enqueued() {
        let d = dispatcher();
        let (tx, mut rx) = mpsc::channel(8);
        let snapshot = FilterSnapshot {
            permission: permission_all(),
            livefeed: livefeed_on(1, 1001),
        };
        d.register(SessionToken::next(), tx, snapshot);

        d.notify_call(call(1, 1001, vec![]));
        let msg = rx.try_recv().expect("expected a CAL push");
        assert!(matches!(msg, ServerMessage::Cal { .. }));
    }

    #[tokio::test]
    async fn inactive_talkgroup_is_not_enqueued() {
        let d = dispatcher();
        let (tx, mut rx) = mpsc::channel(8);
        let snapshot = FilterSnapshot {
            permission: permission_all(),
            livefeed: livefeed_on(1, 1001),
        };
        d.register(SessionToken::next(), tx, snapshot);

        d.notify_call(call(1, 1002, vec![]));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn patched_talkgroup_is_delivered() {
        let d = dispatcher();
        let (tx, mut rx) = mpsc::channel(8);
        let snapshot = FilterSnapshot {
            permission: permission_all(),
            livefeed: livefeed_on(1, 1001),
        };
        d.register(SessionToken::next(), tx, snapshot);

        // Call lands on 1002 but patches in 1001, which the session subscribes to.
        d.notify_call(call(1, 1002, vec![1001]));
        let msg = rx.try_recv().expect("expected a CAL push via patch match");
        assert!(matches!(msg, ServerMessage::Cal { .. }));
    }

    #[tokio::test]
    async fn permission_restricts_match_even_with_livefeed_on() {
        let d = dispatcher();
        let (tx, mut rx) = mpsc::channel(8);
        // Restrict to system 1, talkgroup 1001 only.
        let restricted = Permission {
            code: "X".into(),
            systems: SystemsAllow::Scoped({
                let mut m = std::collections::HashMap::new();
                m.insert(
                    SystemId(1),
                    callfeed_protocol::TalkgroupScope::List(vec![TalkgroupId(1001)]),
                );
                m
            }),
            limit: None,
        };
        let snapshot = FilterSnapshot { permission: restricted, livefeed: livefeed_on(1, 1002) };
        d.register(SessionToken::next(), tx, snapshot);

        d.notify_call(call(1, 1002, vec![]));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_marks_session_for_drop() {
        let d = dispatcher();
        let (tx, _rx) = mpsc::channel(1);
        let snapshot = FilterSnapshot { permission: permission_all(), livefeed: livefeed_on(1, 1001) };
        let handle = d.register(SessionToken::next(), tx, snapshot);

        d.notify_call(call(1, 1001, vec![]));
        d.notify_call(call(1, 1001, vec![]));

        assert!(handle.is_dropped());
    }

    #[tokio::test]
    async fn unregister_removes_from_fanout() {
        let d = dispatcher();
        let (tx, mut rx) = mpsc::channel(8);
        let token = SessionToken::next();
        let snapshot = FilterSnapshot { permission: permission_all(), livefeed: livefeed_on(1, 1001) };
        d.register(token, tx, snapshot);
        d.unregister(token);

        d.notify_call(call(1, 1001, vec![]));
        assert!(rx.try_recv().is_err());
        assert_eq!(d.live_session_count(), 0);
    }
}
