use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Opaque handle a caller passes to `admit`/`release`; must be unique per
/// live session. `next()` hands out a process-wide monotonic id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl SessionToken {
    pub fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admit {
    Ok,
    TooMany,
}

/// Process-wide live-session tracker (spec §4.C). All operations serialize
/// under a single mutex; `count()` is read under the same lock by the
/// periodic listener-count ticker, then released before broadcasting.
pub struct AdmissionRegistry {
    by_code: Mutex<HashMap<String, HashSet<SessionToken>>>,
}

impl Default for AdmissionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionRegistry {
    pub fn new() -> Self {
        Self {
            by_code: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `session` against `code` unless `limit` is already reached.
    pub fn admit(&self, code: &str, limit: Option<u32>, session: SessionToken) -> Admit {
        let mut by_code = self.by_code.lock().unwrap();
        let live = by_code.entry(code.to_string()).or_default();
        if let Some(limit) = limit {
            if live.len() as u32 >= limit {
                return Admit::TooMany;
            }
        }
        live.insert(session);
        Admit::Ok
    }

    /// Idempotent: releasing a session not currently admitted is a no-op.
    pub fn release(&self, code: &str, session: SessionToken) {
        let mut by_code = self.by_code.lock().unwrap();
        if let Some(live) = by_code.get_mut(code) {
            live.remove(&session);
            if live.is_empty() {
                by_code.remove(code);
            }
        }
    }

    /// Total live sessions across every credential code.
    pub fn count(&self) -> usize {
        let by_code = self.by_code.lock().unwrap();
        by_code.values().map(|s| s.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_cap_is_enforced_per_code() {
        let registry = AdmissionRegistry::new();
        let a = SessionToken::next();
        let b = SessionToken::next();

        assert_eq!(registry.admit("X", Some(1), a), Admit::Ok);
        assert_eq!(registry.admit("X", Some(1), b), Admit::TooMany);

        registry.release("X", a);
        assert_eq!(registry.admit("X", Some(1), b), Admit::Ok);
    }

    #[test]
    fn release_is_idempotent() {
        let registry = AdmissionRegistry::new();
        let a = SessionToken::next();
        registry.release("unused", a);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn count_is_total_across_codes() {
        let registry = AdmissionRegistry::new();
        registry.admit("A", None, SessionToken::next());
        registry.admit("B", None, SessionToken::next());
        assert_eq!(registry.count(), 2);
    }
}
