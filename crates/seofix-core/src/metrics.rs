//! Atomic counters for fix outcomes.
//!
//! One `Metrics` is owned by each orchestrator. Counters are incremented
//! silently at the call site; [`Metrics::flush`] emits them as a single
//! `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    attempted: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    blocked: AtomicU64,
    denied: AtomicU64,
    fatal: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub attempted: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub blocked: u64,
    pub denied: u64,
    pub fatal: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            attempted: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            fatal: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_attempted(&self) {
        Self::bump(&self.attempted, "attempted");
    }

    pub fn inc_committed(&self) {
        Self::bump(&self.committed, "committed");
    }

    pub fn inc_rolled_back(&self) {
        Self::bump(&self.rolled_back, "rolled_back");
    }

    /// Safety chain or strategy lookup stopped the fix.
    pub fn inc_blocked(&self) {
        Self::bump(&self.blocked, "blocked");
    }

    pub fn inc_denied(&self) {
        Self::bump(&self.denied, "denied");
    }

    pub fn inc_fatal(&self) {
        Self::bump(&self.fatal, "fatal");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempted: self.attempted.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            fatal: self.fatal.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            attempted = s.attempted,
            committed = s.committed,
            rolled_back = s.rolled_back,
            blocked = s.blocked,
            denied = s.denied,
            fatal = s.fatal,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_attempted();
        m.inc_attempted();
        m.inc_committed();
        m.inc_denied();
        let s = m.snapshot();
        assert_eq!(s.attempted, 2);
        assert_eq!(s.committed, 1);
        assert_eq!(s.denied, 1);
        assert_eq!(s.fatal, 0);
        m.flush();
    }
}
