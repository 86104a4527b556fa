use std::time::Duration;

use tracing::trace;

/// Single-shot timers keyed by kind.
///
/// At most one timer per kind is armed at a time; re-arming replaces the
/// pending deadline. Cancelling a kind that is not armed is a no-op, so
/// cleanup paths can cancel unconditionally.
#[derive(Debug, Clone, Default)]
pub struct Scheduler<K> {
    armed: Vec<(K, Duration)>,
}

impl<K: Copy + Eq + std::fmt::Debug> Scheduler<K> {
    pub fn new() -> Self {
        Self { armed: Vec::new() }
    }

    pub fn arm(&mut self, kind: K, deadline: Duration) {
        self.armed.retain(|(k, _)| *k != kind);
        trace!(?kind, ?deadline, "timer armed");
        self.armed.push((kind, deadline));
    }

    /// Returns whether a pending timer was actually removed.
    pub fn cancel(&mut self, kind: K) -> bool {
        let before = self.armed.len();
        self.armed.retain(|(k, _)| *k != kind);
        self.armed.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.armed.clear();
    }

    pub fn is_armed(&self, kind: K) -> bool {
        self.armed.iter().any(|(k, _)| *k == kind)
    }

    /// Earliest timer whose deadline has passed, if any. Call repeatedly to
    /// drain everything due at `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<K> {
        let (pos, _) = self
            .armed
            .iter()
            .enumerate()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .min_by_key(|(_, (_, deadline))| *deadline)?;
        let (kind, _) = self.armed.swap_remove(pos);
        trace!(?kind, "timer fired");
        Some(kind)
    }
}
