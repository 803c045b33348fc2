//! Build statistics. `spec.md` §5 "Stats counters: mutex; a function-passing
//! `incrementStat(fn)` pattern ensures atomic multi-field updates." Grounded on the
//! same closure-applying update idiom the teacher uses for its relay summary counters.

use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot {
    pub builds_attempted: u64,
    pub builds_succeeded: u64,
    pub builds_failed: u64,
    pub builds_cancelled: u64,
    pub bids_submitted: u64,
    pub bids_accepted: u64,
    pub bids_failed: u64,
}

#[derive(Debug, Default)]
pub struct Stats {
    inner: Mutex<Snapshot>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `f` to the counters under a single lock acquisition, so a caller that
    /// needs to bump more than one field at once (e.g. attempted + succeeded) does so
    /// atomically with respect to readers.
    pub fn update(&self, f: impl FnOnce(&mut Snapshot)) {
        let mut snapshot = self.inner.lock();
        f(&mut snapshot);
    }

    pub fn snapshot(&self) -> Snapshot {
        *self.inner.lock()
    }

    pub fn build_attempted(&self) {
        self.update(|s| s.builds_attempted += 1);
    }

    pub fn build_succeeded(&self) {
        self.update(|s| s.builds_succeeded += 1);
    }

    pub fn build_failed(&self) {
        self.update(|s| s.builds_failed += 1);
    }

    pub fn build_cancelled(&self) {
        self.update(|s| s.builds_cancelled += 1);
    }

    pub fn bid_submitted(&self) {
        self.update(|s| s.bids_submitted += 1);
    }

    pub fn bid_accepted(&self) {
        self.update(|s| s.bids_accepted += 1);
    }

    pub fn bid_failed(&self) {
        self.update(|s| s.bids_failed += 1);
    }
}

/// Logs the current snapshot at a fixed cadence, in the teacher's periodic-reporter style.
pub async fn run_reporter(stats: std::sync::Arc<Stats>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let snapshot = stats.snapshot();
        tracing::info!(
            builds_attempted = snapshot.builds_attempted,
            builds_succeeded = snapshot.builds_succeeded,
            builds_failed = snapshot.builds_failed,
            builds_cancelled = snapshot.builds_cancelled,
            bids_submitted = snapshot.bids_submitted,
            bids_accepted = snapshot.bids_accepted,
            bids_failed = snapshot.bids_failed,
            "stats",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_applies_multi_field_changes_atomically() {
        let stats = Stats::new();
        stats.update(|s| {
            s.builds_attempted += 1;
            s.builds_succeeded += 1;
        });
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.builds_attempted, 1);
        assert_eq!(snapshot.builds_succeeded, 1);
    }

    #[test]
    fn counters_are_independent() {
        let stats = Stats::new();
        stats.build_attempted();
        stats.build_failed();
        stats.bid_submitted();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.builds_attempted, 1);
        assert_eq!(snapshot.builds_failed, 1);
        assert_eq!(snapshot.bids_submitted, 1);
        assert_eq!(snapshot.builds_succeeded, 0);
    }
}
