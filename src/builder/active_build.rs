//! Active-build singleton. `spec.md` §3 "ActiveBuild", §9 "model as `(slot, cancelHandle)`;
//! swapping it atomically under a mutex is safe since the cancel call is non-blocking."

use crate::clock::Slot;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

struct Entry {
    slot: Slot,
    cancel: CancellationToken,
}

/// At most one build in flight at a time. Installing a new one for a different slot
/// cancels and drops whatever was there.
#[derive(Default)]
pub struct ActiveBuild {
    entry: Mutex<Option<Entry>>,
}

impl ActiveBuild {
    pub fn new() -> Self {
        Self::default()
    }

    /// `spec.md` §4.F step 1: cancel any build for a different slot, then install a
    /// fresh cancellation token for `slot` and return it.
    pub fn start(&self, slot: Slot) -> CancellationToken {
        let mut entry = self.entry.lock();
        if let Some(current) = entry.as_ref() {
            if current.slot != slot {
                current.cancel.cancel();
            } else {
                // a build for this slot is already active; the caller is expected to have
                // checked `buildStartedSlots` first, but cancel defensively rather than
                // run two builds for the same slot concurrently.
                current.cancel.cancel();
            }
        }
        let cancel = CancellationToken::new();
        *entry = Some(Entry { slot, cancel: cancel.clone() });
        cancel
    }

    /// Clears the active build if it is still the one for `slot` (`spec.md` §4.F step 7:
    /// "Clear the active build (if still ours)").
    pub fn clear_if(&self, slot: Slot) {
        let mut entry = self.entry.lock();
        if entry.as_ref().map(|e| e.slot) == Some(slot) {
            *entry = None;
        }
    }

    /// `AbortBuild(slot)`: cancel and clear only if `slot` is the active one.
    pub fn abort(&self, slot: Slot) {
        let mut entry = self.entry.lock();
        if let Some(current) = entry.as_ref() {
            if current.slot == slot {
                current.cancel.cancel();
                *entry = None;
            }
        }
    }

    pub fn active_slot(&self) -> Option<Slot> {
        self.entry.lock().as_ref().map(|e| e.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_a_build_for_a_new_slot_cancels_the_previous() {
        let active = ActiveBuild::new();
        let first = active.start(100);
        assert!(!first.is_cancelled());
        let _second = active.start(101);
        assert!(first.is_cancelled());
        assert_eq!(active.active_slot(), Some(101));
    }

    #[test]
    fn clear_if_only_clears_matching_slot() {
        let active = ActiveBuild::new();
        active.start(100);
        active.clear_if(999);
        assert_eq!(active.active_slot(), Some(100));
        active.clear_if(100);
        assert_eq!(active.active_slot(), None);
    }

    #[test]
    fn abort_cancels_and_clears_only_the_matching_slot() {
        let active = ActiveBuild::new();
        let cancel = active.start(100);
        active.abort(999);
        assert!(!cancel.is_cancelled());
        active.abort(100);
        assert!(cancel.is_cancelled());
        assert_eq!(active.active_slot(), None);
    }
}
