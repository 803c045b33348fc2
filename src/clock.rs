//! Wall-clock <-> slot conversions. `spec.md` §3 "Slot" / §4.E.
//!
//! Mirrors the small surface the teacher pulls from `ethereum_consensus::clock::Clock`
//! (`duration_until_next_slot`, `stream_slots`, `before_genesis`) but is self-contained
//! since the exact slot-boundary arithmetic is part of this spec's testable properties.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_stream::wrappers::IntervalStream;

pub type Slot = u64;

#[derive(Debug, Clone, Copy)]
pub struct SlotClock {
    genesis_time: u64,
    seconds_per_slot: u64,
}

impl SlotClock {
    pub fn new(genesis_time: u64, seconds_per_slot: u64) -> Self {
        assert!(seconds_per_slot > 0, "seconds_per_slot must be positive");
        Self { genesis_time, seconds_per_slot }
    }

    pub fn genesis_time(&self) -> u64 {
        self.genesis_time
    }

    pub fn seconds_per_slot(&self) -> u64 {
        self.seconds_per_slot
    }

    /// `SlotToTime(slot) = genesisTime + slot * secondsPerSlot`.
    pub fn slot_to_time(&self, slot: Slot) -> u64 {
        self.genesis_time + slot * self.seconds_per_slot
    }

    pub fn slot_start(&self, slot: Slot) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.slot_to_time(slot))
    }

    /// Inverse of `slot_to_time`. Returns `None` before genesis.
    pub fn time_to_slot(&self, unix_seconds: u64) -> Option<Slot> {
        unix_seconds.checked_sub(self.genesis_time).map(|elapsed| elapsed / self.seconds_per_slot)
    }

    pub fn now(&self) -> Option<Slot> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("after epoch").as_secs();
        self.time_to_slot(now)
    }

    pub fn before_genesis(&self) -> bool {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("after epoch").as_secs();
        now < self.genesis_time
    }

    pub fn duration_until_next_slot(&self) -> Duration {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("after epoch").as_secs();
        if now < self.genesis_time {
            return Duration::from_secs(self.genesis_time - now);
        }
        let current = self.time_to_slot(now).unwrap_or(0);
        let next_start = self.slot_to_time(current + 1);
        Duration::from_secs(next_start.saturating_sub(now))
    }

    /// A periodic tick once per slot, used by components that merely watch the clock
    /// (as opposed to being driven directly by beacon SSE events).
    pub fn stream_slots(&self) -> IntervalStream {
        IntervalStream::new(tokio::time::interval(Duration::from_secs(self.seconds_per_slot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: u64 = 1_704_067_200;
    const SECONDS_PER_SLOT: u64 = 12;

    #[test]
    fn slot_boundaries_are_exact() {
        let clock = SlotClock::new(GENESIS, SECONDS_PER_SLOT);
        let slot = 100;
        let boundary = clock.slot_to_time(slot + 1);
        assert_eq!(clock.time_to_slot(boundary - 1), Some(slot));
        assert_eq!(clock.time_to_slot(boundary), Some(slot + 1));
    }

    #[test]
    fn time_to_slot_roundtrips() {
        let clock = SlotClock::new(GENESIS, SECONDS_PER_SLOT);
        for slot in [0u64, 1, 100, 999_999] {
            assert_eq!(clock.time_to_slot(clock.slot_to_time(slot)), Some(slot));
        }
    }

    #[test]
    fn before_genesis_has_no_slot() {
        let clock = SlotClock::new(GENESIS, SECONDS_PER_SLOT);
        assert_eq!(clock.time_to_slot(GENESIS - 1), None);
    }
}
