//! Slot Scheduler. `spec.md` §4.E.

use crate::clock::{Slot, SlotClock};
use crate::config::{ScheduleConfig, SchedulingMode};
use parking_lot::Mutex;

/// Maps wall clock to slot index and decides "build for slot?" under the three
/// scheduling modes named in `spec.md` §3 "Schedule" / §4.E.
pub struct SlotScheduler {
    clock: SlotClock,
    mode: Mutex<SchedulingMode>,
    every_nth: Mutex<u64>,
    next_n: Mutex<u64>,
    start_slot: Mutex<u64>,
    slots_built: Mutex<u64>,
}

impl SlotScheduler {
    pub fn new(clock: SlotClock, config: ScheduleConfig) -> Self {
        Self {
            clock,
            mode: Mutex::new(config.mode),
            every_nth: Mutex::new(config.every_nth),
            next_n: Mutex::new(config.next_n),
            start_slot: Mutex::new(config.start_slot),
            slots_built: Mutex::new(0),
        }
    }

    pub fn slot_to_time(&self, slot: Slot) -> u64 {
        self.clock.slot_to_time(slot)
    }

    pub fn time_to_slot(&self, unix_seconds: u64) -> Option<Slot> {
        self.clock.time_to_slot(unix_seconds)
    }

    /// `spec.md` §4.E `ShouldBuildForSlot`.
    pub fn should_build_for_slot(&self, slot: Slot) -> bool {
        let start_slot = *self.start_slot.lock();
        if start_slot > 0 && slot < start_slot {
            return false;
        }
        match *self.mode.lock() {
            SchedulingMode::All => true,
            SchedulingMode::EveryNth => {
                let every_nth = *self.every_nth.lock();
                if every_nth == 0 {
                    return true;
                }
                (slot.saturating_sub(start_slot.max(0))) % every_nth == 0
            }
            SchedulingMode::NextN => *self.slots_built.lock() < *self.next_n.lock(),
        }
    }

    /// Advances the `NEXT_N` counter. No-op under other modes.
    pub fn on_slot_built(&self, _slot: Slot) {
        if *self.mode.lock() == SchedulingMode::NextN {
            *self.slots_built.lock() += 1;
        }
    }

    /// `-1` (reported as `None` here) means unlimited.
    pub fn slots_remaining(&self) -> Option<i64> {
        match *self.mode.lock() {
            SchedulingMode::NextN => {
                let remaining = self.next_n.lock().saturating_sub(*self.slots_built.lock());
                Some(remaining as i64)
            }
            _ => None,
        }
    }

    /// Applies a config update. Switching the mode to `NEXT_N` resets the internal
    /// counter to zero, deliberately (`spec.md` §9 design note).
    pub fn update_config(&self, config: ScheduleConfig) {
        let mut mode = self.mode.lock();
        let switching_to_next_n = config.mode == SchedulingMode::NextN && *mode != SchedulingMode::NextN;
        *mode = config.mode;
        *self.every_nth.lock() = config.every_nth;
        *self.next_n.lock() = config.next_n;
        *self.start_slot.lock() = config.start_slot;
        if switching_to_next_n {
            *self.slots_built.lock() = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(mode: SchedulingMode) -> SlotScheduler {
        let clock = SlotClock::new(1_704_067_200, 12);
        SlotScheduler::new(
            clock,
            ScheduleConfig { mode, every_nth: 4, next_n: 2, start_slot: 0 },
        )
    }

    #[test]
    fn all_mode_always_builds() {
        let scheduler = scheduler(SchedulingMode::All);
        for slot in [0, 1, 1000] {
            assert!(scheduler.should_build_for_slot(slot));
        }
    }

    #[test]
    fn every_nth_matches_exact_residue_set() {
        let scheduler = scheduler(SchedulingMode::EveryNth);
        for slot in 0..40u64 {
            assert_eq!(scheduler.should_build_for_slot(slot), slot % 4 == 0, "slot {slot}");
        }
    }

    #[test]
    fn next_n_stops_after_n_built_slots() {
        let scheduler = scheduler(SchedulingMode::NextN);
        assert!(scheduler.should_build_for_slot(1));
        scheduler.on_slot_built(1);
        assert!(scheduler.should_build_for_slot(2));
        scheduler.on_slot_built(2);
        assert!(!scheduler.should_build_for_slot(3));
        assert_eq!(scheduler.slots_remaining(), Some(0));
    }

    #[test]
    fn switching_to_next_n_resets_counter() {
        let scheduler = scheduler(SchedulingMode::NextN);
        scheduler.on_slot_built(1);
        scheduler.on_slot_built(2);
        assert!(!scheduler.should_build_for_slot(3));
        scheduler.update_config(ScheduleConfig {
            mode: SchedulingMode::NextN,
            every_nth: 0,
            next_n: 1,
            start_slot: 0,
        });
        assert!(scheduler.should_build_for_slot(4));
    }

    #[test]
    fn start_slot_gates_all_modes() {
        let clock = SlotClock::new(1_704_067_200, 12);
        let scheduler = SlotScheduler::new(
            clock,
            ScheduleConfig { mode: SchedulingMode::All, every_nth: 0, next_n: 0, start_slot: 100 },
        );
        assert!(!scheduler.should_build_for_slot(50));
        assert!(scheduler.should_build_for_slot(100));
    }
}
