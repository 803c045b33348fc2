//! Payload Cache. `spec.md` §4.I: fixed-size per-slot mapping for lookup by downstream
//! consumers, evicted by slot age alongside the other per-slot caches (§4.G step 6).

use crate::clock::Slot;
use crate::types::PayloadReadyEvent;
use parking_lot::RwLock;
use std::collections::HashMap;

const RETENTION_SLOTS: u64 = 64;

/// Bounded, slot-keyed store of completed builds. `capacity` caps the number of entries
/// retained regardless of age, evicting the oldest slot first -- belt-and-suspenders
/// alongside the age-based `cleanup` the builder service calls every slot.
pub struct PayloadCache {
    inner: RwLock<HashMap<Slot, PayloadReadyEvent>>,
    capacity: usize,
}

impl PayloadCache {
    pub fn new(capacity: usize) -> Self {
        Self { inner: RwLock::new(HashMap::new()), capacity }
    }

    pub fn insert(&self, event: PayloadReadyEvent) {
        let mut inner = self.inner.write();
        inner.insert(event.slot, event);
        if inner.len() > self.capacity {
            if let Some(&oldest) = inner.keys().min() {
                inner.remove(&oldest);
            }
        }
    }

    pub fn get(&self, slot: Slot) -> Option<PayloadReadyEvent> {
        self.inner.read().get(&slot).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts entries for slots at or below `current_slot - 64` (`spec.md` §4.G step 6 /
    /// §3 "cleaned when current slot > X + 64").
    pub fn cleanup(&self, current_slot: Slot) {
        let floor = current_slot.saturating_sub(RETENTION_SLOTS);
        self.inner.write().retain(|&slot, _| slot > floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    fn sample_event(slot: Slot) -> PayloadReadyEvent {
        PayloadReadyEvent {
            slot,
            parent_block_root: B256::ZERO,
            parent_block_hash: B256::ZERO,
            block_hash: B256::ZERO,
            payload: serde_json::json!({}),
            timestamp: 0,
            gas_limit: 0,
            gas_used: 0,
            prev_randao: B256::ZERO,
            fee_recipient: Default::default(),
            block_value_gwei: 0,
            build_source: crate::types::BuildSource::Block,
            proposer_index: 0,
            ready_at: 0,
        }
    }

    #[test]
    fn stores_and_retrieves_by_slot() {
        let cache = PayloadCache::new(10);
        cache.insert(sample_event(5));
        assert!(cache.get(5).is_some());
        assert!(cache.get(6).is_none());
    }

    #[test]
    fn evicts_oldest_when_over_capacity() {
        let cache = PayloadCache::new(2);
        cache.insert(sample_event(1));
        cache.insert(sample_event(2));
        cache.insert(sample_event(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(1).is_none());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn cleanup_evicts_slots_older_than_retention_window() {
        let cache = PayloadCache::new(100);
        cache.insert(sample_event(10));
        cache.insert(sample_event(100));
        cache.cleanup(100);
        assert!(cache.get(10).is_none());
        assert!(cache.get(100).is_some());
    }
}
