//! Per-slot latest-payload-attributes cache. `spec.md` §3, §4.B.
//!
//! A plain slot-keyed mapping behind one `RwLock`, as `spec.md` §4.B specifies: "one
//! shared mutex protects the attributes cache (RW)". Each incoming event overwrites any
//! existing entry for that slot -- the latest observed wins.

use super::types::PayloadAttributesEvent;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct AttributesCache {
    inner: RwLock<HashMap<u64, PayloadAttributesEvent>>,
}

impl AttributesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, event: PayloadAttributesEvent) {
        self.inner.write().insert(event.proposal_slot, event);
    }

    pub fn get_latest(&self, slot: u64) -> Option<PayloadAttributesEvent> {
        self.inner.read().get(&slot).cloned()
    }

    /// Evicts every entry for a slot `<= before_slot`, per the `slot > X + 64` cleanup
    /// rule shared by every per-slot cache in this system (`spec.md` §3, §4.G step 6).
    pub fn cleanup(&self, before_slot: u64) {
        self.inner.write().retain(|slot, _| *slot > before_slot);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_consensus::primitives::{ExecutionAddress, Hash32, Root};

    fn attrs(slot: u64) -> PayloadAttributesEvent {
        PayloadAttributesEvent {
            version: "deneb".to_string(),
            proposal_slot: slot,
            proposer_index: 0,
            parent_block_root: Root::default(),
            parent_block_number: 0,
            parent_block_hash: Hash32::default(),
            timestamp: slot * 12,
            prev_randao: Hash32::default(),
            suggested_fee_recipient: ExecutionAddress::default(),
            withdrawals: vec![],
            parent_beacon_block_root: Root::default(),
            received_at: std::time::SystemTime::now(),
        }
    }

    #[test]
    fn latest_observation_wins() {
        let cache = AttributesCache::new();
        let mut first = attrs(100);
        first.parent_block_hash = Hash32::try_from([0xaa; 32].as_ref()).unwrap();
        cache.insert(first);

        let mut second = attrs(100);
        second.parent_block_hash = Hash32::try_from([0xbb; 32].as_ref()).unwrap();
        cache.insert(second);

        let latest = cache.get_latest(100).unwrap();
        assert_eq!(latest.parent_block_hash, Hash32::try_from([0xbb; 32].as_ref()).unwrap());
    }

    #[test]
    fn cleanup_evicts_old_slots_only() {
        let cache = AttributesCache::new();
        cache.insert(attrs(10));
        cache.insert(attrs(200));
        cache.cleanup(10 + 64);
        assert!(cache.get_latest(10).is_none());
        assert!(cache.get_latest(200).is_some());
    }
}
