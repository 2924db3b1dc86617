use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::item::PingItem;

/// Lookup key for an outstanding probe: target id in the high half, cycle
/// sequence number in the low half.
pub(crate) fn composite_key(id: u16, sequence: u16) -> u32 {
    (u32::from(id) << 16) | u32::from(sequence)
}

/// The engine's table of outstanding probes, shared by the transmitter
/// (inserts), the receiver (lookups and removals) and the timeout sweep.
///
/// One coarse lock covers the whole table; at the expected scale of tens to
/// low hundreds of outstanding probes that is cheaper than anything finer.
/// Item locks nest inside the table lock during the sweep and are never held
/// while re-entering the table, so there is no ordering hazard.
pub(crate) struct RequestMap {
    inner: Mutex<HashMap<u32, Arc<PingItem>>>,
}

impl RequestMap {
    pub(crate) fn new() -> Self {
        RequestMap {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn add(&self, item: Arc<PingItem>) {
        let key = composite_key(item.id(), item.sequence());
        if let Some(stale) = self.inner.lock().insert(key, item) {
            // only possible when the random sequence seed wraps onto a probe
            // that never resolved
            tracing::warn!(
                key,
                sample_number = stale.sample_number(),
                "replaced stale request with identical key"
            );
        }
    }

    pub(crate) fn get(&self, key: u32) -> Option<Arc<PingItem>> {
        self.inner.lock().get(&key).map(Arc::clone)
    }

    pub(crate) fn remove(&self, key: u32) -> Option<Arc<PingItem>> {
        self.inner.lock().remove(&key)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Claim and remove every entry strictly older than `timeout`, returning
    /// each claimed item with its age. Entries already serviced by another
    /// path are left in place; whichever path serviced them removes them.
    pub(crate) fn claim_expired(&self, timeout: Duration) -> Vec<(Arc<PingItem>, Duration)> {
        let now = Instant::now();
        let mut expired = Vec::new();

        self.inner.lock().retain(|_, item| {
            let age = now.duration_since(item.transmit_time());
            if age > timeout && item.claim() {
                expired.push((Arc::clone(item), age));
                false
            } else {
                true
            }
        });

        expired
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::time::SystemTime;

    use crate::item::tests::make_item;
    use crate::target::PingTarget;

    use super::*;

    fn make_aged_item(age: Duration) -> Arc<PingItem> {
        let target: Arc<PingTarget> =
            Arc::new(PingTarget::new("127.0.0.1".parse::<IpAddr>().unwrap(), 0));
        Arc::new(PingItem::new(
            target,
            1,
            0,
            Instant::now() - age,
            SystemTime::now() - age,
        ))
    }

    #[test]
    fn composite_key_layout() {
        assert_eq!(0x1234_5678, composite_key(0x1234, 0x5678));
        assert_eq!(0x0001_0000, composite_key(1, 0));
        assert_eq!(0x0000_FFFF, composite_key(0, 0xFFFF));
    }

    #[test]
    fn add_get_remove() {
        let map = RequestMap::new();
        let item = make_item(7, 0);
        let key = composite_key(item.id(), item.sequence());

        map.add(Arc::clone(&item));
        assert_eq!(1, map.len());
        assert!(map.get(key).is_some());

        assert!(map.remove(key).is_some());
        assert!(map.get(key).is_none());
        assert!(map.remove(key).is_none());
    }

    #[test]
    fn items_with_distinct_ids_do_not_collide() {
        let map = RequestMap::new();
        // two targets probed in the same cycle share the sequence number
        let first = make_item(42, 0);
        let second = make_item(42, 0);
        assert_ne!(first.id(), second.id(), "random ids collided, rerun");

        map.add(Arc::clone(&first));
        map.add(Arc::clone(&second));

        assert_eq!(2, map.len());
    }

    #[test]
    fn claim_expired_takes_old_entries() {
        let map = RequestMap::new();
        let old = make_aged_item(Duration::from_secs(5));
        let fresh = make_item(2, 1);
        map.add(Arc::clone(&old));
        map.add(Arc::clone(&fresh));

        let expired = map.claim_expired(Duration::from_secs(1));

        assert_eq!(1, expired.len());
        assert_eq!(old.sequence(), expired[0].0.sequence());
        more_asserts::assert_ge!(expired[0].1, Duration::from_secs(5));
        assert_eq!(1, map.len());
        assert!(old.serviced());
        assert!(!fresh.serviced());
    }

    #[test]
    fn claim_expired_boundary_is_strict() {
        let map = RequestMap::new();
        let item = make_aged_item(Duration::from_secs(3));
        map.add(Arc::clone(&item));

        // age of ~3s does not exceed a timeout of one hour
        assert!(map.claim_expired(Duration::from_secs(3600)).is_empty());
        assert_eq!(1, map.len());
    }

    #[test]
    fn claim_expired_skips_serviced_entries() {
        let map = RequestMap::new();
        let item = make_aged_item(Duration::from_secs(5));
        map.add(Arc::clone(&item));
        assert!(item.claim());

        let expired = map.claim_expired(Duration::from_secs(1));

        // the servicing path owns removal
        assert!(expired.is_empty());
        assert_eq!(1, map.len());
    }
}
