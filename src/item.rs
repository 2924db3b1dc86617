use std::sync::Arc;
use std::time::{Instant, SystemTime};

use parking_lot::Mutex;

use crate::target::PingTarget;

/// Bookkeeping record for one outstanding probe.
///
/// Everything except the serviced flag is written once at transmit time and
/// read lock-free afterwards. The serviced flag sits behind its own mutex:
/// it is the single arbitration point between the receiver and the timeout
/// sweep, which race to resolve the same probe.
pub(crate) struct PingItem {
    id: u16,
    sequence: u16,
    sample_number: u64,
    transmit_time: Instant,
    transmit_epoch: SystemTime,
    target: Arc<PingTarget>,
    serviced: Mutex<bool>,
}

impl PingItem {
    pub(crate) fn new(
        target: Arc<PingTarget>,
        sequence: u16,
        sample_number: u64,
        transmit_time: Instant,
        transmit_epoch: SystemTime,
    ) -> Self {
        PingItem {
            id: target.id(),
            sequence,
            sample_number,
            transmit_time,
            transmit_epoch,
            target,
            serviced: Mutex::new(false),
        }
    }

    pub(crate) fn id(&self) -> u16 {
        self.id
    }

    pub(crate) fn sequence(&self) -> u16 {
        self.sequence
    }

    pub(crate) fn sample_number(&self) -> u64 {
        self.sample_number
    }

    pub(crate) fn transmit_time(&self) -> Instant {
        self.transmit_time
    }

    pub(crate) fn transmit_epoch(&self) -> SystemTime {
        self.transmit_epoch
    }

    pub(crate) fn target(&self) -> &Arc<PingTarget> {
        &self.target
    }

    /// Claim the item for resolution. At most one caller ever wins; the
    /// loser must not emit a result for this probe.
    pub(crate) fn claim(&self) -> bool {
        let mut serviced = self.serviced.lock();
        if *serviced {
            false
        } else {
            *serviced = true;
            true
        }
    }

    #[cfg(test)]
    pub(crate) fn serviced(&self) -> bool {
        *self.serviced.lock()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_item(sequence: u16, sample_number: u64) -> Arc<PingItem> {
        let target = Arc::new(PingTarget::new("127.0.0.1".parse().unwrap(), 0));
        Arc::new(PingItem::new(
            target,
            sequence,
            sample_number,
            Instant::now(),
            SystemTime::now(),
        ))
    }

    #[test]
    fn claim_wins_exactly_once() {
        let item = make_item(1, 0);

        assert!(!item.serviced());
        assert!(item.claim());
        assert!(item.serviced());
        assert!(!item.claim());
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        for _ in 0..100 {
            let item = make_item(1, 0);
            let contender = Arc::clone(&item);

            let handle = std::thread::spawn(move || contender.claim());
            let here = item.claim();
            let there = handle.join().unwrap();

            assert!(here ^ there);
        }
    }

    #[test]
    fn item_copies_target_id() {
        let target = Arc::new(PingTarget::new("127.0.0.1".parse().unwrap(), 0));
        let item = PingItem::new(
            Arc::clone(&target),
            9,
            4,
            Instant::now(),
            SystemTime::now(),
        );

        assert_eq!(target.id(), item.id());
        assert_eq!(9, item.sequence());
        assert_eq!(4, item.sample_number());
    }
}
