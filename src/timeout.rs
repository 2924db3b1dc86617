use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::EngineShared;
use crate::result::{self, PingResult, PingResultSender, ResultCode};

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic sweep over the request table reporting probes that aged past
/// the configured reply timeout as no-reply.
pub(crate) struct PingTimeoutMonitor {
    shared: Arc<EngineShared>,
    results_tx: PingResultSender,
}

impl PingTimeoutMonitor {
    pub(crate) fn new(shared: Arc<EngineShared>, results_tx: PingResultSender) -> Self {
        PingTimeoutMonitor { shared, results_tx }
    }

    pub(crate) fn run(self, halt_rx: &mpsc::Receiver<()>) {
        tracing::trace!("timeout monitor starting");
        loop {
            self.sweep();

            match halt_rx.recv_timeout(SWEEP_INTERVAL) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {}
            }
        }
        tracing::trace!("timeout monitor stopped");
    }

    pub(crate) fn sweep(&self) {
        // the timeout is re-read every sweep, so changes apply from the next
        // sweep onwards
        let timeout = self.shared.timeout();
        // claiming happens inside the table lock, emission outside of it
        for (item, age) in self.shared.requests.claim_expired(timeout) {
            tracing::trace!(
                target = %item.target().host_address(),
                sample_number = item.sample_number(),
                "probe timed out"
            );
            result::emit(
                &self.results_tx,
                PingResult {
                    sample_number: item.sample_number(),
                    code: ResultCode::NoReply,
                    responder: None,
                    transmit_epoch: item.transmit_epoch(),
                    round_trip: age,
                    target: Arc::clone(item.target()),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::TryRecvError;
    use std::time::{Instant, SystemTime};

    use crate::config::DEFAULT_INTERVAL;
    use crate::icmp::IpVersion;
    use crate::item::PingItem;
    use crate::result::ping_result_channel;
    use crate::socket::tests::{OnSend, SocketFactoryMock};
    use crate::target::PingTarget;

    use super::*;

    fn make_monitor(timeout: Duration) -> (PingTimeoutMonitor, crate::result::PingResultReceiver) {
        let factory = Arc::new(SocketFactoryMock::new(OnSend::ReturnDefault));
        let shared = Arc::new(EngineShared::new(
            IpVersion::V4,
            factory,
            DEFAULT_INTERVAL,
            timeout,
        ));
        let (results_tx, results_rx) = ping_result_channel(4);
        (PingTimeoutMonitor::new(shared, results_tx), results_rx)
    }

    fn track_aged_item(monitor: &PingTimeoutMonitor, age: Duration) -> Arc<PingItem> {
        let target = Arc::new(PingTarget::new("127.0.0.1".parse().unwrap(), 0));
        let item = Arc::new(PingItem::new(
            target,
            1,
            3,
            Instant::now() - age,
            SystemTime::now() - age,
        ));
        monitor.shared.requests.add(Arc::clone(&item));
        item
    }

    #[test]
    fn expired_probe_resolves_as_no_reply() {
        let (monitor, results_rx) = make_monitor(Duration::from_secs(1));
        track_aged_item(&monitor, Duration::from_secs(5));

        monitor.sweep();

        let result = results_rx.try_recv().expect("no-reply emitted");
        assert_eq!(ResultCode::NoReply, result.code);
        assert_eq!(3, result.sample_number);
        assert!(result.responder.is_none());
        more_asserts::assert_ge!(result.round_trip, Duration::from_secs(5));
        assert_eq!(0, monitor.shared.requests.len());
    }

    #[test]
    fn fresh_probe_is_left_alone() {
        let (monitor, results_rx) = make_monitor(Duration::from_secs(60));
        track_aged_item(&monitor, Duration::from_secs(5));

        monitor.sweep();

        assert_eq!(Err(TryRecvError::Empty), results_rx.try_recv());
        assert_eq!(1, monitor.shared.requests.len());
    }

    #[test]
    fn serviced_probe_is_not_reported_again() {
        let (monitor, results_rx) = make_monitor(Duration::from_secs(1));
        let item = track_aged_item(&monitor, Duration::from_secs(5));
        assert!(item.claim());

        monitor.sweep();

        assert_eq!(Err(TryRecvError::Empty), results_rx.try_recv());
    }
}
