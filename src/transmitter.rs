use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use rand::Rng;

use crate::engine::EngineShared;
use crate::icmp;
use crate::item::PingItem;
use crate::request_map::composite_key;
use crate::result::{self, PingResult, PingResultSender, ResultCode};
use crate::target::PingTarget;

/// Periodic probe sender. Once per interval it sends one echo request to
/// every registered target and records each send in the shared request
/// table. All targets probed in one cycle share the same sequence and
/// sample number, which lets consumers correlate results from the same
/// round across targets.
pub(crate) struct PingTransmitter {
    shared: Arc<EngineShared>,
    results_tx: PingResultSender,
    payload: Vec<u8>,
}

impl PingTransmitter {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        results_tx: PingResultSender,
        payload_size: usize,
    ) -> Self {
        let mut payload = vec![0u8; payload_size];
        rand::thread_rng().fill(&mut payload[..]);
        PingTransmitter {
            shared,
            results_tx,
            payload,
        }
    }

    pub(crate) fn run(self, halt_rx: &mpsc::Receiver<()>) {
        tracing::trace!("transmitter starting");
        self.shared.set_epoch(SystemTime::now());

        // the random seed keeps restarts from colliding with stale in-flight
        // sequence numbers
        let mut sequence: u16 = rand::thread_rng().gen();
        let mut sample_number: u64 = 0;

        loop {
            let cycle_start = Instant::now();
            self.send_round(sequence, sample_number);

            // a slow cycle runs back to back; the halt channel is polled
            // either way so shutdown stays prompt
            let remaining = self
                .shared
                .interval()
                .saturating_sub(cycle_start.elapsed());
            match halt_rx.recv_timeout(remaining) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {}
            }

            sequence = sequence.wrapping_add(1);
            sample_number += 1;
        }
        tracing::trace!("transmitter stopped");
    }

    pub(crate) fn send_round(&self, sequence: u16, sample_number: u64) {
        let mut local_faults = Vec::new();
        {
            let targets = self.shared.targets.lock();
            for target in targets.iter() {
                if let Some(fault) = self.send_probe(target, sequence, sample_number) {
                    local_faults.push(fault);
                }
            }
        }
        // emit only after the target list lock is released
        for fault in local_faults {
            result::emit(&self.results_tx, fault);
        }
    }

    fn send_probe(
        &self,
        target: &Arc<PingTarget>,
        sequence: u16,
        sample_number: u64,
    ) -> Option<PingResult> {
        let socket = match target.socket(self.shared.socket_factory.as_ref()) {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(
                    target = %target.host_address(),
                    error = %e,
                    "could not create write socket"
                );
                return Some(PingResult {
                    sample_number,
                    code: ResultCode::TransmitError,
                    responder: None,
                    transmit_epoch: SystemTime::now(),
                    round_trip: std::time::Duration::ZERO,
                    target: Arc::clone(target),
                });
            }
        };

        let item = Arc::new(PingItem::new(
            Arc::clone(target),
            sequence,
            sample_number,
            Instant::now(),
            SystemTime::now(),
        ));
        self.shared.requests.add(Arc::clone(&item));

        let packet = match icmp::build_echo_request(
            target.id(),
            sequence,
            &self.payload,
            self.shared.version,
        ) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::error!(error = %e, "could not build echo request");
                return self.resolve_transmit_error(&item);
            }
        };

        match socket.send_to(&packet, target.host_address()) {
            Ok(n) if n == packet.len() => {
                tracing::trace!(
                    target = %target.host_address(),
                    sequence,
                    sample_number,
                    "probe sent"
                );
                None
            }
            Ok(n) => {
                tracing::error!(
                    target = %target.host_address(),
                    sent = n,
                    expected = packet.len(),
                    "short send"
                );
                self.resolve_transmit_error(&item)
            }
            Err(e) => {
                tracing::error!(target = %target.host_address(), error = %e, "send failed");
                self.resolve_transmit_error(&item)
            }
        }
    }

    /// A probe that never left this host intact is resolved right away
    /// instead of lingering until the sweep mislabels it a no-reply.
    fn resolve_transmit_error(&self, item: &Arc<PingItem>) -> Option<PingResult> {
        if !item.claim() {
            return None;
        }
        self.shared
            .requests
            .remove(composite_key(item.id(), item.sequence()));
        Some(PingResult {
            sample_number: item.sample_number(),
            code: ResultCode::TransmitError,
            responder: None,
            transmit_epoch: item.transmit_epoch(),
            round_trip: item.transmit_time().elapsed(),
            target: Arc::clone(item.target()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::{DEFAULT_PAYLOAD_SIZE, DEFAULT_TIMEOUT};
    use crate::error::SweepError;
    use crate::icmp::IpVersion;
    use crate::result::ping_result_channel;
    use crate::socket::tests::{OnSend, SocketFactoryMock};
    use crate::socket::{IcmpSocket, SocketFactory};

    use super::*;

    fn make_shared(factory: Arc<dyn SocketFactory>) -> Arc<EngineShared> {
        Arc::new(EngineShared::new(
            IpVersion::V4,
            factory,
            Duration::from_millis(10),
            DEFAULT_TIMEOUT,
        ))
    }

    #[test]
    fn one_probe_per_target_per_round() {
        let factory = Arc::new(SocketFactoryMock::new(OnSend::ReturnDefault));
        let shared = make_shared(factory.clone());
        let first = Arc::new(PingTarget::new("127.0.0.1".parse().unwrap(), 0));
        let second = Arc::new(PingTarget::new("127.0.0.2".parse().unwrap(), 0));
        shared.targets.lock().push(Arc::clone(&first));
        shared.targets.lock().push(Arc::clone(&second));
        let (results_tx, _results_rx) = ping_result_channel(4);
        let transmitter =
            PingTransmitter::new(Arc::clone(&shared), results_tx, DEFAULT_PAYLOAD_SIZE);

        transmitter.send_round(100, 0);

        factory
            .write_mock()
            .should_send_number_of_messages(2)
            .should_send_to_address(&first.host_address())
            .should_send_to_address(&second.host_address());

        // both probes are tracked under distinct keys, same round
        assert_eq!(2, shared.requests.len());
        for target in [&first, &second] {
            let item = shared
                .requests
                .get(composite_key(target.id(), 100))
                .expect("probe tracked");
            assert_eq!(0, item.sample_number());
            assert_eq!(100, item.sequence());
        }
    }

    #[test]
    fn short_send_resolves_as_transmit_error() {
        let factory = Arc::new(SocketFactoryMock::new(OnSend::ReturnShort));
        let shared = make_shared(factory);
        let target = Arc::new(PingTarget::new("127.0.0.1".parse().unwrap(), 0));
        shared.targets.lock().push(Arc::clone(&target));
        let (results_tx, results_rx) = ping_result_channel(4);
        let transmitter =
            PingTransmitter::new(Arc::clone(&shared), results_tx, DEFAULT_PAYLOAD_SIZE);

        transmitter.send_round(5, 3);

        let result = results_rx.try_recv().expect("transmit error reported");
        assert_eq!(ResultCode::TransmitError, result.code);
        assert_eq!(3, result.sample_number);
        assert!(result.responder.is_none());
        // the probe does not linger for the timeout sweep
        assert_eq!(0, shared.requests.len());
    }

    #[test]
    fn socket_creation_failure_is_reported() {
        struct FailingFactory;
        impl SocketFactory for FailingFactory {
            fn write_socket(
                &self,
                _version: IpVersion,
                _ttl: u8,
            ) -> crate::error::Result<Arc<dyn IcmpSocket>> {
                Err(SweepError::Socket(std::io::Error::from(
                    std::io::ErrorKind::PermissionDenied,
                )))
            }
            fn read_socket(
                &self,
                _version: IpVersion,
                _timeout: Duration,
            ) -> crate::error::Result<Arc<dyn IcmpSocket>> {
                Err(SweepError::Socket(std::io::Error::from(
                    std::io::ErrorKind::PermissionDenied,
                )))
            }
        }

        let shared = make_shared(Arc::new(FailingFactory));
        let target = Arc::new(PingTarget::new("127.0.0.1".parse().unwrap(), 0));
        shared.targets.lock().push(target);
        let (results_tx, results_rx) = ping_result_channel(4);
        let transmitter =
            PingTransmitter::new(Arc::clone(&shared), results_tx, DEFAULT_PAYLOAD_SIZE);

        transmitter.send_round(1, 0);

        let result = results_rx.try_recv().expect("transmit error reported");
        assert_eq!(ResultCode::TransmitError, result.code);
        assert_eq!(0, shared.requests.len());
    }

    #[test]
    fn run_loop_advances_sequence_and_sample_per_cycle() {
        let factory = Arc::new(SocketFactoryMock::new(OnSend::ReturnDefault));
        let shared = make_shared(factory);
        let target = Arc::new(PingTarget::new("127.0.0.1".parse().unwrap(), 0));
        shared.targets.lock().push(target);
        let (results_tx, _results_rx) = ping_result_channel(64);
        let transmitter =
            PingTransmitter::new(Arc::clone(&shared), results_tx, DEFAULT_PAYLOAD_SIZE);

        let (halt_tx, halt_rx) = mpsc::channel::<()>();
        let handle = std::thread::spawn(move || transmitter.run(&halt_rx));
        std::thread::sleep(Duration::from_millis(55));
        halt_tx.send(()).unwrap();
        handle.join().unwrap();

        // nothing consumed the probes, so every cycle left one tracked item
        let count = shared.requests.len();
        more_asserts::assert_ge!(count, 2);

        // make sure even the youngest item has a measurable age
        std::thread::sleep(Duration::from_millis(2));
        let mut samples: Vec<u64> = shared
            .requests
            .claim_expired(Duration::ZERO)
            .iter()
            .map(|(item, _age)| item.sample_number())
            .collect();
        samples.sort_unstable();
        samples.dedup();
        // strictly increasing from zero, one sample per cycle
        assert_eq!(count, samples.len());
        assert_eq!(0, samples[0]);
    }
}
