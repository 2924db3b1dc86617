use std::net::IpAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use crate::engine::EngineShared;
use crate::icmp::{self, EchoResponseKind};
use crate::request_map::composite_key;
use crate::result::{self, PingResult, PingResultSender, ResultCode};
use crate::socket::IcmpSocket;

const RECEIVE_BUFFER_SIZE: usize = 2048;

/// Reply decoder. Blocks on the read socket with a short timeout so the
/// halt signal is observed promptly even on a quiet network, decodes every
/// inbound message, and matches it to a tracked probe.
pub(crate) struct PingReceiver {
    shared: Arc<EngineShared>,
    socket: Arc<dyn IcmpSocket>,
    results_tx: PingResultSender,
}

impl PingReceiver {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        socket: Arc<dyn IcmpSocket>,
        results_tx: PingResultSender,
    ) -> Self {
        PingReceiver {
            shared,
            socket,
            results_tx,
        }
    }

    pub(crate) fn run(self, halt_rx: &mpsc::Receiver<()>) {
        tracing::trace!("receiver starting");
        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
        loop {
            match halt_rx.try_recv() {
                Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
                Err(mpsc::TryRecvError::Empty) => {}
            }

            match self.socket.recv_from(&mut buf) {
                // receive timeout, loop around to observe the halt signal
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "receive failed"),
                Ok(Some((n, from))) => {
                    let receive_time = Instant::now();
                    self.handle_message(&buf[..n], from, receive_time);
                }
            }
        }
        tracing::trace!("receiver stopped");
    }

    pub(crate) fn handle_message(&self, message: &[u8], from: IpAddr, receive_time: Instant) {
        let response = icmp::decode(message, self.shared.version);
        let code = match response.kind {
            EchoResponseKind::EchoReply => ResultCode::Ok,
            EchoResponseKind::TimeExceeded => ResultCode::TimeExceeded,
            // background noise on a shared socket, or message kinds the
            // timeout sweep will eventually resolve
            EchoResponseKind::Invalid | EchoResponseKind::Other => return,
        };

        let key = composite_key(response.id, response.sequence);
        let Some(item) = self.shared.requests.get(key) else {
            // late arrival after the sweep resolved it, or a reply meant for
            // a different process
            tracing::trace!(key, "reply without matching request");
            return;
        };

        if item.claim() {
            result::emit(
                &self.results_tx,
                PingResult {
                    sample_number: item.sample_number(),
                    code,
                    responder: Some(from),
                    transmit_epoch: item.transmit_epoch(),
                    round_trip: receive_time.duration_since(item.transmit_time()),
                    target: Arc::clone(item.target()),
                },
            );
        }
        // resolution ends the item's life no matter which side won the claim
        self.shared.requests.remove(key);
    }
}
