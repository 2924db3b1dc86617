use std::net::IpAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::target::PingTarget;

/// Outcome class of one probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultCode {
    /// Echo reply from the destination.
    Ok,
    /// A TTL-limited probe was answered by an intermediate hop. This is the
    /// expected, successful outcome of a traceroute-style probe, not a
    /// failure.
    TimeExceeded,
    /// No answer within the configured reply timeout.
    NoReply,
    /// The probe never left this host intact (socket failure or short send).
    TransmitError,
}

/// One resolved probe, emitted on the engine's result channel.
#[derive(Clone, Debug)]
pub struct PingResult {
    /// Probe round counter, shared by all targets probed in the same cycle.
    pub sample_number: u64,
    pub code: ResultCode,
    /// Who answered; an intermediate router for `TimeExceeded`, `None` when
    /// nothing answered.
    pub responder: Option<IpAddr>,
    /// Wall-clock time the probe was transmitted, for placing the sample on
    /// an absolute timeline.
    pub transmit_epoch: SystemTime,
    /// Monotonic-clock difference between transmission and resolution.
    pub round_trip: Duration,
    pub target: Arc<PingTarget>,
}

// `PingTarget` holds a `Mutex` and a `dyn Any` and so cannot derive `PartialEq`;
// targets are compared by identity (the same `Arc`) instead. Equality is used by
// the test harness to assert the result channel is empty.
impl PartialEq for PingResult {
    fn eq(&self, other: &Self) -> bool {
        self.sample_number == other.sample_number
            && self.code == other.code
            && self.responder == other.responder
            && self.transmit_epoch == other.transmit_epoch
            && self.round_trip == other.round_trip
            && Arc::ptr_eq(&self.target, &other.target)
    }
}

pub(crate) type PingResultSender = mpsc::SyncSender<PingResult>;
pub type PingResultReceiver = mpsc::Receiver<PingResult>;

pub(crate) fn ping_result_channel(channel_size: usize) -> (PingResultSender, PingResultReceiver) {
    mpsc::sync_channel::<PingResult>(channel_size)
}

pub(crate) fn emit(results_tx: &PingResultSender, result: PingResult) {
    if results_tx.send(result).is_err() {
        tracing::error!("result channel closed, dropping ping result");
    }
}
