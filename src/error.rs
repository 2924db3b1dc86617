use std::io;
use std::net::IpAddr;

use thiserror::Error;

use crate::icmp::IpVersion;

pub type Result<T> = std::result::Result<T, SweepError>;

/// An error raised while configuring or driving a ping engine.
///
/// Failures local to a single probe (decode noise, unmatched replies, short
/// sends) are absorbed by the worker loops and reported through the result
/// channel instead; only conditions that keep the engine from functioning at
/// all surface here.
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("socket error")]
    Socket(#[from] io::Error),
    #[error("incorrect buffer size for echo request packet")]
    IncorrectBufferSize,
    #[error("address {address} does not match engine IP version {version:?}")]
    AddressFamily { address: IpAddr, version: IpVersion },
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("engine was already halted")]
    AlreadyHalted,
    #[error("{worker} worker did not stop within the grace period")]
    ShutdownTimeout { worker: &'static str },
    #[error("engine stopped, no further results")]
    Stopped,
}
