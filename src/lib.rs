//! Multi-threaded ICMP probe engine for ping and traceroute-style sweeps.
//!
//! A [`PingEngine`] drives three worker threads: a transmitter sending one
//! echo request per interval to every registered [`PingTarget`], a receiver
//! correlating replies to outstanding probes, and a timeout monitor
//! resolving probes nothing answered. Every resolved probe is reported as a
//! [`PingResult`] on a single channel.
//!
//! Raw ICMP sockets usually require elevated privileges; see
//! [`SocketType`] for the unprivileged datagram variant.

#![warn(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub use config::{Config, DEFAULT_CHANNEL_SIZE, DEFAULT_INTERVAL, DEFAULT_PAYLOAD_SIZE, DEFAULT_TIMEOUT};
pub use engine::PingEngine;
pub use error::{Result, SweepError};
pub use icmp::IpVersion;
pub use result::{PingResult, PingResultReceiver, ResultCode};
pub use socket::{IcmpSocket, RawSocketFactory, SocketFactory, SocketType};
pub use target::PingTarget;

mod config;
mod engine;
mod error;
mod icmp;
mod item;
mod receiver;
mod request_map;
mod result;
mod socket;
mod target;
mod timeout;
mod transmitter;
