use std::time::Duration;

use crate::icmp::IpVersion;
use crate::socket::SocketType;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2500);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_PAYLOAD_SIZE: usize = 52;
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Engine configuration. Interval and timeout can be changed later through
/// the engine; the remaining fields are fixed per engine.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub version: IpVersion,
    /// Time between probe rounds.
    pub interval: Duration,
    /// How long a probe may stay unanswered before it resolves as no-reply.
    pub timeout: Duration,
    /// Echo request payload size in bytes.
    pub payload_size: usize,
    /// Capacity of the result channel.
    pub channel_size: usize,
    pub socket_type: SocketType,
}

impl Config {
    #[must_use]
    pub fn new(version: IpVersion) -> Self {
        Config {
            version,
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: IpVersion::V4,
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            channel_size: DEFAULT_CHANNEL_SIZE,
            socket_type: SocketType::Raw,
        }
    }
}
