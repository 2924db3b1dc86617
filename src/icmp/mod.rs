//! ICMP echo request construction and response decoding for IPv4 and IPv6.
//!
//! Buffers handed to [`decode`] must start at the ICMP header; the socket
//! layer strips the IPv4 header off raw-socket datagrams before decoding.

use crate::error::Result;

pub(crate) mod v4;
pub(crate) mod v6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

/// Classification of one inbound ICMP message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EchoResponseKind {
    /// Not parseable as an ICMP message of interest.
    Invalid,
    EchoReply,
    /// A TTL-limited probe answered by an intermediate hop.
    TimeExceeded,
    /// Well-formed ICMP that carries no echo correlation data
    /// (destination unreachable and friends).
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EchoResponse {
    pub kind: EchoResponseKind,
    pub id: u16,
    pub sequence: u16,
}

impl EchoResponse {
    pub(crate) fn invalid() -> Self {
        EchoResponse {
            kind: EchoResponseKind::Invalid,
            id: 0,
            sequence: 0,
        }
    }

    pub(crate) fn other() -> Self {
        EchoResponse {
            kind: EchoResponseKind::Other,
            id: 0,
            sequence: 0,
        }
    }
}

pub(crate) fn build_echo_request(
    id: u16,
    sequence: u16,
    payload: &[u8],
    version: IpVersion,
) -> Result<Vec<u8>> {
    match version {
        IpVersion::V4 => v4::build_echo_request(id, sequence, payload),
        IpVersion::V6 => v6::build_echo_request(id, sequence, payload),
    }
}

pub(crate) fn decode(buf: &[u8], version: IpVersion) -> EchoResponse {
    match version {
        IpVersion::V4 => v4::decode(buf),
        IpVersion::V6 => v6::decode(buf),
    }
}
