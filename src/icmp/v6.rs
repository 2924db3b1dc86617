use pnet_packet::icmpv6::{Icmpv6Packet, Icmpv6Types, MutableIcmpv6Packet};
use pnet_packet::Packet;

use crate::error::{Result, SweepError};
use crate::icmp::{EchoResponse, EchoResponseKind};

// ICMPv6 echo header: 4 bytes type/code/checksum, then identifier and
// sequence ahead of the payload proper.
const ECHO_HEADER_SIZE: usize = 4;
const IDENT_SIZE: usize = 4;

// Offset of the invoked echo's identifier inside a time-exceeded body:
// 4 bytes unused, the quoted 40-byte IPv6 header, 4 bytes ICMPv6 header.
const INVOKED_IDENT_OFFSET: usize = 4 + 40 + 4;

/// The checksum is omitted on purpose: for ICMPv6 the kernel fills it in
/// (RFC 3542, section 3.1).
pub(crate) fn build_echo_request(id: u16, sequence: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; ECHO_HEADER_SIZE + IDENT_SIZE + payload.len()];
    let mut packet = MutableIcmpv6Packet::new(&mut buf).ok_or(SweepError::IncorrectBufferSize)?;
    packet.set_icmpv6_type(Icmpv6Types::EchoRequest);

    let mut body = vec![0u8; IDENT_SIZE + payload.len()];
    body[0..2].copy_from_slice(&id.to_be_bytes());
    body[2..4].copy_from_slice(&sequence.to_be_bytes());
    body[4..].copy_from_slice(payload);
    packet.set_payload(&body);

    Ok(buf)
}

/// Decode one ICMPv6 message. Raw ICMPv6 sockets deliver the message without
/// an IP header, so `buf` starts at the ICMPv6 header.
pub(crate) fn decode(buf: &[u8]) -> EchoResponse {
    let Some(packet) = Icmpv6Packet::new(buf) else {
        return EchoResponse::invalid();
    };
    let body = packet.payload();

    match packet.get_icmpv6_type() {
        Icmpv6Types::EchoReply => {
            if body.len() < IDENT_SIZE {
                return EchoResponse::invalid();
            }
            EchoResponse {
                kind: EchoResponseKind::EchoReply,
                id: u16::from_be_bytes([body[0], body[1]]),
                sequence: u16::from_be_bytes([body[2], body[3]]),
            }
        }
        Icmpv6Types::TimeExceeded => {
            if body.len() < INVOKED_IDENT_OFFSET + 4 {
                return EchoResponse::invalid();
            }
            EchoResponse {
                kind: EchoResponseKind::TimeExceeded,
                id: u16::from_be_bytes([body[INVOKED_IDENT_OFFSET], body[INVOKED_IDENT_OFFSET + 1]]),
                sequence: u16::from_be_bytes([
                    body[INVOKED_IDENT_OFFSET + 2],
                    body[INVOKED_IDENT_OFFSET + 3],
                ]),
            }
        }
        _ => EchoResponse::other(),
    }
}
