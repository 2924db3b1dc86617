use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::echo_request::{EchoRequestPacket, MutableEchoRequestPacket};
use pnet_packet::icmp::time_exceeded::TimeExceededPacket;
use pnet_packet::icmp::{self, IcmpPacket, IcmpTypes};
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::Packet;

use crate::error::{Result, SweepError};
use crate::icmp::{EchoResponse, EchoResponseKind};

pub(crate) fn build_echo_request(id: u16, sequence: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; EchoRequestPacket::minimum_packet_size() + payload.len()];
    let mut packet =
        MutableEchoRequestPacket::new(&mut buf).ok_or(SweepError::IncorrectBufferSize)?;
    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_identifier(id);
    packet.set_sequence_number(sequence);
    packet.set_payload(payload);

    let checksum = icmp::checksum(
        &IcmpPacket::new(packet.packet()).ok_or(SweepError::IncorrectBufferSize)?,
    );
    packet.set_checksum(checksum);

    Ok(buf)
}

/// Decode one ICMPv4 message. `buf` starts at the ICMP header.
pub(crate) fn decode(buf: &[u8]) -> EchoResponse {
    let Some(packet) = IcmpPacket::new(buf) else {
        return EchoResponse::invalid();
    };

    match packet.get_icmp_type() {
        IcmpTypes::EchoReply => match EchoReplyPacket::new(buf) {
            Some(reply) => EchoResponse {
                kind: EchoResponseKind::EchoReply,
                id: reply.get_identifier(),
                sequence: reply.get_sequence_number(),
            },
            None => EchoResponse::invalid(),
        },
        IcmpTypes::TimeExceeded => decode_time_exceeded(buf),
        _ => EchoResponse::other(),
    }
}

/// A time-exceeded message quotes the invoked datagram after its unused
/// field: the original IPv4 header (variable length) followed by the start
/// of our echo request, which is where the id and sequence live.
fn decode_time_exceeded(buf: &[u8]) -> EchoResponse {
    let Some(packet) = TimeExceededPacket::new(buf) else {
        return EchoResponse::invalid();
    };
    let Some(invoked) = Ipv4Packet::new(packet.payload()) else {
        return EchoResponse::invalid();
    };
    let Some(echo) = EchoRequestPacket::new(invoked.payload()) else {
        return EchoResponse::invalid();
    };

    EchoResponse {
        kind: EchoResponseKind::TimeExceeded,
        id: echo.get_identifier(),
        sequence: echo.get_sequence_number(),
    }
}
