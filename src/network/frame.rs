//! IPv4/UDP framing for packets sent on raw DHCP sockets
//!
//! A cooked packet socket supplies the link header itself, so callers hand
//! [`send_raw_socket`](super::send_raw_socket) an IPv4 datagram. These helpers
//! wrap a DHCP payload the same way the filter in [`super::filter`] expects
//! to find it on the receive side.

use super::SocketError;
use bytes::{BufMut as _, Bytes, BytesMut};
use std::net::{Ipv4Addr, SocketAddrV4};

pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
/// Largest IPv4 datagram, bounded by the 16-bit total length field.
pub const MAX_IPV4_DATAGRAM: usize = u16::MAX as usize;
/// Largest UDP payload that still fits one IPv4 datagram without options.
pub const MAX_UDP_PAYLOAD: usize = MAX_IPV4_DATAGRAM - IPV4_HEADER_LEN - UDP_HEADER_LEN;

const IPV4_VERSION_IHL: u8 = 0x45;
/// Class selector 6 (network control).
const IPTOS_CLASS_CS6: u8 = 0xc0;
const DEFAULT_TTL: u8 = 64;
const IPPROTO_UDP: u8 = 17;

/// Wraps `payload` in UDP and IPv4 headers, both checksummed.
///
/// Fails with [`SocketError::PacketTooLarge`] when the datagram would not fit
/// the IPv4 total length field.
pub fn build_udp_frame(
    source: SocketAddrV4,
    destination: SocketAddrV4,
    payload: &[u8],
) -> Result<Bytes, SocketError> {
    if payload.len() > MAX_UDP_PAYLOAD {
        return Err(SocketError::PacketTooLarge(
            IPV4_HEADER_LEN + UDP_HEADER_LEN + payload.len(),
        ));
    }
    let udp_len = (UDP_HEADER_LEN + payload.len()) as u16;

    let mut udp = BytesMut::with_capacity(usize::from(udp_len));
    udp.put_u16(source.port());
    udp.put_u16(destination.port());
    udp.put_u16(udp_len);
    udp.put_u16(0);
    udp.extend_from_slice(payload);

    let mut pseudo = BytesMut::with_capacity(12 + udp.len());
    pseudo.extend_from_slice(&source.ip().octets());
    pseudo.extend_from_slice(&destination.ip().octets());
    pseudo.put_u8(0);
    pseudo.put_u8(IPPROTO_UDP);
    pseudo.put_u16(udp_len);
    pseudo.extend_from_slice(&udp);

    // An all-zero UDP checksum means "none", so a computed zero is sent as ones.
    let sum = match checksum(&pseudo) {
        0 => 0xffff,
        sum => sum,
    };
    udp[6..8].copy_from_slice(&sum.to_be_bytes());

    build_ipv4_frame(IPPROTO_UDP, *source.ip(), *destination.ip(), &udp)
}

/// Prepends an IPv4 header without options to an already built transport segment.
pub fn build_ipv4_frame(
    protocol: u8,
    source: Ipv4Addr,
    destination: Ipv4Addr,
    transport: &[u8],
) -> Result<Bytes, SocketError> {
    let total_len = u16::try_from(IPV4_HEADER_LEN + transport.len())
        .map_err(|_| SocketError::PacketTooLarge(IPV4_HEADER_LEN + transport.len()))?;

    let mut frame = BytesMut::with_capacity(usize::from(total_len));
    frame.put_u8(IPV4_VERSION_IHL);
    frame.put_u8(IPTOS_CLASS_CS6);
    frame.put_u16(total_len);
    frame.put_u16(0); // identification
    frame.put_u16(0); // flags, fragment offset
    frame.put_u8(DEFAULT_TTL);
    frame.put_u8(protocol);
    frame.put_u16(0);
    frame.extend_from_slice(&source.octets());
    frame.extend_from_slice(&destination.octets());

    let sum = checksum(&frame[..IPV4_HEADER_LEN]);
    frame[10..12].copy_from_slice(&sum.to_be_bytes());

    frame.extend_from_slice(transport);
    Ok(frame.freeze())
}

/// RFC 1071 internet checksum.
///
/// Carries are folded back in after every word, so any input length is fine.
pub fn checksum(data: &[u8]) -> u16 {
    let sum = data
        .chunks(2)
        .map(|chunk| match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from(*hi) << 8,
            _ => 0,
        })
        .fold(0u16, |acc, word| {
            let (sum, carry) = acc.overflowing_add(word);
            sum + u16::from(carry)
        });

    !sum
}
