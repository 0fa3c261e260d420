//! UDP sockets for DHCP traffic once an address has been leased.

use super::{Endpoint, SocketError};
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    net::{Ipv4Addr, SocketAddrV4, UdpSocket as StdUdpSocket},
    os::fd::AsRawFd,
};
use tokio::net::UdpSocket as TokioUdpSocket;

/// Creates a non-blocking, close-on-exec UDP socket bound to `address:port`.
///
/// `address` may be [`Ipv4Addr::UNSPECIFIED`] and `port` may be 0 for an
/// ephemeral port. The socket is closed again if the bind fails.
pub fn bind_udp_socket(address: Ipv4Addr, port: u16) -> Result<Socket, SocketError> {
    let socket = Socket::new(Domain::IPV4, udp_type(), Some(Protocol::UDP))
        .map_err(SocketError::CreateSocket)?;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    socket
        .set_nonblocking(true)
        .map_err(SocketError::CreateSocket)?;

    let local = SocketAddrV4::new(address, port);
    socket.bind(&Endpoint::Ipv4(local).to_sock_addr()?).map_err(|e| {
        tracing::warn!("Failed to bind UDP socket to {}: {}", local, e);
        SocketError::BindSocket(e)
    })?;

    tracing::debug!("Bound UDP socket fd={} to {}", socket.as_raw_fd(), local);
    Ok(socket)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn udp_type() -> Type {
    Type::DGRAM.nonblocking()
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn udp_type() -> Type {
    Type::DGRAM
}

/// Sends `packet` as one datagram to `address:port`.
///
/// A zero-length packet is sent as a zero-length datagram.
pub fn send_udp_socket(
    socket: &Socket,
    address: Ipv4Addr,
    port: u16,
    packet: &[u8],
) -> Result<(), SocketError> {
    let dest = SocketAddrV4::new(address, port);
    let sent = socket
        .send_to(packet, &Endpoint::Ipv4(dest).to_sock_addr()?)
        .map_err(SocketError::Send)?;

    tracing::debug!("Sent {} bytes to {}", sent, dest);
    Ok(())
}

/// Consumes a bound socket and converts it into a `tokio::net::UdpSocket`.
///
/// Must be called from within a Tokio runtime.
pub fn into_tokio(socket: Socket) -> Result<TokioUdpSocket, SocketError> {
    socket
        .set_nonblocking(true)
        .map_err(SocketError::ConvertToTokio)?;

    let std_socket: StdUdpSocket = socket.into();
    TokioUdpSocket::from_std(std_socket).map_err(SocketError::ConvertToTokio)
}
