//! Link-layer sockets for DHCP traffic before an address is leased.

use super::{LinkAddress, SocketError};
use socket2::Socket;

/// Creates a cooked `AF_PACKET` socket bound to interface `ifindex` and
/// returns it together with the broadcast [`LinkAddress`] it was bound to.
///
/// The order of operations follows what the receive side relies on:
/// 1. Creates a non-blocking, close-on-exec `SOCK_DGRAM` packet socket.
/// 2. Enables `PACKET_AUXDATA`, so receives carry checksum status.
/// 3. Attaches [`dhcp_client_filter`](super::dhcp_client_filter).
/// 4. Binds to IPv4 on `ifindex`.
///
/// The socket is closed again if any step after its creation fails.
#[cfg(target_os = "linux")]
pub fn bind_raw_socket(ifindex: i32) -> Result<(Socket, LinkAddress), SocketError> {
    use super::{filter::dhcp_client_filter, Endpoint};
    use socket2::{Domain, Type};
    use std::{io, mem, os::fd::AsRawFd};

    if ifindex <= 0 {
        return Err(SocketError::InvalidInterfaceIndex(ifindex));
    }

    // `socket2` always requests SOCK_CLOEXEC on Linux.
    let socket = Socket::new(Domain::PACKET, Type::DGRAM.nonblocking(), None)
        .map_err(SocketError::CreateSocket)?;

    let link = LinkAddress::broadcast(ifindex);

    let one: libc::c_int = 1;
    // SAFETY: `socket` is a valid descriptor and `one` outlives the call.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_PACKET,
            libc::PACKET_AUXDATA,
            &one as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        tracing::warn!("Failed to enable PACKET_AUXDATA on interface {}: {}", ifindex, err);
        return Err(SocketError::EnableAuxData(err));
    }

    let program = dhcp_client_filter();
    let mut filters = program.to_sock_filters();
    let fprog = libc::sock_fprog {
        len: filters.len() as libc::c_ushort,
        filter: filters.as_mut_ptr(),
    };
    // SAFETY: `fprog` points into `filters`, which lives until after the
    // call; the kernel copies the program.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_ATTACH_FILTER,
            &fprog as *const libc::sock_fprog as *const libc::c_void,
            mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        tracing::warn!("Failed to attach DHCP filter on interface {}: {}", ifindex, err);
        return Err(SocketError::AttachFilter(err));
    }

    let addr = Endpoint::Link(link).to_sock_addr()?;
    socket.bind(&addr).map_err(|e| {
        tracing::warn!("Failed to bind raw socket to interface {}: {}", ifindex, e);
        SocketError::BindSocket(e)
    })?;

    tracing::debug!(
        "Bound raw socket fd={} to interface {} with {}-instruction filter",
        socket.as_raw_fd(),
        ifindex,
        program.len()
    );

    Ok((socket, link))
}

/// Fallback for systems without `AF_PACKET`.
#[cfg(not(target_os = "linux"))]
pub fn bind_raw_socket(ifindex: i32) -> Result<(Socket, LinkAddress), SocketError> {
    if ifindex <= 0 {
        return Err(SocketError::InvalidInterfaceIndex(ifindex));
    }
    Err(SocketError::NotImplemented)
}

/// Sends `packet`, an IPv4 datagram, as one frame to `link`.
///
/// Empty packets and link addresses that did not come from a bind are
/// rejected before reaching the kernel.
pub fn send_raw_socket(socket: &Socket, link: &LinkAddress, packet: &[u8]) -> Result<(), SocketError> {
    if packet.is_empty() {
        return Err(SocketError::EmptyPacket);
    }
    link.validate()?;

    let addr = super::Endpoint::Link(*link).to_sock_addr()?;
    let sent = socket.send_to(packet, &addr).map_err(SocketError::Send)?;

    tracing::debug!(
        "Sent {} bytes on interface {} to {:02x?}",
        sent,
        link.ifindex,
        link.hardware_address()
    );
    Ok(())
}
