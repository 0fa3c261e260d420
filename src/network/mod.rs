//! Socket primitives for exchanging DHCPv4 packets
//!
//! Two independent factories live here:
//! - [`raw`]: link-layer (`AF_PACKET`) sockets with an attached packet filter,
//!   used while the client has no usable IPv4 address
//! - [`udp`]: plain UDP sockets, used once an address has been leased
//!
//! Callers own every socket returned by a successful bind. A bind that fails
//! part-way closes its socket before returning the error.

pub mod filter;
pub mod frame;
pub mod raw;
pub mod udp;

use socket2::SockAddr;
use std::{ffi::CString, io, net::SocketAddrV4};
use thiserror::Error;

pub use filter::{dhcp_client_filter, udp_port_filter, FilterProgram, Instruction};
pub use raw::{bind_raw_socket, send_raw_socket};
pub use udp::{bind_udp_socket, send_udp_socket};

pub const DHCP_CLIENT_PORT: u16 = 68;
pub const DHCP_SERVER_PORT: u16 = 67;

/// Ethertype for IPv4, host order.
pub const ETH_P_IP: u16 = 0x0800;
/// Hardware address length of an Ethernet link.
pub const ETH_ALEN: u8 = 6;
/// Link-layer broadcast address.
pub const ETH_BROADCAST: [u8; ETH_ALEN as usize] = [0xff; ETH_ALEN as usize];

/// Defines all possible errors for socket operations.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Interface index {0} is not a valid interface index")]
    InvalidInterfaceIndex(i32),

    #[error("Hardware address length {0} does not fit a link-layer address")]
    InvalidHardwareLength(u8),

    #[error("Refusing to send an empty packet on a raw socket")]
    EmptyPacket,

    #[error("A {0} byte datagram does not fit in one IPv4 packet")]
    PacketTooLarge(usize),

    #[error("Interface '{interface}' not found")]
    InterfaceNotFound {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create a new socket")]
    CreateSocket(#[source] io::Error),

    #[error("Failed to enable PACKET_AUXDATA on socket")]
    EnableAuxData(#[source] io::Error),

    #[error("Failed to attach packet filter to socket")]
    AttachFilter(#[source] io::Error),

    #[error("Failed to bind socket to address")]
    BindSocket(#[source] io::Error),

    #[error("Failed to send packet")]
    Send(#[source] io::Error),

    #[error("Failed to convert socket to TokioUdpSocket")]
    ConvertToTokio(#[source] io::Error),

    #[error("Link-layer sockets are not implemented on this platform")]
    NotImplemented,
}

impl SocketError {
    /// The OS error number of the syscall that failed, if one was issued.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            SocketError::InterfaceNotFound { source, .. }
            | SocketError::CreateSocket(source)
            | SocketError::EnableAuxData(source)
            | SocketError::AttachFilter(source)
            | SocketError::BindSocket(source)
            | SocketError::Send(source)
            | SocketError::ConvertToTokio(source) => source.raw_os_error(),
            SocketError::InvalidInterfaceIndex(_)
            | SocketError::InvalidHardwareLength(_)
            | SocketError::EmptyPacket
            | SocketError::PacketTooLarge(_)
            | SocketError::NotImplemented => None,
        }
    }

    /// Negated errno, for callers speaking the `-errno` convention.
    ///
    /// Precondition violations map to `-EINVAL` (`-EMSGSIZE` for oversized
    /// datagrams), a missing platform to `-EOPNOTSUPP`.
    pub fn errno(&self) -> i32 {
        match self {
            SocketError::InvalidInterfaceIndex(_)
            | SocketError::InvalidHardwareLength(_)
            | SocketError::EmptyPacket => -libc::EINVAL,
            SocketError::PacketTooLarge(_) => -libc::EMSGSIZE,
            SocketError::NotImplemented => -libc::EOPNOTSUPP,
            _ => -self.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// True when the call was rejected before reaching the kernel.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SocketError::InvalidInterfaceIndex(_)
                | SocketError::InvalidHardwareLength(_)
                | SocketError::EmptyPacket
                | SocketError::PacketTooLarge(_)
        )
    }
}

/// A link-layer socket endpoint, the `sockaddr_ll` of a raw DHCP socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkAddress {
    /// Ethertype, host order.
    pub protocol: u16,
    pub ifindex: i32,
    pub halen: u8,
    pub addr: [u8; 8],
}

impl LinkAddress {
    /// IPv4 over the given interface, addressed to the link broadcast address.
    pub fn broadcast(ifindex: i32) -> Self {
        Self::new(ifindex, &ETH_BROADCAST)
    }

    /// IPv4 over the given interface, addressed to `hwaddr`.
    ///
    /// Hardware addresses longer than 8 bytes are truncated and rejected at
    /// send time through `halen`.
    pub fn new(ifindex: i32, hwaddr: &[u8]) -> Self {
        let mut addr = [0u8; 8];
        let len = hwaddr.len().min(addr.len());
        addr[..len].copy_from_slice(&hwaddr[..len]);
        Self {
            protocol: ETH_P_IP,
            ifindex,
            halen: u8::try_from(hwaddr.len()).unwrap_or(u8::MAX),
            addr,
        }
    }

    pub fn hardware_address(&self) -> &[u8] {
        &self.addr[..usize::from(self.halen).min(self.addr.len())]
    }

    pub fn is_broadcast(&self) -> bool {
        !self.hardware_address().is_empty() && self.hardware_address().iter().all(|b| *b == 0xff)
    }

    /// Checks the invariants a send relies on.
    pub fn validate(&self) -> Result<(), SocketError> {
        if self.ifindex <= 0 {
            return Err(SocketError::InvalidInterfaceIndex(self.ifindex));
        }
        if self.halen == 0 || usize::from(self.halen) > self.addr.len() {
            return Err(SocketError::InvalidHardwareLength(self.halen));
        }
        Ok(())
    }
}

/// Where a DHCP packet goes: a link-layer peer or an IPv4 endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Link(LinkAddress),
    Ipv4(SocketAddrV4),
}

impl Endpoint {
    /// Converts the endpoint into a kernel socket address of the right size.
    pub fn to_sock_addr(&self) -> Result<SockAddr, SocketError> {
        match self {
            Endpoint::Ipv4(addr) => Ok(SockAddr::from(*addr)),
            Endpoint::Link(link) => link_sock_addr(link),
        }
    }
}

impl From<LinkAddress> for Endpoint {
    fn from(link: LinkAddress) -> Self {
        Endpoint::Link(link)
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Endpoint::Ipv4(addr)
    }
}

#[cfg(target_os = "linux")]
fn link_sock_addr(link: &LinkAddress) -> Result<SockAddr, SocketError> {
    use std::mem;

    // SAFETY: an all-zero `sockaddr_storage` is a valid value, and it is
    // large and aligned enough to hold a `sockaddr_ll`.
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let sll = unsafe { &mut *(&mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_ll) };
    sll.sll_family = libc::AF_PACKET as libc::sa_family_t;
    sll.sll_protocol = link.protocol.to_be();
    sll.sll_ifindex = link.ifindex;
    sll.sll_halen = link.halen;
    sll.sll_addr = link.addr;

    let len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
    // SAFETY: `storage` holds an initialised `sockaddr_ll` of length `len`.
    Ok(unsafe { SockAddr::new(storage, len) })
}

#[cfg(not(target_os = "linux"))]
fn link_sock_addr(_link: &LinkAddress) -> Result<SockAddr, SocketError> {
    Err(SocketError::NotImplemented)
}

/// Resolves an interface name such as `eth0` to its kernel index.
pub fn interface_index(interface: &str) -> Result<i32, SocketError> {
    let name = CString::new(interface).map_err(|e| SocketError::InterfaceNotFound {
        interface: interface.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, e),
    })?;

    // SAFETY: `name` is a valid NUL-terminated string for the whole call.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(SocketError::InterfaceNotFound {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    i32::try_from(index).map_err(|_| SocketError::InvalidInterfaceIndex(i32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_broadcast_link_address() {
        let link = LinkAddress::broadcast(3);

        assert_eq!(link.ifindex, 3);
        assert_eq!(link.protocol, ETH_P_IP);
        assert_eq!(link.halen, 6);
        assert_eq!(link.hardware_address(), &[0xff; 6]);
        assert!(link.is_broadcast());
        assert!(link.validate().is_ok());
    }

    #[test]
    fn test_unicast_link_address() {
        let mac = [0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4];
        let link = LinkAddress::new(2, &mac);

        assert_eq!(link.hardware_address(), &mac);
        assert!(!link.is_broadcast());
    }

    #[test]
    fn test_link_address_validation() {
        assert!(matches!(
            LinkAddress::broadcast(0).validate(),
            Err(SocketError::InvalidInterfaceIndex(0))
        ));
        assert!(matches!(
            LinkAddress::new(1, &[]).validate(),
            Err(SocketError::InvalidHardwareLength(0))
        ));
        assert!(matches!(
            LinkAddress::new(1, &[0u8; 16]).validate(),
            Err(SocketError::InvalidHardwareLength(16))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_link_endpoint_sock_addr() {
        let addr = Endpoint::from(LinkAddress::broadcast(7))
            .to_sock_addr()
            .unwrap();

        assert_eq!(addr.family(), libc::AF_PACKET as libc::sa_family_t);
        assert_eq!(
            addr.len() as usize,
            std::mem::size_of::<libc::sockaddr_ll>()
        );

        // SAFETY: the family check above guarantees a `sockaddr_ll`.
        let sll = unsafe { &*(addr.as_ptr() as *const libc::sockaddr_ll) };
        assert_eq!(sll.sll_ifindex, 7);
        assert_eq!(u16::from_be(sll.sll_protocol), ETH_P_IP);
        assert_eq!(sll.sll_halen, 6);
        assert_eq!(&sll.sll_addr[..6], &[0xff; 6]);
    }

    #[test]
    fn test_ipv4_endpoint_sock_addr() {
        let target = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 1), DHCP_SERVER_PORT);
        let addr = Endpoint::from(target).to_sock_addr().unwrap();

        assert_eq!(addr.as_socket_ipv4(), Some(target));
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(SocketError::EmptyPacket.errno(), -libc::EINVAL);
        assert!(SocketError::InvalidInterfaceIndex(-1).is_precondition());

        let err = SocketError::BindSocket(io::Error::from_raw_os_error(libc::EADDRNOTAVAIL));
        assert_eq!(err.raw_os_error(), Some(libc::EADDRNOTAVAIL));
        assert_eq!(err.errno(), -libc::EADDRNOTAVAIL);
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_unknown_interface() {
        let err = interface_index("does-not-exist0").unwrap_err();
        assert!(matches!(err, SocketError::InterfaceNotFound { .. }));
    }
}
