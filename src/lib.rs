//! # dhcp-net - socket primitives for DHCPv4
//!
//! A DHCPv4 client needs two kinds of sockets over its lifetime:
//!
//! - Before it holds an address, a link-layer (`AF_PACKET`) socket bound to
//!   one interface, with a kernel filter that only lets UDP datagrams for
//!   the DHCP client port through.
//! - Once it holds an address, an ordinary UDP socket.
//!
//! This crate creates both and sends on them. Message encoding, the lease
//! state machine and retransmission belong to the caller, who owns every
//! socket returned.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dhcp_net::network::{self, frame};
//! use std::net::{Ipv4Addr, SocketAddrV4};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ifindex = network::interface_index("eth0")?;
//!     let (socket, link) = network::bind_raw_socket(ifindex)?;
//!
//!     let dhcp_payload = [0u8; 300];
//!     let packet = frame::build_udp_frame(
//!         SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, network::DHCP_CLIENT_PORT),
//!         SocketAddrV4::new(Ipv4Addr::BROADCAST, network::DHCP_SERVER_PORT),
//!         &dhcp_payload,
//!     )?;
//!     network::send_raw_socket(&socket, &link, &packet)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;

pub use config::{Args, ProbeConfig};
pub use error::ProbeError;
pub use network::{
    bind_raw_socket, bind_udp_socket, send_raw_socket, send_udp_socket, Endpoint, LinkAddress,
    SocketError,
};
