//! DISCOVER probe
//!
//! Sends one DHCPDISCOVER on the configured interface and collects OFFERs
//! until the reply timeout expires. Without a local address the raw socket
//! path is used, otherwise the UDP one.

pub mod message;

use dhcp_net::{
    network::{self, frame},
    ProbeConfig, ProbeError,
};
use message::Offer;
use socket2::Socket;
use std::{
    io::{self, Read as _},
    net::{Ipv4Addr, SocketAddrV4},
    path::PathBuf,
};
use tokio::{
    io::unix::AsyncFd,
    time::{self, Instant},
};

pub async fn run(config: &ProbeConfig) -> Result<Vec<Offer>, ProbeError> {
    let mac_path = PathBuf::from(format!("/sys/class/net/{}/address", config.interface));
    let mac_addr = message::read_hardware_address(&mac_path).await?;
    tracing::info!("Found MAC address: {:02x?}", &mac_addr[..]);

    let xid = rand::random::<u32>();
    let discover =
        message::build_dhcp_discover(&mac_addr, xid, &config.parameter_request_list)?;

    match config.local_address {
        Some(address) => probe_udp(config, address, xid, &discover).await,
        None => probe_raw(config, xid, &discover).await,
    }
}

async fn probe_raw(config: &ProbeConfig, xid: u32, discover: &[u8]) -> Result<Vec<Offer>, ProbeError> {
    let ifindex = network::interface_index(&config.interface)?;
    let (socket, link) = network::bind_raw_socket(ifindex)?;
    tracing::info!(
        "Raw socket bound to '{}' (index {})",
        config.interface,
        ifindex
    );

    let packet = frame::build_udp_frame(
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.client_port),
        SocketAddrV4::new(config.server_address, config.server_port),
        discover,
    )?;
    network::send_raw_socket(&socket, &link, &packet)?;
    tracing::info!(
        "Sent DHCPDISCOVER xid={:#010x} ({} bytes) on '{}'",
        xid,
        packet.len(),
        config.interface
    );

    let socket = AsyncFd::new(socket)?;
    let deadline = Instant::now() + config.reply_timeout;
    let mut offers = Vec::new();
    let mut buf = vec![0u8; 1500];

    while let Ok(received) = time::timeout_at(deadline, recv_frame(&socket, &mut buf)).await {
        let len = received?;
        let Some(payload) = udp_payload(&buf[..len]) else {
            tracing::debug!("Ignoring {} byte frame without a UDP payload", len);
            continue;
        };
        collect_offer(payload, xid, &mut offers);
    }

    Ok(offers)
}

async fn probe_udp(
    config: &ProbeConfig,
    address: Ipv4Addr,
    xid: u32,
    discover: &[u8],
) -> Result<Vec<Offer>, ProbeError> {
    let socket = network::bind_udp_socket(address, config.client_port)?;
    if config.server_address.is_broadcast() {
        socket.set_broadcast(true)?;
    }
    tracing::info!("UDP socket bound to {}:{}", address, config.client_port);

    network::send_udp_socket(
        &socket,
        config.server_address,
        config.server_port,
        discover,
    )?;
    tracing::info!(
        "Sent DHCPDISCOVER xid={:#010x} to {}:{}",
        xid,
        config.server_address,
        config.server_port
    );

    let socket = network::udp::into_tokio(socket)?;
    let deadline = Instant::now() + config.reply_timeout;
    let mut offers = Vec::new();
    let mut buf = vec![0u8; 1500];

    while let Ok(received) = time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
        let (len, from) = received?;
        tracing::debug!("Received {} bytes from {}", len, from);
        collect_offer(&buf[..len], xid, &mut offers);
    }

    Ok(offers)
}

fn collect_offer(payload: &[u8], xid: u32, offers: &mut Vec<Offer>) {
    match message::parse_offer(payload, xid) {
        Ok(Some(offer)) => {
            tracing::info!(
                "Received DHCP OFFER of {} from {:?}",
                offer.offered_ip,
                offer.server_identifier
            );
            offers.push(offer);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to decode DHCP message: {}", e),
    }
}

async fn recv_frame(socket: &AsyncFd<Socket>, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let mut guard = socket.readable().await?;
        match guard.try_io(|inner| {
            let mut sock: &Socket = inner.get_ref();
            sock.read(buf)
        }) {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

/// Returns the UDP payload of an IPv4 datagram as delivered by a cooked
/// packet socket.
fn udp_payload(datagram: &[u8]) -> Option<&[u8]> {
    let ihl = usize::from(datagram.first()? & 0x0f) * 4;
    if ihl < frame::IPV4_HEADER_LEN {
        return None;
    }
    let udp = datagram.get(ihl..)?;
    let udp_len = usize::from(u16::from_be_bytes([*udp.get(4)?, *udp.get(5)?]));
    udp.get(frame::UDP_HEADER_LEN..udp_len.max(frame::UDP_HEADER_LEN))
}
