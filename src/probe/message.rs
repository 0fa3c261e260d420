use bytes::{BufMut as _, Bytes, BytesMut};
use dhcp_net::ProbeError;
use dhcproto::{
    v4::{self, OptionCode},
    Decodable as _, Encodable as _, Encoder,
};
use std::{net::Ipv4Addr, path::Path};
use tokio::fs;

/// An OFFER answering our DISCOVER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub offered_ip: Ipv4Addr,
    pub server_identifier: Option<Ipv4Addr>,
}

/// Parses a MAC address string (e.g., "0a:1b:2c:3d:4e:5f").
fn parse_mac_address(mac_str: &str) -> Result<Bytes, String> {
    let mut bytes = BytesMut::with_capacity(6);
    for byte_str in mac_str.split(':') {
        let byte = u8::from_str_radix(byte_str, 16).map_err(|e| format!("'{mac_str}': {e}"))?;
        bytes.put_u8(byte);
    }
    if bytes.len() != 6 {
        return Err(format!("'{mac_str}' has {} octets, expected 6", bytes.len()));
    }
    Ok(bytes.freeze())
}

/// Reads a hardware address in sysfs format, e.g. `/sys/class/net/eth0/address`.
pub async fn read_hardware_address(path: &Path) -> Result<Bytes, ProbeError> {
    let failed = |reason: String| ProbeError::HardwareAddress {
        path: path.to_path_buf(),
        reason,
    };
    let mac_str = fs::read_to_string(path)
        .await
        .map_err(|e| failed(e.to_string()))?;
    parse_mac_address(mac_str.trim()).map_err(failed)
}

/// Constructs a broadcast DHCPDISCOVER asking for `requested` options.
pub fn build_dhcp_discover(mac_addr: &[u8], xid: u32, requested: &[u8]) -> Result<Vec<u8>, ProbeError> {
    let mut msg = v4::Message::default();
    msg.set_opcode(v4::Opcode::BootRequest)
        .set_htype(v4::HType::Eth)
        .set_chaddr(mac_addr)
        .set_xid(xid)
        .set_flags(v4::Flags::default().set_broadcast());

    // Client identifier is the hardware type followed by the MAC.
    let client_id = [&[u8::from(v4::HType::Eth)][..], mac_addr].concat();

    let opts = msg.opts_mut();
    opts.insert(v4::DhcpOption::MessageType(v4::MessageType::Discover));
    opts.insert(v4::DhcpOption::ClientIdentifier(client_id));
    if !requested.is_empty() {
        opts.insert(v4::DhcpOption::ParameterRequestList(
            requested.iter().copied().map(OptionCode::from).collect(),
        ));
    }

    let mut buffer = Vec::with_capacity(300);
    msg.encode(&mut Encoder::new(&mut buffer))?;
    Ok(buffer)
}

/// Decodes `payload` and returns the offer if it is an OFFER for `xid`.
pub fn parse_offer(payload: &[u8], xid: u32) -> Result<Option<Offer>, ProbeError> {
    let msg = v4::Message::decode(&mut v4::Decoder::new(payload))?;

    if msg.xid() != xid {
        tracing::debug!("XID mismatch ({:x} != {:x}), ignoring packet", msg.xid(), xid);
        return Ok(None);
    }

    match msg.opts().get(OptionCode::MessageType) {
        Some(v4::DhcpOption::MessageType(v4::MessageType::Offer)) => {}
        other => {
            tracing::debug!("Not a DHCP OFFER message: {:?}", other);
            return Ok(None);
        }
    }

    let server_identifier = match msg.opts().get(OptionCode::ServerIdentifier) {
        Some(v4::DhcpOption::ServerIdentifier(ip)) => Some(*ip),
        _ => None,
    };

    Ok(Some(Offer {
        offered_ip: msg.yiaddr(),
        server_identifier,
    }))
}
