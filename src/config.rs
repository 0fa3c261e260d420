use crate::network::{DHCP_CLIENT_PORT, DHCP_SERVER_PORT};
use clap::Parser;
use std::{net::Ipv4Addr, time::Duration};

/// Subnet mask, router, domain name server, domain name.
pub const DEFAULT_PARAMETER_REQUEST_LIST: [u8; 4] = [1, 3, 6, 15];

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The network interface to probe (e.g., 'eth0', 'lo')
    #[arg(short, long)]
    pub interface: String,

    /// Local address already leased on the interface; switches to a UDP socket
    #[arg(short, long)]
    pub address: Option<Ipv4Addr>,

    /// DHCP server to address; defaults to the broadcast address
    #[arg(short, long)]
    pub server: Option<Ipv4Addr>,

    /// Seconds to wait for replies after sending
    #[arg(short, long, default_value_t = 5)]
    pub timeout_secs: u64,

    /// DHCP option codes to request, comma separated (e.g., '1,3,6,15')
    #[arg(short = 'o', long, value_delimiter = ',')]
    pub request_options: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub interface: String,
    pub local_address: Option<Ipv4Addr>,
    pub server_address: Ipv4Addr,
    pub client_port: u16,
    pub server_port: u16,
    pub reply_timeout: Duration,
    /// Option codes placed in the DISCOVER's parameter request list.
    pub parameter_request_list: Vec<u8>,
}

impl ProbeConfig {
    pub fn new(interface: String) -> Self {
        Self {
            interface,
            local_address: None,
            server_address: Ipv4Addr::BROADCAST,
            client_port: DHCP_CLIENT_PORT,
            server_port: DHCP_SERVER_PORT,
            reply_timeout: Duration::from_secs(5),
            parameter_request_list: DEFAULT_PARAMETER_REQUEST_LIST.to_vec(),
        }
    }

    /// True once an address is leased and the UDP socket can be used.
    pub fn uses_udp(&self) -> bool {
        self.local_address.is_some()
    }
}

impl From<Args> for ProbeConfig {
    fn from(args: Args) -> Self {
        let mut config = Self::new(args.interface);
        config.local_address = args.address;
        if let Some(server) = args.server {
            config.server_address = server;
        }
        config.reply_timeout = Duration::from_secs(args.timeout_secs);
        if let Some(options) = args.request_options {
            config.parameter_request_list = options;
        }
        config
    }
}
