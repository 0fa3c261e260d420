use crate::network::SocketError;
use dhcproto::error::{DecodeError, EncodeError};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Failures while sending a DISCOVER and collecting OFFERs.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Socket operation failed")]
    Socket(#[from] SocketError),

    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Failed to read hardware address from {}: {reason}", path.display())]
    HardwareAddress { path: PathBuf, reason: String },

    #[error("Failed to encode DHCP message")]
    Encode(#[from] EncodeError),

    #[error("Failed to decode DHCP message")]
    Decode(#[from] DecodeError),
}
