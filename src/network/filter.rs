//! Classic BPF programs for raw DHCP sockets
//!
//! The kernel runs the attached program against every frame that reaches a
//! packet socket and only queues the frame when the verdict is non-zero.
//! Offsets are relative to the start of the data a cooked (`SOCK_DGRAM`)
//! packet socket sees: the link header is already gone, the IPv4 header
//! starts at offset 0 and the UDP header follows a 20 byte IPv4 header.

use super::{frame, DHCP_CLIENT_PORT};

// Instruction classes, sizes, modes and sources from `linux/filter.h`.
const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_W: u16 = 0x00;
const BPF_H: u16 = 0x08;
const BPF_B: u16 = 0x10;
const BPF_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

/// Offset of the protocol field inside the IPv4 header.
pub const IP_PROTOCOL_OFFSET: u32 = 9;
/// Offset of the UDP destination port, assuming an IPv4 header without options.
pub const UDP_DEST_PORT_OFFSET: u32 = frame::IPV4_HEADER_LEN as u32 + 2;

/// Verdict that drops the frame.
pub const DROP: u32 = 0;
/// Verdict that keeps up to this many bytes of the frame, i.e. all of it.
pub const ACCEPT_ALL: u32 = 65535;

/// One classic BPF instruction, laid out like `struct sock_filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

impl Instruction {
    pub const fn stmt(code: u16, k: u32) -> Self {
        Self { code, jt: 0, jf: 0, k }
    }

    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }

    /// `A <- frame[offset]`
    pub const fn load_byte(offset: u32) -> Self {
        Self::stmt(BPF_LD | BPF_B | BPF_ABS, offset)
    }

    /// `A <- ntohs(frame[offset..offset + 2])`
    pub const fn load_half(offset: u32) -> Self {
        Self::stmt(BPF_LD | BPF_H | BPF_ABS, offset)
    }

    /// Skip `jt` instructions when `A == k`, otherwise skip `jf`.
    pub const fn jump_if_equal(k: u32, jt: u8, jf: u8) -> Self {
        Self::jump(BPF_JMP | BPF_JEQ | BPF_K, k, jt, jf)
    }

    pub const fn ret(verdict: u32) -> Self {
        Self::stmt(BPF_RET | BPF_K, verdict)
    }
}

#[cfg(target_os = "linux")]
impl From<Instruction> for libc::sock_filter {
    fn from(insn: Instruction) -> Self {
        libc::sock_filter {
            code: insn.code,
            jt: insn.jt,
            jf: insn.jf,
            k: insn.k,
        }
    }
}

/// An immutable classic BPF program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterProgram {
    instructions: Box<[Instruction]>,
}

impl FilterProgram {
    pub fn new(instructions: impl Into<Box<[Instruction]>>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The program in the form `SO_ATTACH_FILTER` expects.
    #[cfg(target_os = "linux")]
    pub fn to_sock_filters(&self) -> Vec<libc::sock_filter> {
        self.instructions.iter().copied().map(Into::into).collect()
    }

    /// Runs the program against `packet` and returns the verdict.
    ///
    /// Only the instructions this module emits are understood (absolute
    /// loads, `jeq #k` and `ret #k`); anything else, a load past the end of
    /// the packet, or running off the end of the program drops the packet,
    /// as the kernel does.
    pub fn evaluate(&self, packet: &[u8]) -> u32 {
        let mut acc: u32 = 0;
        let mut pc = 0usize;

        while let Some(insn) = self.instructions.get(pc) {
            pc += 1;
            match insn.code {
                c if c == BPF_LD | BPF_B | BPF_ABS => match load(packet, insn.k, 1) {
                    Some(v) => acc = v,
                    None => return DROP,
                },
                c if c == BPF_LD | BPF_H | BPF_ABS => match load(packet, insn.k, 2) {
                    Some(v) => acc = v,
                    None => return DROP,
                },
                c if c == BPF_LD | BPF_W | BPF_ABS => match load(packet, insn.k, 4) {
                    Some(v) => acc = v,
                    None => return DROP,
                },
                c if c == BPF_JMP | BPF_JEQ | BPF_K => {
                    pc += usize::from(if acc == insn.k { insn.jt } else { insn.jf });
                }
                c if c == BPF_RET | BPF_K => return insn.k,
                _ => return DROP,
            }
        }

        DROP
    }
}

fn load(packet: &[u8], offset: u32, size: usize) -> Option<u32> {
    let start = usize::try_from(offset).ok()?;
    let bytes = packet.get(start..start.checked_add(size)?)?;
    Some(bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
}

/// Builds the two-stage filter: IPv4 protocol must be `protocol`, then the
/// UDP destination port must be `port`; matching frames are kept whole.
pub fn udp_port_filter(protocol: u8, port: u16) -> FilterProgram {
    FilterProgram::new([
        Instruction::load_byte(IP_PROTOCOL_OFFSET),
        Instruction::jump_if_equal(u32::from(protocol), 1, 0),
        Instruction::ret(DROP),
        Instruction::load_half(UDP_DEST_PORT_OFFSET),
        Instruction::jump_if_equal(u32::from(port), 1, 0),
        Instruction::ret(DROP),
        Instruction::ret(ACCEPT_ALL),
    ])
}

/// The filter attached to every raw DHCP client socket.
pub fn dhcp_client_filter() -> FilterProgram {
    udp_port_filter(libc::IPPROTO_UDP as u8, DHCP_CLIENT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::frame::{build_ipv4_frame, build_udp_frame};
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn udp_to(port: u16) -> bytes::Bytes {
        build_udp_frame(
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 1), 67),
            SocketAddrV4::new(Ipv4Addr::BROADCAST, port),
            b"payload",
        )
        .unwrap()
    }

    #[test]
    fn test_dhcp_client_filter_layout() {
        let program = dhcp_client_filter();

        assert_eq!(program.len(), 7);
        assert_eq!(program.instructions()[0], Instruction::stmt(0x30, 9));
        assert_eq!(program.instructions()[1], Instruction::jump(0x15, 17, 1, 0));
        assert_eq!(program.instructions()[2], Instruction::stmt(0x06, 0));
        assert_eq!(program.instructions()[3], Instruction::stmt(0x28, 22));
        assert_eq!(program.instructions()[4], Instruction::jump(0x15, 68, 1, 0));
        assert_eq!(program.instructions()[5], Instruction::stmt(0x06, 0));
        assert_eq!(program.instructions()[6], Instruction::stmt(0x06, 65535));
    }

    #[test]
    fn test_filter_is_deterministic() {
        assert_eq!(dhcp_client_filter(), dhcp_client_filter());
        assert_eq!(
            udp_port_filter(17, 68),
            udp_port_filter(libc::IPPROTO_UDP as u8, DHCP_CLIENT_PORT)
        );
        assert_ne!(udp_port_filter(17, 67), dhcp_client_filter());
    }

    #[test]
    fn test_filter_accepts_dhcp_client_traffic() {
        assert_eq!(dhcp_client_filter().evaluate(&udp_to(68)), ACCEPT_ALL);
    }

    #[test]
    fn test_filter_drops_other_udp_ports() {
        let program = dhcp_client_filter();

        assert_eq!(program.evaluate(&udp_to(67)), DROP);
        assert_eq!(program.evaluate(&udp_to(53)), DROP);
        assert_eq!(program.evaluate(&udp_to(68 << 8)), DROP);
    }

    #[test]
    fn test_filter_drops_non_udp() {
        // A TCP segment whose destination port field also reads 68.
        let mut tcp = [0u8; 20];
        tcp[2..4].copy_from_slice(&68u16.to_be_bytes());
        let frame = build_ipv4_frame(
            libc::IPPROTO_TCP as u8,
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            &tcp,
        )
        .unwrap();

        assert_eq!(dhcp_client_filter().evaluate(&frame), DROP);
    }

    #[test]
    fn test_filter_drops_truncated_frames() {
        let frame = udp_to(68);
        let program = dhcp_client_filter();

        assert_eq!(program.evaluate(&[]), DROP);
        assert_eq!(program.evaluate(&frame[..10]), DROP);
        assert_eq!(program.evaluate(&frame[..23]), DROP);
        assert_eq!(program.evaluate(&frame[..24]), ACCEPT_ALL);
    }

    #[test]
    fn test_evaluate_unknown_opcode_drops() {
        let program = FilterProgram::new(vec![Instruction::stmt(0x07, 0)]);
        assert_eq!(program.evaluate(&[0u8; 64]), DROP);
        assert_eq!(FilterProgram::new(Vec::new()).evaluate(&[0u8; 64]), DROP);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_sock_filter_conversion() {
        let filters = dhcp_client_filter().to_sock_filters();

        assert_eq!(filters.len(), 7);
        assert_eq!(filters[4].code, 0x15);
        assert_eq!(filters[4].jt, 1);
        assert_eq!(filters[4].jf, 0);
        assert_eq!(filters[4].k, 68);
    }
}
