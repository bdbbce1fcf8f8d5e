//! ARP (RFC 826) wire format. The resolve-and-queue state machine
//! lives on [`crate::stack::NetStack`] — this module only knows how to
//! read and write the 28-byte packet.

use crate::{Ipv4Addr, MacAddr};

/// Size of an ARP packet body (no padding).
pub const PACKET_LEN: usize = 28;

/// `hw_type` for Ethernet.
pub const HTYPE_ETHERNET: u16 = 1;
/// `proto_type` for IPv4.
pub const PTYPE_IPV4: u16 = 0x0800;
/// ARP request opcode.
pub const OP_REQUEST: u16 = 1;
/// ARP reply opcode.
pub const OP_REPLY: u16 = 2;

/// A parsed ARP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub hw_type: u16,
    pub proto_type: u16,
    pub hw_len: u8,
    pub proto_len: u8,
    pub opcode: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Parse a packet, returning `None` if `bytes` is shorter than
    /// [`PACKET_LEN`].
    pub fn parse(bytes: &[u8]) -> Option<ArpPacket> {
        if bytes.len() < PACKET_LEN {
            return None;
        }
        Some(ArpPacket {
            hw_type: u16::from_be_bytes([bytes[0], bytes[1]]),
            proto_type: u16::from_be_bytes([bytes[2], bytes[3]]),
            hw_len: bytes[4],
            proto_len: bytes[5],
            opcode: u16::from_be_bytes([bytes[6], bytes[7]]),
            sender_mac: MacAddr::from_bytes(&bytes[8..14]),
            sender_ip: Ipv4Addr::from_bytes(&bytes[14..18]),
            target_mac: MacAddr::from_bytes(&bytes[18..24]),
            target_ip: Ipv4Addr::from_bytes(&bytes[24..28]),
        })
    }

    /// Write this packet into the first [`PACKET_LEN`] bytes of `out`.
    pub fn write(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.hw_type.to_be_bytes());
        out[2..4].copy_from_slice(&self.proto_type.to_be_bytes());
        out[4] = self.hw_len;
        out[5] = self.proto_len;
        out[6..8].copy_from_slice(&self.opcode.to_be_bytes());
        out[8..14].copy_from_slice(&self.sender_mac.0);
        out[14..18].copy_from_slice(&self.sender_ip.0);
        out[18..24].copy_from_slice(&self.target_mac.0);
        out[24..28].copy_from_slice(&self.target_ip.0);
    }

    /// Whether the fixed header fields (hardware/protocol type and
    /// length, opcode) describe an Ethernet/IPv4 request or reply.
    /// Packets failing this check are dropped unconditionally.
    pub fn has_valid_header(&self) -> bool {
        self.hw_type == HTYPE_ETHERNET
            && self.proto_type == PTYPE_IPV4
            && self.hw_len == crate::config::MAC_LEN as u8
            && self.proto_len == crate::config::IP_LEN as u8
            && (self.opcode == OP_REQUEST || self.opcode == OP_REPLY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_short_input() {
        assert_eq!(ArpPacket::parse(&[0u8; PACKET_LEN - 1]), None);
    }

    #[test]
    fn write_then_parse_round_trips() {
        let pkt = ArpPacket {
            hw_type: HTYPE_ETHERNET,
            proto_type: PTYPE_IPV4,
            hw_len: 6,
            proto_len: 4,
            opcode: OP_REQUEST,
            sender_mac: MacAddr::new(0, 1, 2, 3, 4, 5),
            sender_ip: Ipv4Addr::new(10, 0, 0, 1),
            target_mac: MacAddr::new(0, 0, 0, 0, 0, 0),
            target_ip: Ipv4Addr::new(10, 0, 0, 2),
        };
        let mut bytes = [0u8; PACKET_LEN];
        pkt.write(&mut bytes);
        assert_eq!(ArpPacket::parse(&bytes), Some(pkt));
        assert!(pkt.has_valid_header());
    }

    #[test]
    fn wrong_hw_len_is_invalid() {
        let mut pkt = ArpPacket {
            hw_type: HTYPE_ETHERNET,
            proto_type: PTYPE_IPV4,
            hw_len: 6,
            proto_len: 4,
            opcode: OP_REPLY,
            sender_mac: MacAddr::new(0, 1, 2, 3, 4, 5),
            sender_ip: Ipv4Addr::new(10, 0, 0, 1),
            target_mac: MacAddr::new(6, 7, 8, 9, 10, 11),
            target_ip: Ipv4Addr::new(10, 0, 0, 2),
        };
        pkt.hw_len = 8;
        assert!(!pkt.has_valid_header());
    }
}
