//! `NetStack`: owns every layer's mutable state and exposes the
//! receive/send entry points the driver and application code call.
//!
//! The five components described in the module docs are not separate
//! Rust types with their own lifetimes — they are the state fields and
//! methods below, grouped by layer in comments. A real separation into
//! five structs would force awkward back-references (ARP needs to call
//! into Ethernet, IP needs to call into ARP, ICMP and UDP both need to
//! call into IP) for no benefit, since nothing outside `NetStack` ever
//! needs to hold a layer on its own. This mirrors the C implementation's
//! single set of global tables, just owned instead of static.

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::{debug, trace};

use crate::arp::{self, ArpPacket};
use crate::buf::Buffer;
use crate::checksum;
use crate::config::InterfaceConfig;
use crate::driver::NetDevice;
use crate::ethernet::{self, EthernetHeader};
use crate::icmp::{self, IcmpHeader};
use crate::ip::{self, Ipv4Header};
use crate::timedmap::TimedMap;
use crate::udp::{self, UdpHandler, UdpHeader};
use crate::{Ipv4Addr, MacAddr, NetError};

/// Owns the interface configuration, every layer's mutable state, and
/// the link device. Not `Clone`/`Copy` — there is exactly one of these
/// per interface, matching the spec's single-interface restriction.
pub struct NetStack<D: NetDevice> {
    config: InterfaceConfig,
    device: D,

    // ARP
    arp_table: TimedMap<Ipv4Addr, MacAddr>,
    arp_pending: TimedMap<Ipv4Addr, Buffer>,

    // IPv4
    next_ip_id: u16,

    // UDP
    udp_table: TimedMap<u16, UdpHandler>,
}

impl<D: NetDevice> NetStack<D> {
    /// Bring up the stack: build the ARP/UDP tables and send the
    /// gratuitous self-probe, mirroring the C init order
    /// (`ethernet_init` → `net_init` → `arp_init` → `ip_init` →
    /// `icmp_init` → `udp_init`). `now` is the current tick, used to
    /// timestamp the probe's pending-buffer slot (there is none — a
    /// gratuitous request carries no payload to queue).
    pub fn new(config: InterfaceConfig, device: D, now: u64) -> Self {
        let mut stack = NetStack {
            arp_table: TimedMap::new(None, Some(config.arp_timeout_sec)),
            arp_pending: TimedMap::new(None, Some(config.arp_min_interval_sec)),
            next_ip_id: 0,
            udp_table: TimedMap::new(None, None),
            config,
            device,
        };
        stack.arp_send_request(stack.config.ip, now);
        stack
    }

    /// Access to the interface configuration (own MAC/IP/MTU).
    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    // ----------------------------------------------------------------
    // Driver poll loop
    // ----------------------------------------------------------------

    /// Drain at most one frame from the driver and run it through the
    /// full ingress pipeline. `now` is the current tick, threaded into
    /// every TimedMap operation this poll triggers.
    pub fn poll(&mut self, now: u64) {
        let mut raw = [0u8; crate::buf::BUF_CAPACITY];
        let n = self.device.receive(&mut raw);
        if n == 0 {
            return;
        }
        let Ok(buf) = Buffer::from_slice(&raw[..n]) else {
            return;
        };
        self.ethernet_receive(buf, now);
    }

    // ----------------------------------------------------------------
    // Ethernet
    // ----------------------------------------------------------------

    fn ethernet_receive(&mut self, mut buf: Buffer, now: u64) {
        let Some(hdr) = EthernetHeader::parse(buf.as_slice()) else {
            trace!("ethernet: frame shorter than header, dropped");
            return;
        };
        if hdr.dst != self.config.mac && !hdr.dst.is_broadcast() {
            trace!("ethernet: frame for foreign dst {:?}, dropped", hdr.dst);
            return;
        }
        if buf.remove_header(ethernet::HEADER_LEN).is_err() {
            return;
        }
        match hdr.ethertype {
            ethernet::ETHERTYPE_ARP => self.arp_receive(buf, hdr.src, now),
            ethernet::ETHERTYPE_IPV4 => self.ipv4_receive(buf, now),
            other => trace!("ethernet: unknown ethertype {:#06x}, dropped", other),
        }
    }

    fn ethernet_send(&mut self, mut buf: Buffer, dst: MacAddr, ethertype: u16) {
        if buf.len() < crate::config::ETHERNET_MIN_TRANSPORT_UNIT {
            let pad = crate::config::ETHERNET_MIN_TRANSPORT_UNIT - buf.len();
            if buf.add_padding(pad).is_err() {
                return;
            }
        }
        if buf.add_header(ethernet::HEADER_LEN).is_err() {
            return;
        }
        let hdr = EthernetHeader {
            dst,
            src: self.config.mac,
            ethertype,
        };
        hdr.write(buf.as_mut_slice());
        let _ = self.device.transmit(buf.as_slice());
    }

    // ----------------------------------------------------------------
    // ARP
    // ----------------------------------------------------------------

    fn arp_receive(&mut self, buf: Buffer, src_mac: MacAddr, now: u64) {
        if buf.len() < arp::PACKET_LEN {
            trace!("arp: packet shorter than {} bytes, dropped", arp::PACKET_LEN);
            return;
        }
        let pkt = ArpPacket::parse(buf.as_slice()).expect("length checked above");
        if !pkt.has_valid_header() {
            trace!("arp: invalid header fields, dropped");
            return;
        }
        // Learning step: every valid packet updates the table,
        // regardless of opcode.
        let _ = self.arp_table.set(pkt.sender_ip, pkt.sender_mac, now);
        debug!("arp: learned {:?} -> {:?}", pkt.sender_ip, pkt.sender_mac);

        if let Some(pending) = self.arp_pending.get(&pkt.sender_ip, now).cloned() {
            self.arp_pending.delete(&pkt.sender_ip);
            self.ethernet_send(pending, src_mac, ethernet::ETHERTYPE_IPV4);
            return;
        }

        if pkt.opcode == arp::OP_REQUEST && pkt.target_ip == self.config.ip {
            self.arp_send_reply(pkt.sender_ip, pkt.sender_mac);
        }
    }

    fn arp_send_request(&mut self, target_ip: Ipv4Addr, _now: u64) {
        let Ok(mut buf) = Buffer::new(arp::PACKET_LEN) else {
            return;
        };
        let pkt = ArpPacket {
            hw_type: arp::HTYPE_ETHERNET,
            proto_type: arp::PTYPE_IPV4,
            hw_len: crate::config::MAC_LEN as u8,
            proto_len: crate::config::IP_LEN as u8,
            opcode: arp::OP_REQUEST,
            sender_mac: self.config.mac,
            sender_ip: self.config.ip,
            target_mac: MacAddr::new(0, 0, 0, 0, 0, 0),
            target_ip,
        };
        pkt.write(buf.as_mut_slice());
        self.ethernet_send(buf, MacAddr::BROADCAST, ethernet::ETHERTYPE_ARP);
    }

    fn arp_send_reply(&mut self, target_ip: Ipv4Addr, target_mac: MacAddr) {
        let Ok(mut buf) = Buffer::new(arp::PACKET_LEN) else {
            return;
        };
        let pkt = ArpPacket {
            hw_type: arp::HTYPE_ETHERNET,
            proto_type: arp::PTYPE_IPV4,
            hw_len: crate::config::MAC_LEN as u8,
            proto_len: crate::config::IP_LEN as u8,
            opcode: arp::OP_REPLY,
            sender_mac: self.config.mac,
            sender_ip: self.config.ip,
            target_mac,
            target_ip,
        };
        pkt.write(buf.as_mut_slice());
        self.ethernet_send(buf, target_mac, ethernet::ETHERTYPE_ARP);
    }

    /// Resolve `ip` to a MAC address and hand `buf` to Ethernet, or
    /// queue it behind an ARP request if the address isn't known yet.
    /// At most one buffer is ever queued per destination IP — a second
    /// send to an IP already being resolved is dropped, per the
    /// single-slot policy the spec freezes (see `SPEC_FULL.md` §4.2).
    fn arp_send(&mut self, buf: Buffer, ip: Ipv4Addr, now: u64) {
        if let Some(&mac) = self.arp_table.get(&ip, now) {
            self.ethernet_send(buf, mac, ethernet::ETHERTYPE_IPV4);
            return;
        }
        if self.arp_pending.contains(&ip, now) {
            trace!("arp: resolution for {:?} already in flight, dropping buffer", ip);
            return;
        }
        if self.arp_pending.set(ip, buf.clone(), now).is_err() {
            return;
        }
        self.arp_send_request(ip, now);
    }

    // ----------------------------------------------------------------
    // IPv4
    // ----------------------------------------------------------------

    fn ipv4_receive(&mut self, mut buf: Buffer, now: u64) {
        if buf.len() < ip::HEADER_LEN {
            trace!("ipv4: packet shorter than header, dropped");
            return;
        }
        let hdr = Ipv4Header::parse(buf.as_slice()).expect("length checked above");
        let header_len = hdr.header_bytes();
        if hdr.version != 4 || header_len < ip::HEADER_LEN || header_len > buf.len() || hdr.total_len as usize > buf.len() {
            trace!("ipv4: bad version, malformed ihl, or truncated datagram, dropped");
            return;
        }

        // `header_len` may exceed `ip::HEADER_LEN` when the datagram
        // carries IP options (`ihl` > 5). This stack never parses them,
        // but they are still part of the header for checksum and strip
        // purposes: only option *parsing* is a non-goal (SPEC_FULL.md
        // §4.3, §9), not accepting datagrams that carry them. The
        // checksum is verified against the real wire bytes rather than
        // `Ipv4Header::write`'s fixed 20-byte re-encoding, since the
        // struct has no representation for opaque option bytes.
        let stored_checksum = hdr.checksum;
        let mut header_bytes = Vec::from(&buf.as_slice()[..header_len]);
        header_bytes[10] = 0;
        header_bytes[11] = 0;
        if checksum::checksum16(&header_bytes) != stored_checksum {
            trace!("ipv4: header checksum mismatch, dropped");
            return;
        }

        if hdr.dst != self.config.ip {
            trace!("ipv4: foreign dst {:?}, dropped", hdr.dst);
            return;
        }

        if buf.len() > hdr.total_len as usize {
            if buf.remove_padding(buf.len() - hdr.total_len as usize).is_err() {
                return;
            }
        }

        // Kept for the "no handler" re-prepend paths below, which must
        // restore the exact header (including any options) rather than
        // `Ipv4Header::write`'s fixed 20 bytes.
        let original_header = buf.as_slice()[..header_len].to_vec();
        if buf.remove_header(header_len).is_err() {
            return;
        }

        match hdr.protocol {
            ip::PROTO_ICMP => self.icmp_receive(buf, hdr.src, now),
            ip::PROTO_UDP => self.udp_receive(buf, hdr.src, original_header, now),
            other => {
                debug!("ipv4: no handler for protocol {}, sending unreachable", other);
                if buf.add_header(header_len).is_err() {
                    return;
                }
                buf.as_mut_slice()[..header_len].copy_from_slice(&original_header);
                self.icmp_send_unreachable(&buf, hdr.src, icmp::CODE_PROTOCOL_UNREACH, now);
            }
        }
    }

    /// Allocate the next monotonically increasing IPv4 identification
    /// value; wraps on overflow, which is harmless (see spec §4.3).
    fn next_ip_id(&mut self) -> u16 {
        let id = self.next_ip_id;
        self.next_ip_id = self.next_ip_id.wrapping_add(1);
        id
    }

    fn ipv4_send_fragment(&mut self, mut buf: Buffer, dst: Ipv4Addr, protocol: u8, id: u16, frag_offset: u16, more_fragments: bool, now: u64) {
        if buf.add_header(ip::HEADER_LEN).is_err() {
            return;
        }
        let mut hdr = Ipv4Header {
            version: 4,
            ihl: (ip::HEADER_LEN / 4) as u8,
            tos: 0,
            total_len: buf.len() as u16,
            id,
            more_fragments,
            frag_offset,
            ttl: crate::config::IP_DEFAULT_TTL,
            protocol,
            checksum: 0,
            src: self.config.ip,
            dst,
        };
        hdr.write(buf.as_mut_slice());
        hdr.checksum = checksum::checksum16(&buf.as_slice()[..ip::HEADER_LEN]);
        hdr.write(buf.as_mut_slice());
        self.arp_send(buf, dst, now);
    }

    /// Send `buf` to `dst` over IPv4, fragmenting if it doesn't fit in
    /// one packet. See spec §4.3 for the offset/MF bookkeeping.
    fn ipv4_send(&mut self, buf: Buffer, dst: Ipv4Addr, protocol: u8, now: u64) {
        let max_payload = self.config.mtu as usize - ip::HEADER_LEN;
        if buf.len() <= max_payload {
            let id = self.next_ip_id();
            self.ipv4_send_fragment(buf, dst, protocol, id, 0, false, now);
            return;
        }

        let fragment_size = (max_payload / 8) * 8;
        let id = self.next_ip_id();
        let payload = buf.as_slice();
        let mut offset_bytes = 0usize;
        while offset_bytes < payload.len() {
            let chunk_len = core::cmp::min(fragment_size, payload.len() - offset_bytes);
            let Ok(fragment) = Buffer::from_slice(&payload[offset_bytes..offset_bytes + chunk_len]) else {
                return;
            };
            let more = offset_bytes + chunk_len < payload.len();
            self.ipv4_send_fragment(fragment, dst, protocol, id, (offset_bytes / 8) as u16, more, now);
            offset_bytes += chunk_len;
        }
    }

    // ----------------------------------------------------------------
    // ICMP
    // ----------------------------------------------------------------

    fn icmp_receive(&mut self, buf: Buffer, src_ip: Ipv4Addr, now: u64) {
        if buf.len() < icmp::HEADER_LEN {
            trace!("icmp: packet shorter than header, dropped");
            return;
        }
        let hdr = IcmpHeader::parse(buf.as_slice()).expect("length checked above");
        if hdr.icmp_type != icmp::TYPE_ECHO_REQUEST {
            trace!("icmp: ignoring type {}", hdr.icmp_type);
            return;
        }
        let Ok(mut reply) = Buffer::from_slice(buf.as_slice()) else {
            return;
        };
        reply.as_mut_slice()[0] = icmp::TYPE_ECHO_REPLY;
        reply.as_mut_slice()[2..4].copy_from_slice(&[0, 0]);
        let sum = checksum::checksum16(reply.as_slice());
        reply.as_mut_slice()[2..4].copy_from_slice(&sum.to_be_bytes());
        self.ipv4_send(reply, src_ip, ip::PROTO_ICMP, now);
    }

    fn icmp_send_unreachable(&mut self, recv_buf: &Buffer, src_ip: Ipv4Addr, code: u8, now: u64) {
        let copy_len = core::cmp::min(ip::HEADER_LEN + 8, recv_buf.len());
        let Ok(mut out) = Buffer::new(icmp::HEADER_LEN + copy_len) else {
            return;
        };
        {
            let bytes = out.as_mut_slice();
            bytes[icmp::HEADER_LEN..].copy_from_slice(&recv_buf.as_slice()[..copy_len]);
        }
        let mut hdr = IcmpHeader {
            icmp_type: icmp::TYPE_DEST_UNREACH,
            code,
            checksum: 0,
            id: 0,
            seq: 0,
        };
        hdr.write(out.as_mut_slice());
        hdr.checksum = checksum::checksum16(out.as_slice());
        hdr.write(out.as_mut_slice());
        self.ipv4_send(out, src_ip, ip::PROTO_ICMP, now);
    }

    // ----------------------------------------------------------------
    // UDP
    // ----------------------------------------------------------------

    fn udp_receive(&mut self, mut buf: Buffer, src_ip: Ipv4Addr, original_header: Vec<u8>, now: u64) {
        if buf.len() < udp::HEADER_LEN {
            trace!("udp: packet shorter than header, dropped");
            return;
        }
        let mut hdr = UdpHeader::parse(buf.as_slice()).expect("length checked above");
        if hdr.total_len as usize > buf.len() {
            trace!("udp: total_len exceeds buffer, dropped");
            return;
        }

        if hdr.checksum != 0 {
            let stored = hdr.checksum;
            hdr.checksum = 0;
            hdr.write(buf.as_mut_slice());
            let computed = checksum::transport_checksum(ip::PROTO_UDP, buf.as_slice(), src_ip, self.config.ip);
            if computed != stored {
                trace!("udp: checksum mismatch, dropped");
                return;
            }
            hdr.checksum = stored;
            hdr.write(buf.as_mut_slice());
        }

        let dst_port = hdr.dst_port;
        let src_port = hdr.src_port;

        if self.udp_table.get(&dst_port, now).is_some() {
            if buf.remove_header(udp::HEADER_LEN).is_err() {
                return;
            }
            if let Some(handler) = self.udp_table.get_mut(&dst_port, now) {
                handler(buf.as_slice(), src_ip, src_port);
            }
            return;
        }

        debug!("udp: no handler on port {}, sending unreachable", dst_port);
        let header_len = original_header.len();
        if buf.add_header(header_len).is_err() {
            return;
        }
        buf.as_mut_slice()[..header_len].copy_from_slice(&original_header);
        self.icmp_send_unreachable(&buf, src_ip, icmp::CODE_PORT_UNREACH, now);
    }

    fn udp_send(&mut self, buf: Buffer, src_port: u16, dst_ip: Ipv4Addr, dst_port: u16, now: u64) {
        let mut buf = buf;
        if buf.add_header(udp::HEADER_LEN).is_err() {
            return;
        }
        let mut hdr = UdpHeader {
            src_port,
            dst_port,
            total_len: buf.len() as u16,
            checksum: 0,
        };
        hdr.write(buf.as_mut_slice());
        let sum = checksum::transport_checksum(ip::PROTO_UDP, buf.as_slice(), self.config.ip, dst_ip);
        hdr.checksum = sum;
        hdr.write(buf.as_mut_slice());
        self.ipv4_send(buf, dst_ip, ip::PROTO_UDP, now);
    }

    /// Register `handler` on `port`. Fails with
    /// [`NetError::PortInUse`] if a handler is already registered.
    pub fn udp_open(&mut self, port: u16, handler: impl FnMut(&[u8], Ipv4Addr, u16) + Send + 'static, now: u64) -> Result<(), NetError> {
        if self.udp_table.get(&port, now).is_some() {
            return Err(NetError::PortInUse);
        }
        self.udp_table.set(port, Box::new(handler), now)
    }

    /// Remove any handler registered on `port`.
    pub fn udp_close(&mut self, port: u16) {
        self.udp_table.delete(&port);
    }

    /// Build a UDP datagram from `data` and send it to `dst_ip:dst_port`.
    pub fn udp_send_to(&mut self, data: &[u8], src_port: u16, dst_ip: Ipv4Addr, dst_port: u16, now: u64) {
        let Ok(buf) = Buffer::from_slice(data) else {
            return;
        };
        self.udp_send(buf, src_port, dst_ip, dst_port, now);
    }
}
