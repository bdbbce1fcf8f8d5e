//! Compile-time and per-instance configuration for the network core.
//!
//! Mirrors the C implementation's `config.h`: link-layer constants are
//! fixed by the Ethernet/ARP/IP specs, while the single interface's
//! addresses and timeouts are supplied by the embedding kernel at
//! startup via [`InterfaceConfig`].

use crate::{Ipv4Addr, MacAddr};

/// Length of a MAC address in bytes.
pub const MAC_LEN: usize = 6;

/// Length of an IPv4 address in bytes.
pub const IP_LEN: usize = 4;

/// Minimum Ethernet payload after the 14-byte header; shorter frames are
/// zero-padded on transmit.
pub const ETHERNET_MIN_TRANSPORT_UNIT: usize = 46;

/// Maximum Ethernet payload (the link MTU this core assumes).
pub const ETHERNET_MAX_TRANSPORT_UNIT: usize = 1500;

/// Default IPv4 TTL stamped on every packet this stack originates.
pub const IP_DEFAULT_TTL: u8 = 64;

/// Default ARP table entry lifetime, in seconds.
pub const DEFAULT_ARP_TIMEOUT_SEC: u64 = 3600;

/// Default ARP pending-buffer lifetime / minimum request retry interval,
/// in seconds.
pub const DEFAULT_ARP_MIN_INTERVAL_SEC: u64 = 1;

/// Per-instance configuration for the single attached interface.
///
/// The crate supports exactly one interface, per spec; there is no
/// routing table and no notion of a second link.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceConfig {
    /// The interface's own MAC address.
    pub mac: MacAddr,
    /// The interface's own IPv4 address.
    pub ip: Ipv4Addr,
    /// Link MTU in bytes (payload above the Ethernet header).
    pub mtu: u16,
    /// ARP table entry TTL, in seconds.
    pub arp_timeout_sec: u64,
    /// ARP pending-buffer TTL / request retry floor, in seconds.
    pub arp_min_interval_sec: u64,
}

impl InterfaceConfig {
    /// Build a config with the stock ARP timeouts and the standard
    /// 1500-byte MTU; only the addresses need to be supplied.
    pub fn new(mac: MacAddr, ip: Ipv4Addr) -> Self {
        InterfaceConfig {
            mac,
            ip,
            mtu: ETHERNET_MAX_TRANSPORT_UNIT as u16,
            arp_timeout_sec: DEFAULT_ARP_TIMEOUT_SEC,
            arp_min_interval_sec: DEFAULT_ARP_MIN_INTERVAL_SEC,
        }
    }
}
