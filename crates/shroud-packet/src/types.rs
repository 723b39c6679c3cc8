//! One-byte enum fields of the packet header

use crate::PacketError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Transport protocol of the tunneled payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Protocol {
    /// ICMP
    Icmp = 0,
    /// ARP
    Arp = 1,
    /// DNS
    Dns = 2,
    /// TCP
    Tcp = 3,
    /// UDP
    Udp = 4,
}

impl Protocol {
    /// Every defined protocol, in wire-value order
    pub const ALL: [Protocol; 5] = [
        Protocol::Icmp,
        Protocol::Arp,
        Protocol::Dns,
        Protocol::Tcp,
        Protocol::Udp,
    ];

    /// Lowercase protocol name
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Icmp => "icmp",
            Protocol::Arp => "arp",
            Protocol::Dns => "dns",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl TryFrom<u8> for Protocol {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Protocol::ALL
            .get(value as usize)
            .copied()
            .ok_or(PacketError::InvalidEnumValue {
                field: "protocol",
                value,
            })
    }
}

impl From<Protocol> for u8 {
    fn from(p: Protocol) -> Self {
        p as u8
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address family tag; decides whether an address takes 4 or 16 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AddressType {
    /// 4-byte IPv4 address
    Ipv4 = 0,
    /// 16-byte IPv6 address
    Ipv6 = 1,
}

impl AddressType {
    /// Address family of `addr`
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressType::Ipv4,
            IpAddr::V6(_) => AddressType::Ipv6,
        }
    }

    /// Encoded address width in bytes
    pub const fn address_len(self) -> usize {
        match self {
            AddressType::Ipv4 => 4,
            AddressType::Ipv6 => 16,
        }
    }

    /// Lowercase family name
    pub const fn as_str(self) -> &'static str {
        match self {
            AddressType::Ipv4 => "ipv4",
            AddressType::Ipv6 => "ipv6",
        }
    }
}

impl TryFrom<u8> for AddressType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AddressType::Ipv4),
            1 => Ok(AddressType::Ipv6),
            value => Err(PacketError::InvalidEnumValue {
                field: "address type",
                value,
            }),
        }
    }
}

impl From<AddressType> for u8 {
    fn from(t: AddressType) -> Self {
        t as u8
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
