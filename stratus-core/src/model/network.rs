//! Network domain types and CIDR arithmetic.

use crate::error::{Result, StratusError};
use crate::model::properties::Properties;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Private L3 network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    /// Backend-assigned identifier
    pub id: String,

    /// Caller-chosen name, unique per tenant
    pub name: String,

    /// CIDR, e.g. "192.168.0.0/24"
    pub cidr: String,

    pub ip_version: IpVersion,

    /// Host acting as gateway for this network, empty if none
    pub gateway_id: String,

    /// Versioned property records
    pub properties: Properties,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpVersion {
    #[default]
    V4,
    V6,
}

/// Request to create a network.
#[derive(Debug, Clone, Default)]
pub struct NetworkRequest {
    pub name: String,
    pub cidr: String,
    pub ip_version: IpVersion,
    /// DNS servers injected into the subnet; driver default applies if empty
    pub dns_servers: Vec<String>,
}

/// An IPv4 CIDR block, kept as base address + prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    base: u32,
    prefix: u8,
}

impl Cidr {
    /// Parse "a.b.c.d/len"; the base address is masked down to the block start.
    pub fn parse(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| StratusError::invalid_request("cidr", format!("'{s}' has no prefix length")))?;
        let ip: Ipv4Addr = addr
            .parse()
            .map_err(|_| StratusError::invalid_request("cidr", format!("'{addr}' is not an IPv4 address")))?;
        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| StratusError::invalid_request("cidr", format!("'{prefix}' is not a prefix length")))?;
        let base = u32::from_be_bytes(ip.octets()) & Self::mask(prefix);
        Ok(Self { base, prefix })
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        }
    }

    pub fn contains(&self, other: &Cidr) -> bool {
        other.prefix >= self.prefix && (other.base & Self::mask(self.prefix)) == self.base
    }

    /// Whether two blocks share any address.
    pub fn intersects(&self, other: &Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// First usable host address, conventionally assigned to the gateway.
    pub fn gateway_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_masks_base_address() {
        let cidr = Cidr::parse("192.168.0.17/24").unwrap();
        assert_eq!(cidr.gateway_ip(), Ipv4Addr::new(192, 168, 0, 1));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Cidr::parse("192.168.0.0").is_err());
        assert!(Cidr::parse("not-an-ip/24").is_err());
        assert!(Cidr::parse("10.0.0.0/33").is_err());
    }

    #[test]
    fn containment_and_intersection() {
        let vpc = Cidr::parse("10.0.0.0/8").unwrap();
        let subnet = Cidr::parse("10.1.0.0/16").unwrap();
        let other = Cidr::parse("10.2.0.0/16").unwrap();
        let outside = Cidr::parse("192.168.0.0/24").unwrap();

        assert!(vpc.contains(&subnet));
        assert!(!subnet.contains(&vpc));
        assert!(vpc.intersects(&subnet));
        assert!(!subnet.intersects(&other));
        assert!(!vpc.intersects(&outside));
    }
}
