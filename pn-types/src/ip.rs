//! Typed IPv4 address. There is exactly one representation
//! (`std::net::Ipv4Addr`, i.e. four octets in transmission order) and all
//! arithmetic goes through explicit, named conversions instead of raw
//! `u32` manipulation, so host-order and network-order values can never
//! be mixed up at a call site.

use std::fmt;
use std::net::Ipv4Addr;

/// An IPv4 address belonging to a PROFINET device or the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DeviceIp(Ipv4Addr);

impl DeviceIp {
    /// Wrap an [`Ipv4Addr`].
    pub const fn new(addr: Ipv4Addr) -> Self {
        Self(addr)
    }

    /// The underlying [`Ipv4Addr`].
    pub fn addr(&self) -> Ipv4Addr {
        self.0
    }

    /// The address as a big-endian (network order) `u32`, matching its
    /// wire representation.
    pub fn to_be_u32(&self) -> u32 {
        u32::from_be_bytes(self.0.octets())
    }

    /// Build from a big-endian (network order) `u32`.
    pub fn from_be_u32(v: u32) -> Self {
        Self(Ipv4Addr::from(v.to_be_bytes()))
    }

    /// Derive a controller IP on the same /24 as this device: `.1` on the
    /// device's /24. Operates on the explicit big-endian representation so
    /// there is no ambiguity about byte order.
    pub fn derive_controller_ip(&self) -> DeviceIp {
        let be = self.to_be_u32();
        let network = be & 0xFFFF_FF00;
        DeviceIp::from_be_u32(network | 1)
    }

    /// True if `other` is on the same /24 as this address.
    pub fn same_subnet24(&self, other: &DeviceIp) -> bool {
        (self.to_be_u32() & 0xFFFF_FF00) == (other.to_be_u32() & 0xFFFF_FF00)
    }
}

impl fmt::Display for DeviceIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceIp {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DeviceIp(s.parse()?))
    }
}

impl From<Ipv4Addr> for DeviceIp {
    fn from(value: Ipv4Addr) -> Self {
        DeviceIp(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_dot_one_on_same_slash_24() {
        let device: DeviceIp = "192.168.1.100".parse().unwrap();
        let controller = device.derive_controller_ip();
        assert_eq!(controller.to_string(), "192.168.1.1");
        assert!(device.same_subnet24(&controller));
    }

    #[test]
    fn be_u32_round_trips() {
        let device: DeviceIp = "10.0.0.42".parse().unwrap();
        let be = device.to_be_u32();
        assert_eq!(DeviceIp::from_be_u32(be), device);
    }
}
