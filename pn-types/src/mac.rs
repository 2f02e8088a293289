//! Ethernet MAC address newtype.

use std::fmt;

/// A 6-byte Ethernet MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DeviceMac(pub [u8; 6]);

impl DeviceMac {
    /// The Ethernet broadcast address `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: DeviceMac = DeviceMac([0xff; 6]);

    /// Build from six octets.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets, network byte order (as transmitted on the wire).
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for DeviceMac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl std::str::FromStr for DeviceMac {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(format!("invalid MAC address: {s}"));
        }
        for (i, p) in parts.iter().enumerate() {
            octets[i] = u8::from_str_radix(p, 16).map_err(|_| format!("invalid MAC address: {s}"))?;
        }
        Ok(DeviceMac(octets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let mac = DeviceMac::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        let text = mac.to_string();
        assert_eq!(text, "02:00:00:00:00:01");
        let parsed: DeviceMac = text.parse().unwrap();
        assert_eq!(parsed, mac);
    }
}
