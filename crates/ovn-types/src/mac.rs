//! MAC address type with safe parsing, formatting and random generation.

use crate::ParseError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet MAC address.
///
/// Always rendered in lowercase colon form, which is the form the OVN
/// northbound database stores in `addresses` and `port_security`.
///
/// # Examples
///
/// ```
/// use ovn_types::MacAddress;
///
/// let mac: MacAddress = "FA:16:3E:00:00:01".parse().unwrap();
/// assert_eq!(mac.to_string(), "fa:16:3e:00:00:01");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The zero/null MAC address (00:00:00:00:00:00).
    pub const ZERO: MacAddress = MacAddress([0, 0, 0, 0, 0, 0]);

    /// Creates a new MAC address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    /// Returns the raw bytes of the MAC address.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns true if this is a multicast address.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Generates a random address under `base`.
    ///
    /// The first three octets of `base` (the OUI) are kept. The fourth octet
    /// is kept when it is non-zero in `base`, otherwise it is randomized
    /// together with the last two.
    pub fn random_with_base<R: Rng + ?Sized>(base: &MacAddress, rng: &mut R) -> Self {
        let mut bytes = base.0;
        if bytes[3] == 0 {
            bytes[3] = rng.gen();
        }
        bytes[4] = rng.gen();
        bytes[5] = rng.gen();
        MacAddress(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let separator = if s.contains(':') { ':' } else { '-' };

        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(ParseError::InvalidMacAddress(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || part.len() > 2 {
                return Err(ParseError::InvalidMacAddress(s.to_string()));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseError::InvalidMacAddress(s.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_is_case_insensitive() {
        let upper: MacAddress = "FA:16:3E:AA:BB:CC".parse().unwrap();
        let lower: MacAddress = "fa:16:3e:aa:bb:cc".parse().unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.to_string(), "fa:16:3e:aa:bb:cc");
    }

    #[test]
    fn test_parse_hyphen_format() {
        let mac: MacAddress = "00-11-22-33-44-55".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn test_invalid_format() {
        assert!("invalid".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44".parse::<MacAddress>().is_err());
        assert!("gg:11:22:33:44:55".parse::<MacAddress>().is_err());
        assert!("000:11:22:33:44:55".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_random_keeps_oui() {
        let base: MacAddress = "fa:16:3e:00:00:00".parse().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..16 {
            let mac = MacAddress::random_with_base(&base, &mut rng);
            assert_eq!(&mac.as_bytes()[..3], &[0xfa, 0x16, 0x3e]);
        }
    }

    #[test]
    fn test_random_keeps_nonzero_fourth_octet() {
        let base: MacAddress = "fa:16:3e:4f:00:00".parse().unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let mac = MacAddress::random_with_base(&base, &mut rng);
        assert_eq!(mac.as_bytes()[3], 0x4f);
    }

    #[test]
    fn test_serde_as_string() {
        let mac: MacAddress = "fa:16:3e:00:00:01".parse().unwrap();
        let s: String = mac.into();
        assert_eq!(s, "fa:16:3e:00:00:01");
        assert!(MacAddress::try_from("nope".to_string()).is_err());
    }
}
