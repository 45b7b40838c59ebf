//! Switch (datapath) identifier with safe parsing and formatting.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 64-bit OpenFlow datapath identifier.
///
/// # Examples
///
/// ```
/// use flowhs_types::SwitchId;
///
/// let sw: SwitchId = "00:00:00:00:00:00:00:0a".parse().unwrap();
/// assert_eq!(sw.as_u64(), 10);
/// assert_eq!(sw.to_string(), "00:00:00:00:00:00:00:0a");
///
/// // Bare hex is accepted too
/// let sw2: SwitchId = "0x0a".parse().unwrap();
/// assert_eq!(sw, sw2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SwitchId(u64);

impl SwitchId {
    /// Creates a switch id from its numeric datapath value.
    pub const fn new(dpid: u64) -> Self {
        SwitchId(dpid)
    }

    /// Returns the numeric datapath value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the raw bytes, most significant first.
    pub const fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl FromStr for SwitchId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidSwitchId(s.to_string());

        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u64::from_str_radix(hex, 16).map(SwitchId).map_err(|_| invalid());
        }

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 8 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 8];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(invalid());
            }
            bytes[i] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        Ok(SwitchId(u64::from_be_bytes(bytes)))
    }
}

impl TryFrom<String> for SwitchId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SwitchId> for String {
    fn from(sw: SwitchId) -> String {
        sw.to_string()
    }
}

impl From<u64> for SwitchId {
    fn from(dpid: u64) -> Self {
        SwitchId(dpid)
    }
}

/// Physical or logical port number on a switch.
pub type PortNumber = u32;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_colon_format() {
        let sw: SwitchId = "00:00:00:00:00:00:01:02".parse().unwrap();
        assert_eq!(sw.as_u64(), 0x0102);
    }

    #[test]
    fn test_parse_hex_format() {
        let sw: SwitchId = "0xff".parse().unwrap();
        assert_eq!(sw, SwitchId::new(255));
    }

    #[test]
    fn test_display() {
        let sw = SwitchId::new(0xaabb_ccdd_eeff_0011);
        assert_eq!(sw.to_string(), "aa:bb:cc:dd:ee:ff:00:11");
    }

    #[test]
    fn test_serde_uses_string_form() {
        let sw = SwitchId::new(1);
        let json = serde_json::to_string(&sw).unwrap();
        assert_eq!(json, "\"00:00:00:00:00:00:00:01\"");
        let back: SwitchId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sw);
    }

    #[test]
    fn test_invalid_format() {
        assert!("invalid".parse::<SwitchId>().is_err());
        assert!("00:00:00:00:00:00:01".parse::<SwitchId>().is_err());
        assert!("00:00:00:00:00:00:00:01:02".parse::<SwitchId>().is_err());
        assert!("gg:00:00:00:00:00:00:01".parse::<SwitchId>().is_err());
        assert!("0xzz".parse::<SwitchId>().is_err());
    }
}
