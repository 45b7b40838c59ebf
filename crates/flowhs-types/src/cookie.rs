//! Rule cookie and meter identifiers.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier stamped on every rule installed for a flow path.
///
/// Install and remove requests generated for the same rule share one cookie,
/// which is what makes both operations idempotent on the switch.
///
/// # Examples
///
/// ```
/// use flowhs_types::Cookie;
///
/// let cookie = Cookie::new(0x4000_0000_0000_0001);
/// assert_eq!(cookie.to_string(), "0x4000000000000001");
/// assert_eq!("0x4000000000000001".parse::<Cookie>().unwrap(), cookie);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cookie(u64);

impl Cookie {
    /// Marks cookies belonging to the forward direction of a flow.
    pub const FORWARD_FLOW_FLAG: u64 = 0x4000_0000_0000_0000;

    /// Marks cookies belonging to the reverse direction of a flow.
    pub const REVERSE_FLOW_FLAG: u64 = 0x2000_0000_0000_0000;

    /// Creates a cookie from its raw value.
    pub const fn new(value: u64) -> Self {
        Cookie(value)
    }

    /// Builds a forward-direction cookie for the given unmasked flow effective id.
    pub const fn forward(effective_id: u64) -> Self {
        Cookie(Self::FORWARD_FLOW_FLAG | effective_id)
    }

    /// Builds a reverse-direction cookie for the given unmasked flow effective id.
    pub const fn reverse(effective_id: u64) -> Self {
        Cookie(Self::REVERSE_FLOW_FLAG | effective_id)
    }

    /// Returns the raw value.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns true if the forward direction flag is set.
    pub const fn is_forward(&self) -> bool {
        self.0 & Self::FORWARD_FLOW_FLAG != 0
    }

    /// Returns true if the reverse direction flag is set.
    pub const fn is_reverse(&self) -> bool {
        self.0 & Self::REVERSE_FLOW_FLAG != 0
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl FromStr for Cookie {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        value
            .map(Cookie)
            .map_err(|_| ParseError::InvalidCookie(s.to_string()))
    }
}

/// Meter identifier on a single switch.
///
/// Identifiers below [`MeterId::MIN_FLOW_METER_ID`] are reserved for
/// system meters and never assigned to flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MeterId(u32);

impl MeterId {
    /// Lowest meter id usable by flows.
    pub const MIN_FLOW_METER_ID: u32 = 32;

    /// Creates a flow meter id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id falls into the reserved system range.
    pub const fn new(id: u32) -> Result<Self, ParseError> {
        if id >= Self::MIN_FLOW_METER_ID {
            Ok(MeterId(id))
        } else {
            Err(ParseError::InvalidMeterId(id))
        }
    }

    /// Returns the raw value.
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for MeterId {
    type Error = ParseError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        MeterId::new(id)
    }
}

impl From<MeterId> for u32 {
    fn from(meter: MeterId) -> u32 {
        meter.0
    }
}
