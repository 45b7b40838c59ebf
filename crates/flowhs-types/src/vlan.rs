//! VLAN identifiers and tag stacks.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// IEEE 802.1Q VLAN identifier (1-4094) matched or pushed on flow endpoints.
///
/// An untagged endpoint is `Option<VlanId>::None`, never VLAN 0.
///
/// # Examples
///
/// ```
/// use flowhs_types::VlanId;
///
/// assert_eq!(VlanId::new(100).unwrap().as_u16(), 100);
/// assert!(VlanId::new(0).is_err());
/// assert!(VlanId::new(4095).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    pub const MIN: u16 = 1;
    pub const MAX: u16 = 4094;

    /// Creates a VLAN id, rejecting the reserved values 0 and 4095+.
    pub const fn new(id: u16) -> Result<Self, ParseError> {
        if id >= Self::MIN && id <= Self::MAX {
            Ok(VlanId(id))
        } else {
            Err(ParseError::InvalidVlanId(id))
        }
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Builds the tag stack (outermost first) for an outer/inner VLAN pair.
    ///
    /// An inner tag without an outer tag is ignored, matching how switches
    /// treat a single-tagged packet.
    pub fn stack(outer: Option<VlanId>, inner: Option<VlanId>) -> Vec<VlanId> {
        match (outer, inner) {
            (Some(outer), Some(inner)) => vec![outer, inner],
            (Some(outer), None) => vec![outer],
            (None, _) => Vec::new(),
        }
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vlan(id: u16) -> VlanId {
        VlanId::new(id).unwrap()
    }

    #[test]
    fn test_range() {
        assert!(VlanId::new(1).is_ok());
        assert!(VlanId::new(4094).is_ok());
        assert_eq!(VlanId::new(0), Err(ParseError::InvalidVlanId(0)));
    }

    #[test]
    fn test_stack() {
        assert_eq!(VlanId::stack(Some(vlan(10)), Some(vlan(20))), vec![vlan(10), vlan(20)]);
        assert_eq!(VlanId::stack(Some(vlan(10)), None), vec![vlan(10)]);
        assert!(VlanId::stack(None, Some(vlan(20))).is_empty());
    }
}
