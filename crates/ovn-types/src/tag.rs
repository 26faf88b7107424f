//! 802.1Q tag type with validation.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// VLAN tag carried by a sub-interface or a provider-network port.
///
/// Unlike a switch VLAN id, 0 and 4095 are accepted: the tag is passed to the
/// northbound `tag` column as-is and the full 12-bit range is valid there.
///
/// ```
/// use ovn_types::VlanTag;
///
/// assert!(VlanTag::new(4095).is_ok());
/// assert!(VlanTag::new(4096).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u16")]
pub struct VlanTag(u16);

impl VlanTag {
    /// Maximum valid tag.
    pub const MAX: u16 = 4095;

    /// Creates a new tag, rejecting values outside 0..=4095.
    pub const fn new(tag: i64) -> Result<Self, ParseError> {
        if tag >= 0 && tag <= Self::MAX as i64 {
            Ok(VlanTag(tag as u16))
        } else {
            Err(ParseError::InvalidVlanTag(tag))
        }
    }

    /// Returns the tag as a u16.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for VlanTag {
    type Error = ParseError;

    fn try_from(tag: i64) -> Result<Self, Self::Error> {
        VlanTag::new(tag)
    }
}

impl From<VlanTag> for u16 {
    fn from(tag: VlanTag) -> u16 {
        tag.0
    }
}
