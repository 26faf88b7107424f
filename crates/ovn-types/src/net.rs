//! Network and port attribute enums.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Network segment type.
///
/// Unknown types are preserved verbatim in [`NetworkType::Other`] so that
/// segments created before type validation existed can still be inspected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkType {
    Local,
    Flat,
    Geneve,
    Vlan,
    Vxlan,
    Gre,
    Other(String),
}

impl NetworkType {
    /// Types a logical switch can be built for.
    pub const SUPPORTED: [NetworkType; 4] = [
        NetworkType::Local,
        NetworkType::Flat,
        NetworkType::Geneve,
        NetworkType::Vlan,
    ];

    /// Returns true for local, flat, geneve and vlan.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            NetworkType::Local | NetworkType::Flat | NetworkType::Geneve | NetworkType::Vlan
        )
    }

    /// Returns true for the types that require a physical network (flat, vlan).
    pub fn is_provider(&self) -> bool {
        matches!(self, NetworkType::Flat | NetworkType::Vlan)
    }

    pub fn as_str(&self) -> &str {
        match self {
            NetworkType::Local => "local",
            NetworkType::Flat => "flat",
            NetworkType::Geneve => "geneve",
            NetworkType::Vlan => "vlan",
            NetworkType::Vxlan => "vxlan",
            NetworkType::Gre => "gre",
            NetworkType::Other(s) => s,
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "local" => NetworkType::Local,
            "flat" => NetworkType::Flat,
            "geneve" => NetworkType::Geneve,
            "vlan" => NetworkType::Vlan,
            "vxlan" => NetworkType::Vxlan,
            "gre" => NetworkType::Gre,
            other => NetworkType::Other(other.to_string()),
        })
    }
}

impl From<String> for NetworkType {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }
}

impl From<NetworkType> for String {
    fn from(t: NetworkType) -> String {
        t.as_str().to_string()
    }
}

/// VNIC type requested for a port binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VnicType {
    #[default]
    Normal,
    Direct,
    Macvtap,
    Baremetal,
    DirectPhysical,
    Other(String),
}

impl VnicType {
    pub fn as_str(&self) -> &str {
        match self {
            VnicType::Normal => "normal",
            VnicType::Direct => "direct",
            VnicType::Macvtap => "macvtap",
            VnicType::Baremetal => "baremetal",
            VnicType::DirectPhysical => "direct-physical",
            VnicType::Other(s) => s,
        }
    }
}

impl fmt::Display for VnicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for VnicType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "normal" => VnicType::Normal,
            "direct" => VnicType::Direct,
            "macvtap" => VnicType::Macvtap,
            "baremetal" => VnicType::Baremetal,
            "direct-physical" => VnicType::DirectPhysical,
            _ => VnicType::Other(s),
        }
    }
}

impl From<VnicType> for String {
    fn from(v: VnicType) -> String {
        v.as_str().to_string()
    }
}

/// Operational status of a port as recorded in the entity database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortStatus {
    Active,
    #[default]
    Down,
    Build,
    Error,
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortStatus::Active => "ACTIVE",
            PortStatus::Down => "DOWN",
            PortStatus::Build => "BUILD",
            PortStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

impl FromStr for PortStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(PortStatus::Active),
            "DOWN" => Ok(PortStatus::Down),
            "BUILD" => Ok(PortStatus::Build),
            "ERROR" => Ok(PortStatus::Error),
            _ => Err(ParseError::InvalidPortStatus(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_supported_network_types() {
        for t in NetworkType::SUPPORTED.iter() {
            assert!(t.is_supported());
        }
        assert!(!NetworkType::Vxlan.is_supported());
        assert!(!NetworkType::from("opflex".to_string()).is_supported());
    }

    #[test]
    fn test_unknown_network_type_round_trips() {
        let t = NetworkType::from("opflex".to_string());
        assert_eq!(t, NetworkType::Other("opflex".to_string()));
        assert_eq!(t.to_string(), "opflex");
    }

    #[test]
    fn test_provider_types() {
        assert!(NetworkType::Flat.is_provider());
        assert!(NetworkType::Vlan.is_provider());
        assert!(!NetworkType::Geneve.is_provider());
    }

    #[test]
    fn test_vnic_type_default() {
        assert_eq!(VnicType::default(), VnicType::Normal);
        assert_eq!(VnicType::from("direct".to_string()), VnicType::Direct);
    }

    #[test]
    fn test_port_status_parse() {
        assert_eq!("active".parse::<PortStatus>().unwrap(), PortStatus::Active);
        assert_eq!(PortStatus::Down.to_string(), "DOWN");
        assert!("sideways".parse::<PortStatus>().is_err());
    }
}
