//! Rows of the OVN northbound database as seen by the driver.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ovn_types::{IpPrefix, VlanTag};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Table names, used in errors and audit records.
pub mod table {
    pub const LOGICAL_SWITCH: &str = "Logical_Switch";
    pub const LOGICAL_SWITCH_PORT: &str = "Logical_Switch_Port";
    pub const ACL: &str = "ACL";
    pub const ADDRESS_SET: &str = "Address_Set";
    pub const DHCP_OPTIONS: &str = "DHCP_Options";
}

/// A logical switch. One per network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalSwitch {
    pub name: String,
    pub external_ids: BTreeMap<String, String>,
    /// Names of the ports attached to this switch.
    pub ports: BTreeSet<String>,
    pub acls: Vec<Acl>,
}

/// A logical switch port. One per entity port, plus provider-network ports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalSwitchPort {
    pub name: String,
    /// Name of the owning logical switch.
    pub lswitch: String,
    #[serde(rename = "type")]
    pub port_type: String,
    pub addresses: Vec<String>,
    pub port_security: Vec<String>,
    pub external_ids: BTreeMap<String, String>,
    pub options: BTreeMap<String, String>,
    pub parent_name: Option<String>,
    pub tag: Option<VlanTag>,
    pub enabled: Option<bool>,
    pub dhcpv4_options: Option<Uuid>,
    pub dhcpv6_options: Option<Uuid>,
}

/// Direction of an ACL relative to the logical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AclDirection {
    #[serde(rename = "from-lport")]
    FromLport,
    #[serde(rename = "to-lport")]
    ToLport,
}

impl AclDirection {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AclDirection::FromLport => "from-lport",
            AclDirection::ToLport => "to-lport",
        }
    }

    /// The port reference used in match expressions.
    pub const fn port_field(&self) -> &'static str {
        match self {
            AclDirection::FromLport => "inport",
            AclDirection::ToLport => "outport",
        }
    }
}

impl fmt::Display for AclDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AclAction {
    Allow,
    AllowRelated,
    Drop,
    Reject,
}

/// An ACL row attached to a logical switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Acl {
    /// Logical port the ACL was compiled for.
    pub lport: String,
    pub direction: AclDirection,
    pub priority: u16,
    #[serde(rename = "match")]
    pub match_expr: String,
    pub action: AclAction,
    pub log: bool,
    pub external_ids: BTreeMap<String, String>,
}

impl Acl {
    /// Two ACLs are the same rule when everything but bookkeeping matches.
    pub fn same_rule(&self, other: &Acl) -> bool {
        self.lport == other.lport
            && self.direction == other.direction
            && self.priority == other.priority
            && self.match_expr == other.match_expr
            && self.action == other.action
    }
}

/// A named set of address strings. Two per security group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSet {
    pub name: String,
    pub external_ids: BTreeMap<String, String>,
    pub addresses: BTreeSet<String>,
}

/// A DHCP options row, either shared by a subnet or owned by one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpOptions {
    pub uuid: Uuid,
    pub cidr: IpPrefix,
    pub options: BTreeMap<String, String>,
    pub external_ids: BTreeMap<String, String>,
}

impl DhcpOptions {
    pub fn subnet_id(&self) -> Option<&str> {
        self.external_ids
            .get(crate::naming::EXT_ID_SUBNET_ID)
            .map(String::as_str)
    }

    /// Port id for port-scoped rows, `None` for the shared subnet row.
    pub fn port_id(&self) -> Option<&str> {
        self.external_ids
            .get(crate::naming::EXT_ID_PORT_ID)
            .map(String::as_str)
    }
}
