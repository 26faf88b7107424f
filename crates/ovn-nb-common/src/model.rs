//! Entity database model.
//!
//! These are the network, subnet, port and security-group records the
//! framework hands to the driver. They mirror the entity database and are
//! never written to the northbound database directly.

use std::collections::BTreeMap;

use ovn_types::{IpAddress, IpPrefix, IpVersion, MacAddress, NetworkType, PortStatus, VnicType};
use serde::{Deserialize, Serialize};

/// Device-owner prefix for ports owned by network infrastructure.
pub const DEVICE_OWNER_NETWORK_PREFIX: &str = "network:";
/// Device owner of a router interface port.
pub const DEVICE_OWNER_ROUTER_INTF: &str = "network:router_interface";
/// Device owner of a router gateway port.
pub const DEVICE_OWNER_ROUTER_GW: &str = "network:router_gateway";

fn default_true() -> bool {
    true
}

fn default_mtu() -> u32 {
    1500
}

/// One segment of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub network_type: NetworkType,
    #[serde(default)]
    pub physical_network: Option<String>,
    #[serde(default)]
    pub segmentation_id: Option<u32>,
}

/// A tenant or provider network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default)]
    pub qos_policy_id: Option<String>,
}

impl Network {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mtu: default_mtu(),
            qos_policy_id: None,
        }
    }
}

/// IPv6 address assignment mode of a subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ipv6AddressMode {
    Slaac,
    Dhcpv6Stateful,
    Dhcpv6Stateless,
}

/// A static route pushed to DHCP clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRoute {
    pub destination: IpPrefix,
    pub nexthop: IpAddress,
}

/// An IP subnet on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub network_id: String,
    #[serde(default)]
    pub name: String,
    pub cidr: IpPrefix,
    #[serde(default)]
    pub gateway_ip: Option<IpAddress>,
    #[serde(default = "default_true")]
    pub enable_dhcp: bool,
    #[serde(default)]
    pub dns_nameservers: Vec<IpAddress>,
    #[serde(default)]
    pub host_routes: Vec<HostRoute>,
    #[serde(default)]
    pub ipv6_address_mode: Option<Ipv6AddressMode>,
}

impl Subnet {
    /// Address family of the subnet's CIDR.
    pub fn ip_version(&self) -> IpVersion {
        self.cidr.version()
    }

    pub fn is_slaac(&self) -> bool {
        self.ipv6_address_mode == Some(Ipv6AddressMode::Slaac)
    }

    pub fn is_dhcpv6_stateless(&self) -> bool {
        self.ipv6_address_mode == Some(Ipv6AddressMode::Dhcpv6Stateless)
    }
}

/// A fixed IP assignment of a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedIp {
    pub subnet_id: String,
    pub ip_address: IpAddress,
}

/// An additional MAC/IP pair a port may source traffic from.
///
/// The IP may be a bare address or a CIDR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedAddressPair {
    pub mac_address: MacAddress,
    pub ip_address: String,
}

/// A user supplied DHCP option attached to a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraDhcpOpt {
    pub opt_name: String,
    pub opt_value: String,
    #[serde(default = "default_ip_version")]
    pub ip_version: IpVersion,
}

fn default_ip_version() -> IpVersion {
    IpVersion::V4
}

/// A switch port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub network_id: String,
    pub mac_address: MacAddress,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
    #[serde(default)]
    pub status: PortStatus,
    #[serde(default)]
    pub device_owner: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub port_security_enabled: Option<bool>,
    #[serde(default)]
    pub allowed_address_pairs: Vec<AllowedAddressPair>,
    #[serde(default)]
    pub extra_dhcp_opts: Vec<ExtraDhcpOpt>,
    #[serde(default)]
    pub vnic_type: VnicType,
    /// Free-form binding profile as supplied by the API client.
    #[serde(default)]
    pub binding_profile: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub qos_policy_id: Option<String>,
}

impl Port {
    pub fn new(
        id: impl Into<String>,
        network_id: impl Into<String>,
        mac_address: MacAddress,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            network_id: network_id.into(),
            mac_address,
            fixed_ips: Vec::new(),
            security_groups: Vec::new(),
            admin_state_up: true,
            status: PortStatus::Down,
            device_owner: String::new(),
            device_id: String::new(),
            port_security_enabled: None,
            allowed_address_pairs: Vec::new(),
            extra_dhcp_opts: Vec::new(),
            vnic_type: VnicType::Normal,
            binding_profile: BTreeMap::new(),
            qos_policy_id: None,
        }
    }

    /// Ports owned by network infrastructure (routers, DHCP agents).
    pub fn is_trusted(&self) -> bool {
        self.device_owner.starts_with(DEVICE_OWNER_NETWORK_PREFIX)
    }

    pub fn is_router_port(&self) -> bool {
        self.device_owner == DEVICE_OWNER_ROUTER_INTF || self.device_owner == DEVICE_OWNER_ROUTER_GW
    }

    /// Fixed IPs of the given address family.
    pub fn fixed_ips_of(&self, version: IpVersion) -> impl Iterator<Item = &FixedIp> {
        self.fixed_ips
            .iter()
            .filter(move |ip| ip.ip_address.version() == version)
    }
}

/// Direction of a security-group rule, relative to the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    Ingress,
    Egress,
}

/// A single security-group rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    pub id: String,
    pub security_group_id: String,
    pub direction: RuleDirection,
    #[serde(default = "default_ip_version")]
    pub ethertype: IpVersion,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub port_range_min: Option<u16>,
    #[serde(default)]
    pub port_range_max: Option<u16>,
    #[serde(default)]
    pub remote_ip_prefix: Option<IpPrefix>,
    #[serde(default)]
    pub remote_group_id: Option<String>,
}

/// A security group with its rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rules: Vec<SecurityGroupRule>,
}
