//! Projection of an entity port onto logical switch port columns.

use std::collections::{BTreeMap, BTreeSet};

use ovn_nb_common::model::Port;
use ovn_types::VlanTag;

use crate::dhcp::PortDhcpOptions;
use crate::profile::{BindingProfile, VTEP_LOGICAL_SWITCH, VTEP_PHYSICAL_SWITCH};

/// Port type of a VTEP gateway port.
pub const LSP_TYPE_VTEP: &str = "vtep";
/// Address that makes OVN flood unknown destinations to the port.
pub const UNKNOWN_ADDR: &str = "unknown";

/// Logical switch port columns computed for one operation.
///
/// Built fresh from the port every time and consumed by the transaction
/// that writes the port; never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct OvnPortInfo {
    pub port_type: String,
    pub options: BTreeMap<String, String>,
    pub addresses: Vec<String>,
    pub port_security: Vec<String>,
    pub parent_name: Option<String>,
    pub tag: Option<VlanTag>,
    pub dhcpv4_options: PortDhcpOptions,
    pub dhcpv6_options: PortDhcpOptions,
}

impl OvnPortInfo {
    /// Computes the columns for `port`. DHCP references start disabled and
    /// are filled in with [`with_dhcp`](Self::with_dhcp).
    pub fn new(
        port: &Port,
        profile: &BindingProfile,
        qos_options: BTreeMap<String, String>,
        port_security_enabled: bool,
    ) -> Self {
        match profile {
            BindingProfile::VtepGateway {
                physical_switch,
                logical_switch,
            } => Self {
                port_type: LSP_TYPE_VTEP.to_string(),
                options: BTreeMap::from([
                    (VTEP_PHYSICAL_SWITCH.to_string(), physical_switch.clone()),
                    (VTEP_LOGICAL_SWITCH.to_string(), logical_switch.clone()),
                ]),
                addresses: vec![UNKNOWN_ADDR.to_string()],
                port_security: Vec::new(),
                parent_name: None,
                tag: None,
                dhcpv4_options: PortDhcpOptions::Disabled,
                dhcpv6_options: PortDhcpOptions::Disabled,
            },
            _ => Self {
                port_type: String::new(),
                options: qos_options,
                addresses: vec![port_addresses(port)],
                port_security: allowed_addresses(port, port_security_enabled),
                parent_name: profile.parent_name().map(str::to_string),
                tag: match profile {
                    BindingProfile::SubInterface { tag, .. } => Some(*tag),
                    _ => None,
                },
                dhcpv4_options: PortDhcpOptions::Disabled,
                dhcpv6_options: PortDhcpOptions::Disabled,
            },
        }
    }

    pub fn with_dhcp(mut self, v4: PortDhcpOptions, v6: PortDhcpOptions) -> Self {
        self.dhcpv4_options = v4;
        self.dhcpv6_options = v6;
        self
    }
}

/// Whether port security applies to `port`.
pub fn port_security_enabled(port: &Port, default: bool) -> bool {
    port.port_security_enabled.unwrap_or(default)
}

/// `"<mac> <ip> <ip> ..."` over the port's fixed IPs.
pub fn port_addresses(port: &Port) -> String {
    let mut addresses = port.mac_address.to_string();
    for ip in &port.fixed_ips {
        addresses.push(' ');
        addresses.push_str(&ip.ip_address.to_string());
    }
    addresses
}

/// Port-security entries of a port.
///
/// Allowed address pairs with the port's own MAC extend the port's main
/// entry; pairs with another MAC get an entry each. Trusted ports and ports
/// without port security get none.
pub fn allowed_addresses(port: &Port, port_security_enabled: bool) -> Vec<String> {
    if !port_security_enabled || port.is_trusted() {
        return Vec::new();
    }

    let mut entries = BTreeSet::new();
    let mut own = port_addresses(port);
    for pair in &port.allowed_address_pairs {
        if pair.mac_address == port.mac_address {
            own.push(' ');
            own.push_str(&pair.ip_address);
        } else {
            entries.insert(format!("{} {}", pair.mac_address, pair.ip_address));
        }
    }
    entries.insert(own);
    entries.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovn_nb_common::model::{AllowedAddressPair, FixedIp, DEVICE_OWNER_ROUTER_INTF};
    use pretty_assertions::assert_eq;

    fn port() -> Port {
        let mut port = Port::new("p1", "n1", "fa:16:3e:11:22:33".parse().unwrap());
        port.fixed_ips = vec![
            FixedIp {
                subnet_id: "s4".into(),
                ip_address: "10.0.0.5".parse().unwrap(),
            },
            FixedIp {
                subnet_id: "s6".into(),
                ip_address: "2001:db8::5".parse().unwrap(),
            },
        ];
        port
    }

    #[test]
    fn test_plain_port() {
        let info = OvnPortInfo::new(&port(), &BindingProfile::Plain, BTreeMap::new(), true);
        assert_eq!(info.port_type, "");
        assert_eq!(info.addresses, vec!["fa:16:3e:11:22:33 10.0.0.5 2001:db8::5".to_string()]);
        assert_eq!(info.port_security, info.addresses);
        assert_eq!(info.parent_name, None);
        assert_eq!(info.tag, None);
    }

    #[test]
    fn test_sub_interface_port() {
        let profile = BindingProfile::SubInterface {
            parent_name: "p0".to_string(),
            tag: VlanTag::new(42).unwrap(),
        };
        let qos = BTreeMap::from([("qos_max_rate".to_string(), "1000".to_string())]);
        let info = OvnPortInfo::new(&port(), &profile, qos.clone(), true);
        assert_eq!(info.port_type, "");
        assert_eq!(info.parent_name.as_deref(), Some("p0"));
        assert_eq!(info.tag, Some(VlanTag::new(42).unwrap()));
        assert_eq!(info.options, qos);
    }

    #[test]
    fn test_vtep_port() {
        let profile = BindingProfile::VtepGateway {
            physical_switch: "psw".to_string(),
            logical_switch: "lsw".to_string(),
        };
        let info = OvnPortInfo::new(&port(), &profile, BTreeMap::new(), true);
        assert_eq!(info.port_type, "vtep");
        assert_eq!(info.addresses, vec!["unknown".to_string()]);
        assert!(info.port_security.is_empty());
        assert_eq!(info.parent_name, None);
        assert_eq!(info.tag, None);
        assert_eq!(info.options["vtep-physical-switch"], "psw");
        assert_eq!(info.options["vtep-logical-switch"], "lsw");
    }

    #[test]
    fn test_allowed_address_pairs() {
        let mut p = port();
        p.allowed_address_pairs = vec![
            AllowedAddressPair {
                mac_address: p.mac_address,
                ip_address: "10.0.0.100".to_string(),
            },
            AllowedAddressPair {
                mac_address: "fa:16:3e:aa:bb:cc".parse().unwrap(),
                ip_address: "10.0.0.0/24".to_string(),
            },
        ];
        assert_eq!(
            allowed_addresses(&p, true),
            vec![
                "fa:16:3e:11:22:33 10.0.0.5 2001:db8::5 10.0.0.100".to_string(),
                "fa:16:3e:aa:bb:cc 10.0.0.0/24".to_string(),
            ]
        );
    }

    #[test]
    fn test_exempt_ports_have_no_port_security() {
        let mut p = port();
        assert!(allowed_addresses(&p, false).is_empty());

        p.device_owner = DEVICE_OWNER_ROUTER_INTF.to_string();
        assert!(allowed_addresses(&p, true).is_empty());
    }

    #[test]
    fn test_port_security_default() {
        let mut p = port();
        assert!(port_security_enabled(&p, true));
        p.port_security_enabled = Some(false);
        assert!(!port_security_enabled(&p, true));
    }
}
