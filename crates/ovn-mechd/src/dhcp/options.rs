//! DHCP option synthesis.
//!
//! Option names and value formats are the ones `ovn-northd` understands in
//! the `DHCP_Options.options` column: plain strings for scalars and
//! `{a, b}` for lists.

use std::collections::BTreeMap;

use ovn_nb_common::model::{Network, Port, Subnet};
use ovn_nb_common::naming::EXT_ID_SUBNET_ID;
use ovn_types::{IpAddress, IpPrefix, IpVersion, MacAddress};

use crate::config::OvnMechConfig;

pub const SERVER_ID: &str = "server_id";
pub const SERVER_MAC: &str = "server_mac";
pub const LEASE_TIME: &str = "lease_time";
pub const MTU: &str = "mtu";
pub const ROUTER: &str = "router";
pub const DNS_SERVER: &str = "dns_server";
pub const CLASSLESS_STATIC_ROUTE: &str = "classless_static_route";
pub const DHCPV6_STATELESS: &str = "dhcpv6_stateless";

/// Extra DHCP option that turns DHCP off for one port and family.
pub const DHCP_DISABLED: &str = "dhcp_disabled";

const SUPPORTED_DHCPV4_OPTS: [&str; 19] = [
    "netmask",
    "router",
    "dns-server",
    "log-server",
    "lpr-server",
    "swap-server",
    "ip-forward-enable",
    "policy-filter",
    "default-ttl",
    "mtu",
    "router-discovery",
    "router-solicitation",
    "arp-timeout",
    "ethernet-encap",
    "tcp-ttl",
    "tcp-keepalive",
    "nis-server",
    "ntp-server",
    "tftp-server",
];

const SUPPORTED_DHCPV6_OPTS: [&str; 3] = ["server-id", "dns-server", "domain-search"];

/// Contents of a subnet's DHCP options row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOptionsSpec {
    pub cidr: IpPrefix,
    pub options: BTreeMap<String, String>,
    pub external_ids: BTreeMap<String, String>,
}

/// Computes the shared row for `subnet`.
///
/// `server_mac` is the DHCPv4 `server_mac` or DHCPv6 `server_id` to keep;
/// a fresh one under the configured base MAC is drawn when it is `None`.
/// The options are empty when DHCP is disabled on the subnet.
pub fn subnet_dhcp_options(
    subnet: &Subnet,
    network: &Network,
    config: &OvnMechConfig,
    server_mac: Option<&str>,
) -> DhcpOptionsSpec {
    let options = if !subnet.enable_dhcp {
        BTreeMap::new()
    } else {
        match subnet.ip_version() {
            IpVersion::V4 => dhcpv4_options(subnet, network, config, server_mac),
            IpVersion::V6 => dhcpv6_options(subnet, config, server_mac),
        }
    };
    DhcpOptionsSpec {
        cidr: subnet.cidr,
        options,
        external_ids: BTreeMap::from([(EXT_ID_SUBNET_ID.to_string(), subnet.id.clone())]),
    }
}

/// DHCPv4 options. Empty for a subnet without a gateway.
pub fn dhcpv4_options(
    subnet: &Subnet,
    network: &Network,
    config: &OvnMechConfig,
    server_mac: Option<&str>,
) -> BTreeMap<String, String> {
    let Some(gateway) = subnet.gateway_ip else {
        return BTreeMap::new();
    };

    let mut options = BTreeMap::from([
        (SERVER_ID.to_string(), gateway.to_string()),
        (LEASE_TIME.to_string(), config.dhcp_default_lease_time.to_string()),
        (MTU.to_string(), network.mtu.to_string()),
        (ROUTER.to_string(), gateway.to_string()),
        (SERVER_MAC.to_string(), server_mac_or_random(server_mac, config)),
    ]);
    if let Some(dns) = dns_servers(subnet, config) {
        options.insert(DNS_SERVER.to_string(), dns);
    }
    if let Some(routes) = classless_static_routes(subnet, &gateway) {
        options.insert(CLASSLESS_STATIC_ROUTE.to_string(), routes);
    }
    options
}

/// DHCPv6 options.
pub fn dhcpv6_options(
    subnet: &Subnet,
    config: &OvnMechConfig,
    server_id: Option<&str>,
) -> BTreeMap<String, String> {
    let mut options = BTreeMap::from([(
        SERVER_ID.to_string(),
        server_mac_or_random(server_id, config),
    )]);
    if let Some(dns) = dns_servers(subnet, config) {
        options.insert(DNS_SERVER.to_string(), dns);
    }
    if subnet.is_dhcpv6_stateless() {
        options.insert(DHCPV6_STATELESS.to_string(), "true".to_string());
    }
    options
}

/// The `classless_static_route` value for a subnet with host routes.
///
/// Clients ignore the `router` option once option 121 is present, so the
/// default route through the gateway is appended.
pub fn classless_static_routes(subnet: &Subnet, gateway: &IpAddress) -> Option<String> {
    if subnet.host_routes.is_empty() {
        return None;
    }
    let mut routes = String::from("{");
    for route in &subnet.host_routes {
        routes.push_str(&format!("{},{}, ", route.destination, route.nexthop));
    }
    routes.push_str(&format!("0.0.0.0/0,{gateway}}}"));
    Some(routes)
}

fn dns_servers(subnet: &Subnet, config: &OvnMechConfig) -> Option<String> {
    let servers: &[IpAddress] = if subnet.dns_nameservers.is_empty() {
        &config.dns_servers
    } else {
        &subnet.dns_nameservers
    };
    let servers: Vec<String> = servers
        .iter()
        .filter(|ip| ip.version() == subnet.ip_version())
        .map(IpAddress::to_string)
        .collect();
    if servers.is_empty() {
        None
    } else {
        Some(format!("{{{}}}", servers.join(", ")))
    }
}

fn server_mac_or_random(existing: Option<&str>, config: &OvnMechConfig) -> String {
    match existing {
        Some(mac) => mac.to_string(),
        None => MacAddress::random_with_base(&config.base_mac, &mut rand::thread_rng()).to_string(),
    }
}

/// DHCP settings a port asks for through its extra DHCP options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LspDhcpOpts {
    /// DHCP is off for the port in this family.
    pub disabled: bool,
    /// Supported extra options, keyed by their northbound name.
    pub options: BTreeMap<String, String>,
}

/// Reads the port's extra DHCP options for `version`.
///
/// Ports owned by network infrastructure never get DHCP. Unsupported
/// option names are ignored.
pub fn lsp_dhcp_opts(port: &Port, version: IpVersion) -> LspDhcpOpts {
    if port.is_trusted() {
        return LspDhcpOpts {
            disabled: true,
            options: BTreeMap::new(),
        };
    }

    let supported: &[&str] = match version {
        IpVersion::V4 => &SUPPORTED_DHCPV4_OPTS,
        IpVersion::V6 => &SUPPORTED_DHCPV6_OPTS,
    };
    let mut opts = LspDhcpOpts::default();
    for edo in port.extra_dhcp_opts.iter().filter(|o| o.ip_version == version) {
        if edo.opt_name == DHCP_DISABLED {
            if matches!(edo.opt_value.as_str(), "True" | "true") {
                return LspDhcpOpts {
                    disabled: true,
                    options: BTreeMap::new(),
                };
            }
            continue;
        }
        if supported.contains(&edo.opt_name.as_str()) {
            opts.options
                .insert(edo.opt_name.replace('-', "_"), edo.opt_value.clone());
        }
    }
    opts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovn_nb_common::model::{ExtraDhcpOpt, HostRoute, Ipv6AddressMode};
    use pretty_assertions::assert_eq;

    fn subnet_v4() -> Subnet {
        Subnet {
            id: "s1".to_string(),
            network_id: "n1".to_string(),
            name: "sub".to_string(),
            cidr: "192.168.1.0/24".parse().unwrap(),
            gateway_ip: Some("192.168.1.1".parse().unwrap()),
            enable_dhcp: true,
            dns_nameservers: vec!["8.8.8.8".parse().unwrap(), "8.8.4.4".parse().unwrap()],
            host_routes: Vec::new(),
            ipv6_address_mode: None,
        }
    }

    fn subnet_v6(mode: Option<Ipv6AddressMode>) -> Subnet {
        Subnet {
            id: "s6".to_string(),
            network_id: "n1".to_string(),
            name: String::new(),
            cidr: "2001:db8::/64".parse().unwrap(),
            gateway_ip: Some("2001:db8::1".parse().unwrap()),
            enable_dhcp: true,
            dns_nameservers: Vec::new(),
            host_routes: Vec::new(),
            ipv6_address_mode: mode,
        }
    }

    #[test]
    fn test_dhcpv4_options() {
        let mut network = Network::new("n1", "net");
        network.mtu = 1442;
        let options = dhcpv4_options(
            &subnet_v4(),
            &network,
            &OvnMechConfig::default(),
            Some("fa:16:3e:00:00:10"),
        );
        assert_eq!(options[SERVER_ID], "192.168.1.1");
        assert_eq!(options[ROUTER], "192.168.1.1");
        assert_eq!(options[LEASE_TIME], "43200");
        assert_eq!(options[MTU], "1442");
        assert_eq!(options[SERVER_MAC], "fa:16:3e:00:00:10");
        assert_eq!(options[DNS_SERVER], "{8.8.8.8, 8.8.4.4}");
        assert!(!options.contains_key(CLASSLESS_STATIC_ROUTE));
    }

    #[test]
    fn test_dhcpv4_without_gateway_is_empty() {
        let mut subnet = subnet_v4();
        subnet.gateway_ip = None;
        let options = dhcpv4_options(
            &subnet,
            &Network::new("n1", "net"),
            &OvnMechConfig::default(),
            None,
        );
        assert!(options.is_empty());
    }

    #[test]
    fn test_random_server_mac_keeps_base_prefix() {
        let options = dhcpv4_options(
            &subnet_v4(),
            &Network::new("n1", "net"),
            &OvnMechConfig::default(),
            None,
        );
        assert!(options[SERVER_MAC].starts_with("fa:16:3e:"));
    }

    #[test]
    fn test_classless_static_route_appends_default() {
        let mut subnet = subnet_v4();
        subnet.host_routes = vec![HostRoute {
            destination: "192.168.50.0/24".parse().unwrap(),
            nexthop: "192.168.1.1".parse().unwrap(),
        }];
        let gateway = subnet.gateway_ip.unwrap();
        assert_eq!(
            classless_static_routes(&subnet, &gateway).as_deref(),
            Some("{192.168.50.0/24,192.168.1.1, 0.0.0.0/0,192.168.1.1}")
        );
    }

    #[test]
    fn test_dns_falls_back_to_config() {
        let mut subnet = subnet_v4();
        subnet.dns_nameservers.clear();
        let config = OvnMechConfig {
            dns_servers: vec!["10.10.10.10".parse().unwrap(), "2001:4860::8888".parse().unwrap()],
            ..Default::default()
        };
        let options = dhcpv4_options(&subnet, &Network::new("n1", "net"), &config, None);
        assert_eq!(options[DNS_SERVER], "{10.10.10.10}");
    }

    #[test]
    fn test_dhcpv6_stateless_flag() {
        let config = OvnMechConfig::default();
        let stateless = dhcpv6_options(
            &subnet_v6(Some(Ipv6AddressMode::Dhcpv6Stateless)),
            &config,
            Some("fa:16:3e:00:00:20"),
        );
        assert_eq!(stateless[SERVER_ID], "fa:16:3e:00:00:20");
        assert_eq!(stateless[DHCPV6_STATELESS], "true");

        let stateful = dhcpv6_options(&subnet_v6(Some(Ipv6AddressMode::Dhcpv6Stateful)), &config, None);
        assert!(!stateful.contains_key(DHCPV6_STATELESS));
    }

    #[test]
    fn test_subnet_dhcp_options_disabled() {
        let mut subnet = subnet_v4();
        subnet.enable_dhcp = false;
        let spec = subnet_dhcp_options(
            &subnet,
            &Network::new("n1", "net"),
            &OvnMechConfig::default(),
            None,
        );
        assert!(spec.options.is_empty());
        assert_eq!(spec.external_ids[EXT_ID_SUBNET_ID], "s1");
        assert_eq!(spec.cidr.to_string(), "192.168.1.0/24");
    }

    fn edo(name: &str, value: &str, version: IpVersion) -> ExtraDhcpOpt {
        ExtraDhcpOpt {
            opt_name: name.to_string(),
            opt_value: value.to_string(),
            ip_version: version,
        }
    }

    #[test]
    fn test_lsp_dhcp_opts() {
        let mut port = Port::new("p1", "n1", "fa:16:3e:00:00:01".parse().unwrap());
        port.extra_dhcp_opts = vec![
            edo("mtu", "9000", IpVersion::V4),
            edo("ntp-server", "10.0.0.2", IpVersion::V4),
            edo("bootfile-name", "pxe", IpVersion::V4),
            edo("domain-search", "example.org", IpVersion::V6),
        ];

        let v4 = lsp_dhcp_opts(&port, IpVersion::V4);
        assert!(!v4.disabled);
        assert_eq!(
            v4.options,
            BTreeMap::from([
                ("mtu".to_string(), "9000".to_string()),
                ("ntp_server".to_string(), "10.0.0.2".to_string()),
            ])
        );

        let v6 = lsp_dhcp_opts(&port, IpVersion::V6);
        assert_eq!(v6.options["domain_search"], "example.org");
    }

    #[test]
    fn test_lsp_dhcp_disabled() {
        let mut port = Port::new("p1", "n1", "fa:16:3e:00:00:01".parse().unwrap());
        port.extra_dhcp_opts = vec![
            edo("mtu", "9000", IpVersion::V4),
            edo(DHCP_DISABLED, "True", IpVersion::V4),
        ];
        assert!(lsp_dhcp_opts(&port, IpVersion::V4).disabled);
        assert!(!lsp_dhcp_opts(&port, IpVersion::V6).disabled);

        let mut dhcp_port = Port::new("p2", "n1", "fa:16:3e:00:00:02".parse().unwrap());
        dhcp_port.device_owner = "network:dhcp".to_string();
        assert!(lsp_dhcp_opts(&dhcp_port, IpVersion::V4).disabled);
    }
}
