//! DHCP options row selection and maintenance.

use ovn_nb_common::naming::EXT_ID_PORT_ID;
use ovn_nb_common::rows::DhcpOptions;
use ovn_nb_common::{DhcpOptionsRef, NbCommand, NbResult, NbStore, Transaction};
use ovn_nb_common::model::Port;
use ovn_types::IpVersion;
use uuid::Uuid;

use super::options::{lsp_dhcp_opts, DhcpOptionsSpec, DHCPV6_STATELESS, SERVER_ID, SERVER_MAC};

/// DHCP options a port should reference for one address family.
#[derive(Debug, Clone, PartialEq)]
pub enum PortDhcpOptions {
    /// No DHCP for the port in this family.
    Disabled,
    /// The subnet's shared row.
    Shared(Uuid),
    /// A row owned by the port. The command must run in the same
    /// transaction as the port write so the row is never orphaned.
    PortSpecific(NbCommand),
}

impl PortDhcpOptions {
    /// Queues the pending row, if any, and returns the reference to store
    /// on the logical switch port.
    pub fn into_ref<S: NbStore + ?Sized>(
        self,
        txn: &mut Transaction<'_, S>,
    ) -> Option<DhcpOptionsRef> {
        match self {
            PortDhcpOptions::Disabled => None,
            PortDhcpOptions::Shared(uuid) => Some(DhcpOptionsRef::Existing(uuid)),
            PortDhcpOptions::PortSpecific(command) => {
                Some(DhcpOptionsRef::Pending(txn.add(command)))
            }
        }
    }
}

/// Resolves the DHCP options of `port` for `version`.
///
/// Ports without extra options share their subnet's row. Ports with extra
/// options get their own row: the subnet options overlaid with the port's,
/// tagged with the port id.
pub fn port_dhcp_options(
    nb: &dyn NbStore,
    port: &Port,
    version: IpVersion,
) -> NbResult<PortDhcpOptions> {
    let lsp_opts = lsp_dhcp_opts(port, version);
    if lsp_opts.disabled {
        return Ok(PortDhcpOptions::Disabled);
    }

    // Subnets with DHCP disabled have no usable row.
    let Some(row) = subnet_dhcp_options_for_port(nb, port, version)? else {
        return Ok(PortDhcpOptions::Disabled);
    };

    if lsp_opts.options.is_empty() {
        return Ok(PortDhcpOptions::Shared(row.uuid));
    }

    let subnet_id = row.subnet_id().unwrap_or_default().to_string();
    let mut options = row.options;
    options.extend(lsp_opts.options);
    let mut external_ids = row.external_ids;
    external_ids.insert(EXT_ID_PORT_ID.to_string(), port.id.clone());
    Ok(PortDhcpOptions::PortSpecific(NbCommand::AddDhcpOptions {
        subnet_id,
        port_id: Some(port.id.clone()),
        cidr: row.cidr,
        options,
        external_ids,
    }))
}

/// The shared subnet row serving the port's addresses of `version`.
///
/// For IPv6 a stateful subnet wins over a stateless one so the port can
/// still get an address.
fn subnet_dhcp_options_for_port(
    nb: &dyn NbStore,
    port: &Port,
    version: IpVersion,
) -> NbResult<Option<DhcpOptions>> {
    let subnet_ids: Vec<String> = port
        .fixed_ips_of(version)
        .map(|ip| ip.subnet_id.clone())
        .collect();
    let mut rows: Vec<DhcpOptions> = nb
        .get_subnets_dhcp_options(&subnet_ids)?
        .into_iter()
        .filter(|row| !row.options.is_empty())
        .collect();

    if version == IpVersion::V6 {
        let stateful = rows
            .iter()
            .position(|row| row.options.get(DHCPV6_STATELESS).map(String::as_str) != Some("true"));
        if let Some(idx) = stateful {
            return Ok(Some(rows.swap_remove(idx)));
        }
    }
    Ok(rows.into_iter().next())
}

/// Server MAC (v4) or server id (v6) of an existing subnet row, kept across
/// refreshes so clients do not see a new DHCP server.
pub fn existing_server_mac(row: Option<&DhcpOptions>) -> Option<&str> {
    let row = row?;
    let key = match row.cidr.version() {
        IpVersion::V4 => SERVER_MAC,
        IpVersion::V6 => SERVER_ID,
    };
    row.options.get(key).map(String::as_str)
}

/// Commands that write the subnet's shared row and bring its port-scoped
/// rows in line with it.
///
/// Each port row keeps the options in which it differs from `old_row` (its
/// own extras) on top of the new subnet options. With no subnet options
/// left, the port rows are deleted.
pub fn compose_subnet_commands(
    nb: &dyn NbStore,
    subnet_id: &str,
    spec: &DhcpOptionsSpec,
    old_row: Option<&DhcpOptions>,
) -> NbResult<Vec<NbCommand>> {
    let mut commands = vec![NbCommand::AddDhcpOptions {
        subnet_id: subnet_id.to_string(),
        port_id: None,
        cidr: spec.cidr,
        options: spec.options.clone(),
        external_ids: spec.external_ids.clone(),
    }];

    for row in nb.get_port_dhcp_options_for_subnet(subnet_id)? {
        let Some(port_id) = row.port_id() else {
            continue;
        };
        if spec.options.is_empty() {
            commands.push(NbCommand::DeleteDhcpOptions {
                uuid: row.uuid,
                if_exists: true,
            });
            continue;
        }

        let mut options = spec.options.clone();
        for (key, value) in &row.options {
            let inherited = old_row.is_some_and(|old| old.options.get(key) == Some(value));
            if !inherited {
                options.insert(key.clone(), value.clone());
            }
        }
        let mut external_ids = spec.external_ids.clone();
        external_ids.insert(EXT_ID_PORT_ID.to_string(), port_id.to_string());
        commands.push(NbCommand::AddDhcpOptions {
            subnet_id: subnet_id.to_string(),
            port_id: Some(port_id.to_string()),
            cidr: spec.cidr,
            options,
            external_ids,
        });
    }
    Ok(commands)
}

/// Commands that delete every DHCP options row of a subnet.
pub fn delete_subnet_commands(nb: &dyn NbStore, subnet_id: &str) -> NbResult<Vec<NbCommand>> {
    let mut commands = Vec::new();
    if let Some(row) = nb.get_subnet_dhcp_options(subnet_id)? {
        commands.push(NbCommand::DeleteDhcpOptions {
            uuid: row.uuid,
            if_exists: true,
        });
    }
    for row in nb.get_port_dhcp_options_for_subnet(subnet_id)? {
        commands.push(NbCommand::DeleteDhcpOptions {
            uuid: row.uuid,
            if_exists: true,
        });
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use ovn_nb_common::model::{ExtraDhcpOpt, FixedIp};
    use ovn_nb_common::naming::EXT_ID_SUBNET_ID;
    use ovn_nb_common::{MemoryNb, NbStoreExt};
    use pretty_assertions::assert_eq;

    fn opts(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn seed(nb: &MemoryNb, subnet_id: &str, cidr: &str, options: BTreeMap<String, String>) {
        let mut txn = nb.transaction(true);
        txn.add(NbCommand::AddDhcpOptions {
            subnet_id: subnet_id.to_string(),
            port_id: None,
            cidr: cidr.parse().unwrap(),
            options,
            external_ids: BTreeMap::from([(EXT_ID_SUBNET_ID.to_string(), subnet_id.to_string())]),
        });
        txn.commit().await.unwrap();
    }

    fn port(fixed_ips: &[(&str, &str)]) -> Port {
        let mut port = Port::new("p1", "n1", "fa:16:3e:00:00:01".parse().unwrap());
        port.fixed_ips = fixed_ips
            .iter()
            .map(|(subnet, ip)| FixedIp {
                subnet_id: subnet.to_string(),
                ip_address: ip.parse().unwrap(),
            })
            .collect();
        port
    }

    #[tokio::test]
    async fn test_shared_row_without_extras() {
        let nb = MemoryNb::new();
        seed(&nb, "s1", "10.0.0.0/24", opts(&[("router", "10.0.0.1")])).await;
        let row = nb.get_subnet_dhcp_options("s1").unwrap().unwrap();

        let resolved = port_dhcp_options(&nb, &port(&[("s1", "10.0.0.5")]), IpVersion::V4).unwrap();
        assert_eq!(resolved, PortDhcpOptions::Shared(row.uuid));

        let resolved = port_dhcp_options(&nb, &port(&[("s1", "10.0.0.5")]), IpVersion::V6).unwrap();
        assert_eq!(resolved, PortDhcpOptions::Disabled);
    }

    #[tokio::test]
    async fn test_extras_create_port_row_command() {
        let nb = MemoryNb::new();
        seed(&nb, "s1", "10.0.0.0/24", opts(&[("router", "10.0.0.1"), ("mtu", "1500")])).await;

        let mut p = port(&[("s1", "10.0.0.5")]);
        p.extra_dhcp_opts = vec![ExtraDhcpOpt {
            opt_name: "mtu".to_string(),
            opt_value: "9000".to_string(),
            ip_version: IpVersion::V4,
        }];
        match port_dhcp_options(&nb, &p, IpVersion::V4).unwrap() {
            PortDhcpOptions::PortSpecific(NbCommand::AddDhcpOptions {
                subnet_id,
                port_id,
                options,
                external_ids,
                ..
            }) => {
                assert_eq!(subnet_id, "s1");
                assert_eq!(port_id.as_deref(), Some("p1"));
                assert_eq!(options, opts(&[("router", "10.0.0.1"), ("mtu", "9000")]));
                assert_eq!(external_ids[EXT_ID_PORT_ID], "p1");
                assert_eq!(external_ids[EXT_ID_SUBNET_ID], "s1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_v6_prefers_stateful_subnet() {
        let nb = MemoryNb::new();
        seed(
            &nb,
            "stateless",
            "2001:db8:1::/64",
            opts(&[("server_id", "fa:16:3e:00:00:aa"), ("dhcpv6_stateless", "true")]),
        )
        .await;
        seed(&nb, "stateful", "2001:db8:2::/64", opts(&[("server_id", "fa:16:3e:00:00:bb")])).await;
        let stateful = nb.get_subnet_dhcp_options("stateful").unwrap().unwrap();

        let p = port(&[("stateless", "2001:db8:1::5"), ("stateful", "2001:db8:2::5")]);
        assert_eq!(
            port_dhcp_options(&nb, &p, IpVersion::V6).unwrap(),
            PortDhcpOptions::Shared(stateful.uuid)
        );
    }

    #[tokio::test]
    async fn test_empty_subnet_row_is_ignored() {
        let nb = MemoryNb::new();
        seed(&nb, "s1", "10.0.0.0/24", BTreeMap::new()).await;
        assert_eq!(
            port_dhcp_options(&nb, &port(&[("s1", "10.0.0.5")]), IpVersion::V4).unwrap(),
            PortDhcpOptions::Disabled
        );
    }

    #[tokio::test]
    async fn test_compose_refreshes_port_rows() {
        let nb = MemoryNb::new();
        seed(&nb, "s1", "10.0.0.0/24", opts(&[("router", "10.0.0.1"), ("mtu", "1500")])).await;
        let old = nb.get_subnet_dhcp_options("s1").unwrap();

        let mut txn = nb.transaction(true);
        txn.add(NbCommand::AddDhcpOptions {
            subnet_id: "s1".to_string(),
            port_id: Some("p1".to_string()),
            cidr: "10.0.0.0/24".parse().unwrap(),
            options: opts(&[("router", "10.0.0.1"), ("mtu", "9000")]),
            external_ids: BTreeMap::new(),
        });
        txn.commit().await.unwrap();

        let spec = DhcpOptionsSpec {
            cidr: "10.0.0.0/24".parse().unwrap(),
            options: opts(&[("router", "10.0.0.254"), ("mtu", "1500")]),
            external_ids: BTreeMap::from([(EXT_ID_SUBNET_ID.to_string(), "s1".to_string())]),
        };
        let commands = compose_subnet_commands(&nb, "s1", &spec, old.as_ref()).unwrap();
        assert_eq!(commands.len(), 2);
        match &commands[1] {
            NbCommand::AddDhcpOptions {
                port_id, options, ..
            } => {
                assert_eq!(port_id.as_deref(), Some("p1"));
                assert_eq!(options, &opts(&[("router", "10.0.0.254"), ("mtu", "9000")]));
            }
            other => panic!("unexpected {other:?}"),
        }

        let empty = DhcpOptionsSpec {
            options: BTreeMap::new(),
            ..spec
        };
        let commands = compose_subnet_commands(&nb, "s1", &empty, old.as_ref()).unwrap();
        assert!(matches!(commands[1], NbCommand::DeleteDhcpOptions { .. }));
    }

    #[tokio::test]
    async fn test_delete_subnet_commands() {
        let nb = MemoryNb::new();
        assert!(delete_subnet_commands(&nb, "s1").unwrap().is_empty());

        seed(&nb, "s1", "10.0.0.0/24", opts(&[("router", "10.0.0.1")])).await;
        assert_eq!(delete_subnet_commands(&nb, "s1").unwrap().len(), 1);
    }

    #[test]
    fn test_existing_server_mac() {
        let row = DhcpOptions {
            uuid: Uuid::new_v4(),
            cidr: "10.0.0.0/24".parse().unwrap(),
            options: opts(&[("server_mac", "fa:16:3e:00:00:10"), ("server_id", "10.0.0.1")]),
            external_ids: BTreeMap::new(),
        };
        assert_eq!(existing_server_mac(Some(&row)), Some("fa:16:3e:00:00:10"));
        assert_eq!(existing_server_mac(None), None);
    }
}
