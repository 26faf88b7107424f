//! Address-set and ACL command builders.
//!
//! Everything here is a pure function of entity state: the driver reads
//! what it needs, calls these builders and queues the commands they return
//! in one transaction.

use std::collections::{BTreeMap, BTreeSet};

use ovn_nb_common::model::Port;
use ovn_nb_common::naming::{ovn_addrset_name, EXT_ID_SG_NAME};
use ovn_nb_common::NbCommand;
use ovn_types::IpVersion;

/// Address-set entries of a port, `"<mac> <ip>"` per fixed IP, grouped by
/// family. Both families are always present, possibly empty.
pub fn acl_port_ips(port: &Port) -> BTreeMap<IpVersion, Vec<String>> {
    IpVersion::ALL
        .into_iter()
        .map(|version| {
            let entries = port
                .fixed_ips_of(version)
                .map(|ip| format!("{} {}", port.mac_address, ip.ip_address))
                .collect();
            (version, entries)
        })
        .collect()
}

/// Security groups enforced on `port`.
///
/// Ports without port security are not in any group's address sets. With
/// `skip_trusted`, trusted (network-owned) ports are left out too.
pub fn enforced_security_groups(
    port: &Port,
    port_security_default: bool,
    skip_trusted: bool,
) -> BTreeSet<String> {
    if !port.port_security_enabled.unwrap_or(port_security_default) {
        return BTreeSet::new();
    }
    if skip_trusted && port.is_trusted() {
        return BTreeSet::new();
    }
    port.security_groups.iter().cloned().collect()
}

/// Lifecycle events of a security group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityGroupEvent {
    Created,
    Updated,
    Deleting,
}

/// Commands that keep a group's two address sets in step with the group.
/// Membership is not touched.
pub fn security_group_commands(
    sg_id: &str,
    sg_name: &str,
    event: SecurityGroupEvent,
) -> Vec<NbCommand> {
    let external_ids = BTreeMap::from([(EXT_ID_SG_NAME.to_string(), sg_name.to_string())]);
    IpVersion::ALL
        .into_iter()
        .map(|version| {
            let name = ovn_addrset_name(sg_id, version);
            match event {
                SecurityGroupEvent::Created => NbCommand::CreateAddressSet {
                    name,
                    external_ids: external_ids.clone(),
                },
                SecurityGroupEvent::Updated => NbCommand::UpdateAddressSetExtIds {
                    name,
                    external_ids: external_ids.clone(),
                    if_exists: true,
                },
                SecurityGroupEvent::Deleting => NbCommand::DeleteAddressSet {
                    name,
                    if_exists: true,
                },
            }
        })
        .collect()
}

/// Adds the port's entries to every group it joined.
///
/// `if_exists` is off: a missing address set means the group and OVN are
/// out of sync and the port write must fail.
pub fn port_create_commands(
    sg_ids: &BTreeSet<String>,
    addresses: &BTreeMap<IpVersion, Vec<String>>,
) -> Vec<NbCommand> {
    add_to_groups(sg_ids, addresses, false)
}

/// Removes the port's entries from every group it was in.
pub fn port_delete_commands(
    sg_ids: &BTreeSet<String>,
    addresses: &BTreeMap<IpVersion, Vec<String>>,
) -> Vec<NbCommand> {
    let mut commands = Vec::new();
    for sg_id in sg_ids {
        for (version, entries) in addresses {
            if !entries.is_empty() {
                commands.push(NbCommand::update_address_set(
                    ovn_addrset_name(sg_id, *version),
                    Vec::new(),
                    entries.clone(),
                    true,
                ));
            }
        }
    }
    commands
}

fn add_to_groups(
    sg_ids: &BTreeSet<String>,
    addresses: &BTreeMap<IpVersion, Vec<String>>,
    if_exists: bool,
) -> Vec<NbCommand> {
    let mut commands = Vec::new();
    for sg_id in sg_ids {
        for (version, entries) in addresses {
            if !entries.is_empty() {
                commands.push(NbCommand::update_address_set(
                    ovn_addrset_name(sg_id, *version),
                    entries.clone(),
                    Vec::new(),
                    if_exists,
                ));
            }
        }
    }
    commands
}

/// How a port update changed the port's group membership and addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSecurityGroupDiff {
    pub attached: BTreeSet<String>,
    pub detached: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
    /// Fixed IPs or MAC changed, so every entry of the port may differ.
    pub addresses_changed: bool,
}

impl PortSecurityGroupDiff {
    pub fn new(
        old_groups: &BTreeSet<String>,
        new_groups: &BTreeSet<String>,
        original: &Port,
        current: &Port,
    ) -> Self {
        Self {
            attached: new_groups.difference(old_groups).cloned().collect(),
            detached: old_groups.difference(new_groups).cloned().collect(),
            unchanged: new_groups.intersection(old_groups).cloned().collect(),
            addresses_changed: original.fixed_ips != current.fixed_ips
                || original.mac_address != current.mac_address,
        }
    }

    /// ACLs must be recompiled when membership or addresses moved.
    pub fn needs_acl_refresh(&self) -> bool {
        !self.attached.is_empty() || !self.detached.is_empty() || self.addresses_changed
    }

    /// Minimal address-set updates for the change.
    ///
    /// Joined groups get the new entries, left groups lose the old ones.
    /// Groups kept across the update only see per-family deltas, and only
    /// when a delta is non-empty.
    pub fn address_set_commands(
        &self,
        old_addresses: &BTreeMap<IpVersion, Vec<String>>,
        new_addresses: &BTreeMap<IpVersion, Vec<String>>,
    ) -> Vec<NbCommand> {
        let mut commands = add_to_groups(&self.attached, new_addresses, true);
        commands.extend(port_delete_commands(&self.detached, old_addresses));

        if !self.addresses_changed {
            return commands;
        }
        for sg_id in &self.unchanged {
            for version in IpVersion::ALL {
                let old: BTreeSet<&String> = old_addresses
                    .get(&version)
                    .map(|v| v.iter().collect())
                    .unwrap_or_default();
                let new: BTreeSet<&String> = new_addresses
                    .get(&version)
                    .map(|v| v.iter().collect())
                    .unwrap_or_default();
                let added: Vec<String> = new.difference(&old).map(|s| s.to_string()).collect();
                let removed: Vec<String> = old.difference(&new).map(|s| s.to_string()).collect();
                if !added.is_empty() || !removed.is_empty() {
                    commands.push(NbCommand::update_address_set(
                        ovn_addrset_name(sg_id, version),
                        added,
                        removed,
                        true,
                    ));
                }
            }
        }
        commands
    }
}
