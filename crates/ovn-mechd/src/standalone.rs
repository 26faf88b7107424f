//! In-memory collaborators.
//!
//! Stand-ins for the entity database, the southbound chassis table, the
//! provisioning-block service and the segments service. The demonstration
//! binary seeds them from its event file; tests drive them directly.
//!
//! Locks recover from poisoning: the data is plain maps with no invariant a
//! panicking writer could break halfway.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ovn_nb_common::model::{Port, SecurityGroup, SecurityGroupRule, Segment, Subnet};
use ovn_nb_common::{CorePlugin, PluginError};
use ovn_types::PortStatus;
use serde::Deserialize;

use crate::collab::{ChassisBindData, ChassisStore, ProvisioningBlocks, ProvisioningResource, SegmentDb};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct PluginState {
    ports: BTreeMap<String, Port>,
    subnets: BTreeMap<String, Subnet>,
    groups: BTreeMap<String, SecurityGroup>,
}

/// Entity database kept in memory.
#[derive(Debug, Default)]
pub struct MemoryPlugin {
    state: RwLock<PluginState>,
}

impl MemoryPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_port(&self, port: Port) {
        write(&self.state).ports.insert(port.id.clone(), port);
    }

    pub fn remove_port(&self, port_id: &str) -> Option<Port> {
        write(&self.state).ports.remove(port_id)
    }

    pub fn put_subnet(&self, subnet: Subnet) {
        write(&self.state).subnets.insert(subnet.id.clone(), subnet);
    }

    pub fn remove_subnet(&self, subnet_id: &str) -> Option<Subnet> {
        write(&self.state).subnets.remove(subnet_id)
    }

    pub fn put_security_group(&self, group: SecurityGroup) {
        write(&self.state).groups.insert(group.id.clone(), group);
    }

    pub fn remove_security_group(&self, sg_id: &str) -> Option<SecurityGroup> {
        write(&self.state).groups.remove(sg_id)
    }

    /// Adds or replaces a rule in its group. A group that is not known yet
    /// is created without a name.
    pub fn put_rule(&self, rule: SecurityGroupRule) {
        let mut state = write(&self.state);
        let group = state
            .groups
            .entry(rule.security_group_id.clone())
            .or_insert_with(|| SecurityGroup {
                id: rule.security_group_id.clone(),
                name: String::new(),
                rules: Vec::new(),
            });
        group.rules.retain(|r| r.id != rule.id);
        group.rules.push(rule);
    }

    pub fn remove_rule(&self, rule_id: &str) -> Option<SecurityGroupRule> {
        let mut state = write(&self.state);
        for group in state.groups.values_mut() {
            if let Some(idx) = group.rules.iter().position(|r| r.id == rule_id) {
                return Some(group.rules.remove(idx));
            }
        }
        None
    }

    /// Stored status of a port.
    pub fn port_status(&self, port_id: &str) -> Option<PortStatus> {
        read(&self.state).ports.get(port_id).map(|p| p.status)
    }
}

impl CorePlugin for MemoryPlugin {
    fn get_port(&self, port_id: &str) -> Result<Port, PluginError> {
        read(&self.state)
            .ports
            .get(port_id)
            .cloned()
            .ok_or_else(|| PluginError::not_found("port", port_id))
    }

    fn get_subnet(&self, subnet_id: &str) -> Result<Subnet, PluginError> {
        read(&self.state)
            .subnets
            .get(subnet_id)
            .cloned()
            .ok_or_else(|| PluginError::not_found("subnet", subnet_id))
    }

    fn get_security_group(&self, sg_id: &str) -> Result<SecurityGroup, PluginError> {
        read(&self.state)
            .groups
            .get(sg_id)
            .cloned()
            .ok_or_else(|| PluginError::not_found("security group", sg_id))
    }

    fn get_security_group_rule(&self, rule_id: &str) -> Result<SecurityGroupRule, PluginError> {
        read(&self.state)
            .groups
            .values()
            .flat_map(|g| g.rules.iter())
            .find(|r| r.id == rule_id)
            .cloned()
            .ok_or_else(|| PluginError::not_found("security group rule", rule_id))
    }

    fn get_ports_in_security_group(&self, sg_id: &str) -> Result<Vec<Port>, PluginError> {
        Ok(read(&self.state)
            .ports
            .values()
            .filter(|p| p.security_groups.iter().any(|g| g == sg_id))
            .cloned()
            .collect())
    }

    fn update_port_status(&self, port_id: &str, status: PortStatus) -> Result<(), PluginError> {
        let mut state = write(&self.state);
        let port = state
            .ports
            .get_mut(port_id)
            .ok_or_else(|| PluginError::not_found("port", port_id))?;
        port.status = status;
        Ok(())
    }
}

/// One chassis as listed in an event file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChassisEntry {
    pub host: String,
    #[serde(flatten)]
    pub data: ChassisBindData,
}

/// Chassis table with a fixed set of registrations.
#[derive(Debug, Default)]
pub struct StaticChassisStore {
    chassis: RwLock<BTreeMap<String, ChassisBindData>>,
}

impl StaticChassisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ChassisEntry>) -> Self {
        let store = Self::new();
        for entry in entries {
            store.insert(entry.host, entry.data);
        }
        store
    }

    /// Registers or replaces the chassis of `host`.
    pub fn insert(&self, host: impl Into<String>, data: ChassisBindData) {
        write(&self.chassis).insert(host.into(), data);
    }

    pub fn remove(&self, host: &str) -> Option<ChassisBindData> {
        write(&self.chassis).remove(host)
    }
}

impl ChassisStore for StaticChassisStore {
    fn chassis_exists(&self, host: &str) -> bool {
        read(&self.chassis).contains_key(host)
    }

    fn get_chassis_data_for_port_bind(&self, host: &str) -> Option<ChassisBindData> {
        read(&self.chassis).get(host).cloned()
    }

    fn get_chassis_hostname_and_physnets(&self) -> BTreeMap<String, BTreeSet<String>> {
        read(&self.chassis)
            .iter()
            .map(|(host, data)| (host.clone(), data.physnets.clone()))
            .collect()
    }
}

type BlockKey = (String, ProvisioningResource, String);

/// Provisioning blocks kept in memory.
#[derive(Debug, Default)]
pub struct MemoryProvisioning {
    blocks: Mutex<BTreeSet<BlockKey>>,
}

impl MemoryProvisioning {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any entity still blocks `object_id`.
    pub fn is_blocked(&self, object_id: &str) -> bool {
        lock(&self.blocks).iter().any(|(id, _, _)| id == object_id)
    }

    pub fn len(&self) -> usize {
        lock(&self.blocks).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.blocks).is_empty()
    }
}

impl ProvisioningBlocks for MemoryProvisioning {
    fn add_provisioning_component(
        &self,
        object_id: &str,
        resource: ProvisioningResource,
        entity: &str,
    ) -> Result<(), PluginError> {
        lock(&self.blocks).insert((object_id.to_string(), resource, entity.to_string()));
        Ok(())
    }

    fn provisioning_complete(
        &self,
        object_id: &str,
        resource: ProvisioningResource,
        entity: &str,
    ) -> Result<(), PluginError> {
        lock(&self.blocks).remove(&(object_id.to_string(), resource, entity.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SegmentState {
    segments: BTreeMap<String, Segment>,
    host_segments: BTreeMap<String, BTreeSet<String>>,
}

/// Segments service kept in memory.
#[derive(Debug, Default)]
pub struct MemorySegmentDb {
    state: RwLock<SegmentState>,
}

impl MemorySegmentDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_segment(&self, segment: Segment) {
        write(&self.state)
            .segments
            .insert(segment.id.clone(), segment);
    }

    /// Segments reachable from `host`.
    pub fn segments_for_host(&self, host: &str) -> BTreeSet<String> {
        read(&self.state)
            .host_segments
            .get(host)
            .cloned()
            .unwrap_or_default()
    }

    /// Hosts that can reach `segment_id`.
    pub fn hosts_for_segment(&self, segment_id: &str) -> BTreeSet<String> {
        read(&self.state)
            .host_segments
            .iter()
            .filter(|(_, segments)| segments.contains(segment_id))
            .map(|(host, _)| host.clone())
            .collect()
    }
}

impl SegmentDb for MemorySegmentDb {
    fn get_segments_with_physnets(
        &self,
        physnets: &BTreeSet<String>,
    ) -> Result<Vec<Segment>, PluginError> {
        Ok(read(&self.state)
            .segments
            .values()
            .filter(|s| {
                s.physical_network
                    .as_ref()
                    .is_some_and(|physnet| physnets.contains(physnet))
            })
            .cloned()
            .collect())
    }

    fn update_segment_host_mapping(
        &self,
        host: &str,
        segment_ids: &BTreeSet<String>,
    ) -> Result<(), PluginError> {
        write(&self.state)
            .host_segments
            .insert(host.to_string(), segment_ids.clone());
        Ok(())
    }

    fn map_segment_to_hosts(
        &self,
        segment_id: &str,
        hosts: &BTreeSet<String>,
    ) -> Result<(), PluginError> {
        let mut state = write(&self.state);
        for host in hosts {
            state
                .host_segments
                .entry(host.clone())
                .or_default()
                .insert(segment_id.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovn_nb_common::model::RuleDirection;
    use ovn_types::{IpVersion, NetworkType};
    use pretty_assertions::assert_eq;

    fn rule(id: &str, sg: &str) -> SecurityGroupRule {
        SecurityGroupRule {
            id: id.to_string(),
            security_group_id: sg.to_string(),
            direction: RuleDirection::Ingress,
            ethertype: IpVersion::V4,
            protocol: None,
            port_range_min: None,
            port_range_max: None,
            remote_ip_prefix: None,
            remote_group_id: None,
        }
    }

    #[test]
    fn test_plugin_rules_and_membership() {
        let plugin = MemoryPlugin::new();
        plugin.put_rule(rule("r1", "sg1"));
        plugin.put_rule(rule("r1", "sg1"));
        plugin.put_rule(rule("r2", "sg1"));
        assert_eq!(plugin.get_security_group("sg1").unwrap().rules.len(), 2);
        assert_eq!(plugin.get_security_group_rule("r2").unwrap().security_group_id, "sg1");

        let mut port = Port::new("p1", "n1", "fa:16:3e:00:00:01".parse().unwrap());
        port.security_groups = vec!["sg1".to_string()];
        plugin.put_port(port);
        plugin.put_port(Port::new("p2", "n1", "fa:16:3e:00:00:02".parse().unwrap()));
        let members = plugin.get_ports_in_security_group("sg1").unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, "p1");

        assert!(plugin.remove_rule("r2").is_some());
        assert!(plugin.get_security_group_rule("r2").unwrap_err().is_benign_race());
    }

    #[test]
    fn test_plugin_update_port_status() {
        let plugin = MemoryPlugin::new();
        plugin.put_port(Port::new("p1", "n1", "fa:16:3e:00:00:01".parse().unwrap()));
        plugin.update_port_status("p1", PortStatus::Active).unwrap();
        assert_eq!(plugin.port_status("p1"), Some(PortStatus::Active));
        assert!(plugin.update_port_status("p9", PortStatus::Down).is_err());
    }

    #[test]
    fn test_chassis_entries_deserialize() {
        let entries: Vec<ChassisEntry> = serde_yaml::from_str(
            "- host: compute1\n  datapath_type: netdev\n  iface_types: [dpdkvhostuser]\n  physnets: [physnet1]\n- host: compute2\n",
        )
        .unwrap();
        let store = StaticChassisStore::from_entries(entries);
        assert!(store.chassis_exists("compute2"));
        assert!(store
            .get_chassis_data_for_port_bind("compute1")
            .unwrap()
            .supports_vhost_user());
        assert_eq!(
            store.get_chassis_hostname_and_physnets()["compute1"],
            BTreeSet::from(["physnet1".to_string()])
        );
    }

    #[test]
    fn test_provisioning_blocks() {
        let blocks = MemoryProvisioning::new();
        blocks
            .add_provisioning_component("p1", ProvisioningResource::Port, "L2")
            .unwrap();
        assert!(blocks.is_blocked("p1"));
        blocks
            .provisioning_complete("p1", ProvisioningResource::Port, "L2")
            .unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_segment_host_mapping() {
        let db = MemorySegmentDb::new();
        db.add_segment(Segment {
            id: "s1".to_string(),
            network_type: NetworkType::Vlan,
            physical_network: Some("physnet1".to_string()),
            segmentation_id: Some(10),
        });
        let found = db
            .get_segments_with_physnets(&BTreeSet::from(["physnet1".to_string()]))
            .unwrap();
        assert_eq!(found.len(), 1);

        db.map_segment_to_hosts("s1", &BTreeSet::from(["h1".to_string(), "h2".to_string()]))
            .unwrap();
        assert_eq!(db.hosts_for_segment("s1").len(), 2);
        db.update_segment_host_mapping("h1", &BTreeSet::new()).unwrap();
        assert!(db.segments_for_host("h1").is_empty());
    }
}
