//! Event-file replay.
//!
//! Plays the part of the entity-database framework for the demonstration
//! binary: each event runs the precommit hook, commits the entity into
//! [`MemoryPlugin`], binds ports that name a host, then runs the
//! postcommit hook. Notifications go through an [`EventRegistry`] the
//! driver is subscribed to.
//!
//! ```yaml
//! chassis:
//!   - host: compute-1
//!     physnets: [physnet1]
//! events:
//!   - op: create_network
//!     network: { id: net-1, name: public }
//!     segments:
//!       - { id: seg-1, network_type: vlan, physical_network: physnet1, segmentation_id: 100 }
//!   - op: create_port
//!     port: { id: port-1, network_id: net-1, mac_address: "fa:16:3e:00:00:01" }
//!     host: compute-1
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use ovn_nb_common::model::{Network, Port, SecurityGroup, SecurityGroupRule, Segment, Subnet};
use ovn_nb_common::{
    CorePlugin, MechanismDriver, MemoryNb, NetworkContext, PortBinding, PortContext,
    SubnetContext,
};
use ovn_types::PortStatus;
use serde::{Deserialize, Serialize};

use crate::collab::ChassisStore;
use crate::config::OvnMechConfig;
use crate::error::{DriverError, DriverResult};
use crate::mech::{Collaborators, DriverEvent, EventRegistry, OvnMechDriver, WorkerKind};
use crate::standalone::{
    ChassisEntry, MemoryPlugin, MemoryProvisioning, MemorySegmentDb, StaticChassisStore,
};

const SOURCE: &str = "Replayer";

/// Contents of an event file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayFile {
    pub chassis: Vec<ChassisEntry>,
    pub events: Vec<ReplayEvent>,
}

impl ReplayFile {
    pub fn from_yaml_str(yaml: &str) -> DriverResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| DriverError::invalid_input("events", e.to_string()))
    }

    pub fn load(path: &Path) -> DriverResult<Self> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| DriverError::invalid_input(path.display().to_string(), e.to_string()))?;
        Self::from_yaml_str(&yaml)
    }
}

/// One entity-database change or notification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplayEvent {
    ProcessStarted {
        worker: WorkerKind,
    },
    CreateNetwork {
        network: Network,
        #[serde(default)]
        segments: Vec<Segment>,
    },
    UpdateNetwork {
        network: Network,
        /// Segments are kept when not given.
        #[serde(default)]
        segments: Option<Vec<Segment>>,
    },
    DeleteNetwork {
        network_id: String,
    },
    CreateSubnet {
        subnet: Subnet,
    },
    UpdateSubnet {
        subnet: Subnet,
    },
    DeleteSubnet {
        subnet_id: String,
    },
    CreatePort {
        port: Port,
        #[serde(default)]
        host: Option<String>,
    },
    /// The host is kept when not given.
    UpdatePort {
        port: Port,
        #[serde(default)]
        host: Option<String>,
    },
    DeletePort {
        port_id: String,
    },
    /// Moves a port to `host` without changing anything else.
    BindPort {
        port_id: String,
        host: String,
    },
    CreateSecurityGroup {
        group: SecurityGroup,
    },
    UpdateSecurityGroup {
        id: String,
        name: String,
    },
    DeleteSecurityGroup {
        id: String,
    },
    CreateSecurityGroupRule {
        rule: SecurityGroupRule,
    },
    DeleteSecurityGroupRule {
        rule_id: String,
    },
    /// The northbound monitor saw the port come up.
    PortUp {
        port_id: String,
    },
    PortDown {
        port_id: String,
    },
    /// An agent reported the physical networks of its host.
    ChassisPhysnets {
        host: String,
        physnets: BTreeSet<String>,
    },
    CreateSegment {
        segment: Segment,
    },
}

impl ReplayEvent {
    pub fn op(&self) -> &'static str {
        match self {
            ReplayEvent::ProcessStarted { .. } => "process_started",
            ReplayEvent::CreateNetwork { .. } => "create_network",
            ReplayEvent::UpdateNetwork { .. } => "update_network",
            ReplayEvent::DeleteNetwork { .. } => "delete_network",
            ReplayEvent::CreateSubnet { .. } => "create_subnet",
            ReplayEvent::UpdateSubnet { .. } => "update_subnet",
            ReplayEvent::DeleteSubnet { .. } => "delete_subnet",
            ReplayEvent::CreatePort { .. } => "create_port",
            ReplayEvent::UpdatePort { .. } => "update_port",
            ReplayEvent::DeletePort { .. } => "delete_port",
            ReplayEvent::BindPort { .. } => "bind_port",
            ReplayEvent::CreateSecurityGroup { .. } => "create_security_group",
            ReplayEvent::UpdateSecurityGroup { .. } => "update_security_group",
            ReplayEvent::DeleteSecurityGroup { .. } => "delete_security_group",
            ReplayEvent::CreateSecurityGroupRule { .. } => "create_security_group_rule",
            ReplayEvent::DeleteSecurityGroupRule { .. } => "delete_security_group_rule",
            ReplayEvent::PortUp { .. } => "port_up",
            ReplayEvent::PortDown { .. } => "port_down",
            ReplayEvent::ChassisPhysnets { .. } => "chassis_physnets",
            ReplayEvent::CreateSegment { .. } => "create_segment",
        }
    }
}

/// An event that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayFailure {
    /// Position in the event list.
    pub index: usize,
    pub op: String,
    pub error: String,
}

/// What a replay did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayReport {
    pub applied: usize,
    /// Refused before anything was committed.
    pub rejected: Vec<ReplayFailure>,
    /// Committed to the entity database, then failed to reach OVN.
    pub failed: Vec<ReplayFailure>,
    /// Current binding of every bound port.
    pub bindings: BTreeMap<String, PortBinding>,
}

enum Outcome {
    Rejected(String),
    Failed(String),
}

impl Outcome {
    fn rejected(e: impl ToString) -> Self {
        Outcome::Rejected(e.to_string())
    }

    fn failed(e: impl ToString) -> Self {
        Outcome::Failed(e.to_string())
    }
}

#[derive(Debug, Clone)]
struct NetworkRecord {
    network: Network,
    segments: Vec<Segment>,
}

/// The driver wired to in-memory collaborators, plus the entity state the
/// framework would keep.
pub struct Replayer {
    nb: Arc<MemoryNb>,
    plugin: Arc<MemoryPlugin>,
    chassis: Arc<StaticChassisStore>,
    provisioning: Arc<MemoryProvisioning>,
    segments: Arc<MemorySegmentDb>,
    driver: Arc<OvnMechDriver>,
    registry: EventRegistry,
    networks: BTreeMap<String, NetworkRecord>,
    hosts: BTreeMap<String, String>,
    bindings: BTreeMap<String, PortBinding>,
}

impl Replayer {
    pub fn new(config: OvnMechConfig, chassis: Vec<ChassisEntry>) -> Self {
        let nb = Arc::new(MemoryNb::new());
        let plugin = Arc::new(MemoryPlugin::new());
        let chassis = Arc::new(StaticChassisStore::from_entries(chassis));
        let provisioning = Arc::new(MemoryProvisioning::new());
        let segments = Arc::new(MemorySegmentDb::new());

        let collab = Collaborators::new(
            nb.clone(),
            plugin.clone(),
            chassis.clone(),
            provisioning.clone(),
            segments.clone(),
        );
        let driver = Arc::new(OvnMechDriver::new(config, collab));
        let mut registry = EventRegistry::new();
        registry.register(driver.clone());

        Self {
            nb,
            plugin,
            chassis,
            provisioning,
            segments,
            driver,
            registry,
            networks: BTreeMap::new(),
            hosts: BTreeMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn nb(&self) -> &MemoryNb {
        &self.nb
    }

    pub fn plugin(&self) -> &MemoryPlugin {
        &self.plugin
    }

    pub fn provisioning(&self) -> &MemoryProvisioning {
        &self.provisioning
    }

    pub fn segments(&self) -> &MemorySegmentDb {
        &self.segments
    }

    pub fn driver(&self) -> &OvnMechDriver {
        &self.driver
    }

    /// Applies `events` in order. A failed event is recorded and the replay
    /// moves on.
    pub async fn run(&mut self, events: Vec<ReplayEvent>) -> ReplayReport {
        let mut report = ReplayReport::default();
        for (index, event) in events.into_iter().enumerate() {
            let op = event.op();
            debug_log!(SOURCE, index = index, op = op, "Replaying event");
            match self.apply(event).await {
                Ok(()) => report.applied += 1,
                Err(Outcome::Rejected(error)) => {
                    warn_log!(SOURCE, index = index, op = op, error = %error, "Event rejected");
                    report.rejected.push(ReplayFailure {
                        index,
                        op: op.to_string(),
                        error,
                    });
                }
                Err(Outcome::Failed(error)) => {
                    error_log!(SOURCE, index = index, op = op, error = %error, "Event failed");
                    report.failed.push(ReplayFailure {
                        index,
                        op: op.to_string(),
                        error,
                    });
                }
            }
        }
        report.bindings = self.bindings.clone();
        info_log!(
            SOURCE,
            applied = report.applied,
            rejected = report.rejected.len(),
            failed = report.failed.len(),
            "Replay finished"
        );
        report
    }

    async fn apply(&mut self, event: ReplayEvent) -> Result<(), Outcome> {
        match event {
            ReplayEvent::ProcessStarted { worker } => {
                self.publish(DriverEvent::ProcessStarted(worker)).await
            }
            ReplayEvent::CreateNetwork { network, segments } => {
                self.create_network(network, segments).await
            }
            ReplayEvent::UpdateNetwork { network, segments } => {
                self.update_network(network, segments).await
            }
            ReplayEvent::DeleteNetwork { network_id } => self.delete_network(&network_id).await,
            ReplayEvent::CreateSubnet { subnet } => self.create_subnet(subnet).await,
            ReplayEvent::UpdateSubnet { subnet } => self.update_subnet(subnet).await,
            ReplayEvent::DeleteSubnet { subnet_id } => self.delete_subnet(&subnet_id).await,
            ReplayEvent::CreatePort { port, host } => self.create_port(port, host).await,
            ReplayEvent::UpdatePort { port, host } => self.update_port(port, host).await,
            ReplayEvent::DeletePort { port_id } => self.delete_port(&port_id).await,
            ReplayEvent::BindPort { port_id, host } => {
                let port = self.plugin.get_port(&port_id).map_err(Outcome::rejected)?;
                self.update_port(port, Some(host)).await
            }
            ReplayEvent::CreateSecurityGroup { group } => {
                let event = DriverEvent::SecurityGroupCreated {
                    id: group.id.clone(),
                    name: group.name.clone(),
                };
                self.plugin.put_security_group(group);
                self.publish(event).await
            }
            ReplayEvent::UpdateSecurityGroup { id, name } => {
                let mut group = self.plugin.get_security_group(&id).map_err(Outcome::rejected)?;
                group.name = name.clone();
                self.plugin.put_security_group(group);
                self.publish(DriverEvent::SecurityGroupUpdated { id, name }).await
            }
            ReplayEvent::DeleteSecurityGroup { id } => {
                let group = self.plugin.get_security_group(&id).map_err(Outcome::rejected)?;
                let result = self
                    .publish(DriverEvent::SecurityGroupDeleting {
                        id: id.clone(),
                        name: group.name,
                    })
                    .await;
                self.plugin.remove_security_group(&id);
                result
            }
            ReplayEvent::CreateSecurityGroupRule { rule } => {
                self.plugin.put_rule(rule.clone());
                self.publish(DriverEvent::SecurityGroupRuleCreated(rule)).await
            }
            ReplayEvent::DeleteSecurityGroupRule { rule_id } => {
                // The rule must still be readable while the notification runs.
                let result = self
                    .publish(DriverEvent::SecurityGroupRuleDeleting {
                        rule_id: rule_id.clone(),
                    })
                    .await;
                self.plugin.remove_rule(&rule_id);
                result
            }
            ReplayEvent::PortUp { port_id } => {
                self.driver
                    .set_port_status_up(&port_id)
                    .map_err(Outcome::failed)?;
                if !self.provisioning.is_blocked(&port_id) {
                    // A port removed meanwhile has no status to set.
                    if let Err(e) = self.plugin.update_port_status(&port_id, PortStatus::Active) {
                        warn_log!(
                            SOURCE,
                            port_id = %port_id,
                            error = %e,
                            "Could not mark port active after status up"
                        );
                    }
                }
                Ok(())
            }
            ReplayEvent::PortDown { port_id } => self
                .driver
                .set_port_status_down(&port_id)
                .map_err(Outcome::failed),
            ReplayEvent::ChassisPhysnets { host, physnets } => {
                let mut data = self
                    .chassis
                    .get_chassis_data_for_port_bind(&host)
                    .unwrap_or_default();
                data.physnets = physnets.clone();
                self.chassis.insert(host.clone(), data);
                self.driver
                    .update_segment_host_mapping(&host, &physnets)
                    .map_err(Outcome::failed)
            }
            ReplayEvent::CreateSegment { segment } => {
                self.segments.add_segment(segment.clone());
                self.publish(DriverEvent::SegmentCreated(segment)).await
            }
        }
    }

    async fn publish(&self, event: DriverEvent) -> Result<(), Outcome> {
        self.registry.publish(&event).await.map_err(Outcome::failed)
    }

    fn network(&self, network_id: &str) -> Result<&NetworkRecord, Outcome> {
        self.networks
            .get(network_id)
            .ok_or_else(|| Outcome::Rejected(format!("network {network_id} could not be found")))
    }

    async fn create_network(&mut self, network: Network, segments: Vec<Segment>) -> Result<(), Outcome> {
        let ctx = NetworkContext::new(network.clone(), segments.clone());
        self.driver
            .create_network_precommit(&ctx)
            .map_err(Outcome::rejected)?;
        for segment in &segments {
            self.segments.add_segment(segment.clone());
        }
        self.networks
            .insert(network.id.clone(), NetworkRecord { network, segments });
        self.driver
            .create_network_postcommit(&ctx)
            .await
            .map_err(Outcome::failed)
    }

    async fn update_network(
        &mut self,
        network: Network,
        segments: Option<Vec<Segment>>,
    ) -> Result<(), Outcome> {
        let original = self.network(&network.id)?.clone();
        let segments = segments.unwrap_or(original.segments);
        let ctx = NetworkContext::new(network.clone(), segments.clone())
            .with_original(original.network);
        self.driver
            .update_network_precommit(&ctx)
            .map_err(Outcome::rejected)?;
        self.networks
            .insert(network.id.clone(), NetworkRecord { network, segments });
        self.driver
            .update_network_postcommit(&ctx)
            .await
            .map_err(Outcome::failed)
    }

    async fn delete_network(&mut self, network_id: &str) -> Result<(), Outcome> {
        let record = self.network(network_id)?.clone();
        let ctx = NetworkContext::new(record.network, record.segments);
        self.driver
            .delete_network_precommit(&ctx)
            .map_err(Outcome::rejected)?;
        self.networks.remove(network_id);
        self.driver
            .delete_network_postcommit(&ctx)
            .await
            .map_err(Outcome::failed)
    }

    async fn create_subnet(&mut self, subnet: Subnet) -> Result<(), Outcome> {
        let network = self.network(&subnet.network_id)?.network.clone();
        let ctx = SubnetContext::new(subnet.clone(), network);
        self.driver
            .create_subnet_precommit(&ctx)
            .map_err(Outcome::rejected)?;
        self.plugin.put_subnet(subnet);
        self.driver
            .create_subnet_postcommit(&ctx)
            .await
            .map_err(Outcome::failed)
    }

    async fn update_subnet(&mut self, subnet: Subnet) -> Result<(), Outcome> {
        let network = self.network(&subnet.network_id)?.network.clone();
        let original = self.plugin.get_subnet(&subnet.id).map_err(Outcome::rejected)?;
        let ctx = SubnetContext::new(subnet.clone(), network).with_original(original);
        self.driver
            .update_subnet_precommit(&ctx)
            .map_err(Outcome::rejected)?;
        self.plugin.put_subnet(subnet);
        self.driver
            .update_subnet_postcommit(&ctx)
            .await
            .map_err(Outcome::failed)
    }

    async fn delete_subnet(&mut self, subnet_id: &str) -> Result<(), Outcome> {
        let subnet = self.plugin.get_subnet(subnet_id).map_err(Outcome::rejected)?;
        let network = self.network(&subnet.network_id)?.network.clone();
        let ctx = SubnetContext::new(subnet, network);
        self.driver
            .delete_subnet_precommit(&ctx)
            .map_err(Outcome::rejected)?;
        self.plugin.remove_subnet(subnet_id);
        self.driver
            .delete_subnet_postcommit(&ctx)
            .await
            .map_err(Outcome::failed)
    }

    fn port_context(&self, port: Port, host: Option<String>) -> Result<PortContext, Outcome> {
        let record = self.network(&port.network_id)?;
        let mut ctx = PortContext::new(port, record.network.clone())
            .with_segments(record.segments.clone());
        if let Some(host) = host {
            ctx = ctx.with_host(host);
        }
        Ok(ctx)
    }

    fn bind(&mut self, ctx: &mut PortContext) {
        self.driver.bind_port(ctx);
        let port_id = ctx.current.id.clone();
        match ctx.binding() {
            Some(binding) => {
                self.bindings.insert(port_id, binding.clone());
            }
            None => {
                self.bindings.remove(&port_id);
            }
        }
    }

    async fn create_port(&mut self, port: Port, host: Option<String>) -> Result<(), Outcome> {
        let mut ctx = self.port_context(port.clone(), host.clone())?;
        self.driver
            .create_port_precommit(&ctx)
            .map_err(Outcome::rejected)?;
        self.plugin.put_port(port.clone());
        if let Some(host) = host {
            self.hosts.insert(port.id.clone(), host);
            self.bind(&mut ctx);
        }
        self.driver
            .create_port_postcommit(&ctx)
            .await
            .map_err(Outcome::failed)
    }

    async fn update_port(&mut self, port: Port, host: Option<String>) -> Result<(), Outcome> {
        let original = self.plugin.get_port(&port.id).map_err(Outcome::rejected)?;
        let original_host = self.hosts.get(&port.id).cloned();
        let host = host.or_else(|| original_host.clone());

        let mut ctx = self
            .port_context(port.clone(), host.clone())?
            .with_original(original);
        if let Some(original_host) = &original_host {
            ctx = ctx.with_original_host(original_host.clone());
        }
        self.driver
            .update_port_precommit(&ctx)
            .map_err(Outcome::rejected)?;
        self.plugin.put_port(port.clone());
        if let Some(host) = host {
            let moved = original_host.as_deref() != Some(host.as_str());
            self.hosts.insert(port.id.clone(), host);
            if moved || !self.bindings.contains_key(&port.id) {
                self.bind(&mut ctx);
            }
        }
        self.driver
            .update_port_postcommit(&ctx)
            .await
            .map_err(Outcome::failed)
    }

    async fn delete_port(&mut self, port_id: &str) -> Result<(), Outcome> {
        let port = self.plugin.get_port(port_id).map_err(Outcome::rejected)?;
        let host = self.hosts.get(port_id).cloned();
        let ctx = self.port_context(port, host)?;
        self.driver
            .delete_port_precommit(&ctx)
            .map_err(Outcome::rejected)?;
        self.plugin.remove_port(port_id);
        self.hosts.remove(port_id);
        self.bindings.remove(port_id);
        self.driver
            .delete_port_postcommit(&ctx)
            .await
            .map_err(Outcome::failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovn_nb_common::NbStore;
    use pretty_assertions::assert_eq;

    const EVENTS: &str = r#"
chassis:
  - host: compute-1
    physnets: [physnet1]
events:
  - op: process_started
    worker: ovn
  - op: create_network
    network: { id: net-1, name: public }
    segments:
      - { id: seg-1, network_type: vlan, physical_network: physnet1, segmentation_id: 100 }
  - op: create_network
    network: { id: net-2, name: legacy }
    segments:
      - { id: seg-2, network_type: vxlan, segmentation_id: 7 }
  - op: create_port
    port: { id: port-1, network_id: net-1, mac_address: "fa:16:3e:00:00:01" }
    host: compute-1
  - op: port_up
    port_id: port-1
"#;

    #[test]
    fn test_parse_event_file() {
        let file = ReplayFile::from_yaml_str(EVENTS).unwrap();
        assert_eq!(file.chassis.len(), 1);
        assert_eq!(file.chassis[0].host, "compute-1");
        assert!(file.chassis[0].data.physnets.contains("physnet1"));
        let ops: Vec<&str> = file.events.iter().map(ReplayEvent::op).collect();
        assert_eq!(
            ops,
            vec![
                "process_started",
                "create_network",
                "create_network",
                "create_port",
                "port_up"
            ]
        );

        assert!(ReplayFile::from_yaml_str("").unwrap().events.is_empty());
        assert!(ReplayFile::from_yaml_str("events: [{op: explode}]").is_err());
    }

    #[tokio::test]
    async fn test_replay_binds_and_activates_port() {
        let file = ReplayFile::from_yaml_str(EVENTS).unwrap();
        let mut replayer = Replayer::new(OvnMechConfig::default(), file.chassis);
        let report = replayer.run(file.events).await;

        assert_eq!(report.applied, 4);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].index, 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.bindings["port-1"].segment_id, "seg-1");

        assert!(replayer.nb().get_logical_switch("neutron-net-1").unwrap().is_some());
        assert!(replayer.nb().get_logical_switch("neutron-net-2").unwrap().is_none());
        assert!(replayer.nb().get_logical_switch_port("port-1").unwrap().is_some());
        assert!(!replayer.provisioning().is_blocked("port-1"));
        assert_eq!(replayer.plugin().port_status("port-1"), Some(PortStatus::Active));
    }

    #[tokio::test]
    async fn test_unknown_entities_are_rejected() {
        let mut replayer = Replayer::new(OvnMechConfig::default(), Vec::new());
        let report = replayer
            .run(vec![
                ReplayEvent::DeleteNetwork {
                    network_id: "nope".to_string(),
                },
                ReplayEvent::DeletePort {
                    port_id: "nope".to_string(),
                },
            ])
            .await;
        assert_eq!(report.applied, 0);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(replayer.nb().commit_count(), 0);
    }

    #[tokio::test]
    async fn test_port_up_for_vanished_port_is_applied() {
        let mut replayer = Replayer::new(OvnMechConfig::default(), Vec::new());
        let report = replayer
            .run(vec![ReplayEvent::PortUp {
                port_id: "gone".to_string(),
            }])
            .await;
        assert_eq!(report.applied, 1);
        assert!(report.failed.is_empty());
        assert_eq!(replayer.plugin().port_status("gone"), None);
    }
}
