//! OvnMechDriver implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ovn_nb_common::model::{Port, SecurityGroupRule, Segment};
use ovn_nb_common::naming::{
    ovn_name, ovn_provnet_port_name, EXT_ID_NETWORK_NAME, EXT_ID_PORT_NAME,
};
use ovn_nb_common::rows::{table, Acl};
use ovn_nb_common::{
    AclUpdateMode, CorePlugin, LspFields, MechanismDriver, NbCommand, NbStore, NbStoreExt,
    NetworkContext, PortContext, SubnetContext, Transaction,
};
use ovn_types::{IpVersion, NetworkType, PortStatus, VlanTag};
use serde::Deserialize;

use crate::acl::{
    acl_port_ips, enforced_security_groups, port_create_commands, port_delete_commands,
    security_group_commands, AclCompiler, DefaultAclCompiler, PortSecurityGroupDiff,
    SecurityGroupCache, SecurityGroupEvent, SubnetCache,
};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::binding::BindingNegotiator;
use crate::collab::{
    ChassisStore, DbSynchronizer, NoQos, ProvisioningBlocks, ProvisioningResource, QosDriver,
    SegmentDb, L2_AGENT_ENTITY,
};
use crate::config::OvnMechConfig;
use crate::dhcp::{
    compose_subnet_commands, delete_subnet_commands, existing_server_mac, port_dhcp_options,
    subnet_dhcp_options,
};
use crate::error::{DriverError, DriverResult};
use crate::port_info::{port_security_enabled, OvnPortInfo, UNKNOWN_ADDR};
use crate::profile::BindingProfile;
use crate::provisioning::is_port_provisioning_required;

const SOURCE: &str = "OvnMechDriver";

/// Name the driver registers under.
pub const DRIVER_NAME: &str = "ovn";

const LSP_TYPE_LOCALNET: &str = "localnet";
const LOCALNET_NETWORK_NAME: &str = "network_name";

/// Kind of worker process a start notification comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Api,
    Rpc,
    /// The dedicated worker that monitors OVN and runs bulk syncs.
    Ovn,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerKind::Api => "api",
            WorkerKind::Rpc => "rpc",
            WorkerKind::Ovn => "ovn",
        };
        f.write_str(s)
    }
}

/// A security group rule change reported by the entity database.
#[derive(Debug, Clone, Copy)]
pub enum RuleNotification<'a> {
    Created(&'a SecurityGroupRule),
    /// The rule is about to be deleted and can still be read.
    Deleting(&'a str),
}

/// Services the driver talks to, handed over by the composition root.
#[derive(Clone)]
pub struct Collaborators {
    pub nb: Arc<dyn NbStore>,
    pub plugin: Arc<dyn CorePlugin>,
    pub chassis: Arc<dyn ChassisStore>,
    pub provisioning: Arc<dyn ProvisioningBlocks>,
    pub segments: Arc<dyn SegmentDb>,
    pub qos: Arc<dyn QosDriver>,
    pub acl: Arc<dyn AclCompiler>,
    /// Run by the OVN worker on start, in order.
    pub synchronizers: Vec<Arc<dyn DbSynchronizer>>,
}

impl Collaborators {
    /// Collaborators with no QoS extension, the default ACL compiler and no
    /// synchronizers.
    pub fn new(
        nb: Arc<dyn NbStore>,
        plugin: Arc<dyn CorePlugin>,
        chassis: Arc<dyn ChassisStore>,
        provisioning: Arc<dyn ProvisioningBlocks>,
        segments: Arc<dyn SegmentDb>,
    ) -> Self {
        Self {
            nb,
            plugin,
            chassis,
            provisioning,
            segments,
            qos: Arc::new(NoQos),
            acl: Arc::new(DefaultAclCompiler),
            synchronizers: Vec::new(),
        }
    }

    pub fn with_qos(mut self, qos: Arc<dyn QosDriver>) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_acl_compiler(mut self, acl: Arc<dyn AclCompiler>) -> Self {
        self.acl = acl;
        self
    }

    pub fn with_synchronizer(mut self, synchronizer: Arc<dyn DbSynchronizer>) -> Self {
        self.synchronizers.push(synchronizer);
        self
    }
}

/// The OVN ML2 mechanism driver.
///
/// Precommit hooks validate and insert provisioning blocks without touching
/// the northbound database. Postcommit hooks batch their northbound writes
/// into one transaction per hook and propagate failures unchanged.
pub struct OvnMechDriver {
    config: OvnMechConfig,
    collab: Collaborators,
}

impl fmt::Debug for OvnMechDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OvnMechDriver")
            .field("config", &self.config)
            .field("synchronizers", &self.collab.synchronizers.len())
            .finish()
    }
}

impl OvnMechDriver {
    pub fn new(config: OvnMechConfig, collab: Collaborators) -> Self {
        info_log!(
            SOURCE,
            security_groups_enabled = config.security_groups_enabled,
            "Starting OVN mechanism driver"
        );
        Self { config, collab }
    }

    pub fn config(&self) -> &OvnMechConfig {
        &self.config
    }

    pub fn sg_enabled(&self) -> bool {
        self.config.security_groups_enabled
    }

    /// Extra workers the driver needs besides the API and RPC workers.
    pub fn workers(&self) -> Vec<WorkerKind> {
        vec![WorkerKind::Ovn]
    }

    fn nb(&self) -> &dyn NbStore {
        self.collab.nb.as_ref()
    }

    /// Commits `txn` and records the outcome.
    async fn commit(
        &self,
        txn: Transaction<'_, dyn NbStore + '_>,
        record: AuditRecord,
    ) -> DriverResult<()> {
        let result = txn.commit().await;
        audit_log!(record.with_result(&result));
        result?;
        Ok(())
    }

    fn deny(
        &self,
        category: AuditCategory,
        action: &str,
        object_type: &str,
        object_id: &str,
        err: &DriverError,
    ) {
        if err.is_validation() {
            audit_log!(AuditRecord::new(category, SOURCE, action)
                .with_object_id(object_id)
                .with_object_type(object_type)
                .with_error(err.to_string())
                .with_outcome(AuditOutcome::Denied));
        }
    }

    // ---- validation ----

    /// Rejects networks with a segment of an unsupported type.
    pub fn validate_network_segments(&self, segments: &[Segment]) -> DriverResult<()> {
        for segment in segments {
            debug_log!(
                SOURCE,
                network_type = %segment.network_type,
                segmentation_id = ?segment.segmentation_id,
                physical_network = ?segment.physical_network,
                "Validating network segment"
            );
            if !segment.network_type.is_supported() {
                return Err(DriverError::invalid_input(
                    "network_type",
                    format!("Network type {} is not supported", segment.network_type),
                ));
            }
        }
        Ok(())
    }

    /// Validates the binding profile, checking that a parent port exists.
    pub fn validate_binding_profile(&self, port: &Port) -> DriverResult<BindingProfile> {
        let profile = BindingProfile::parse(&port.binding_profile)?;
        if let Some(parent_name) = profile.parent_name() {
            self.collab.plugin.get_port(parent_name)?;
        }
        Ok(profile)
    }

    fn port_precommit(&self, ctx: &PortContext, original_host: Option<&str>) -> DriverResult<()> {
        let port = &ctx.current;
        self.validate_binding_profile(port)?;
        if is_port_provisioning_required(
            port,
            ctx.host.as_deref(),
            original_host,
            self.collab.chassis.as_ref(),
        ) {
            self.insert_port_provisioning_block(&port.id)?;
        }
        Ok(())
    }

    fn insert_port_provisioning_block(&self, port_id: &str) -> DriverResult<()> {
        self.collab.provisioning.add_provisioning_component(
            port_id,
            ProvisioningResource::Port,
            L2_AGENT_ENTITY,
        )?;
        audit_log!(AuditRecord::new(AuditCategory::PortBinding, SOURCE, "add_provisioning_block")
            .with_object_id(port_id)
            .with_object_type("port"));
        Ok(())
    }

    // ---- ports ----

    /// Logical switch port columns for `port`, with DHCP references
    /// resolved against the northbound database.
    ///
    /// `qos_options` overrides what the QoS driver would return.
    pub fn get_ovn_port_options(
        &self,
        port: &Port,
        qos_options: Option<BTreeMap<String, String>>,
    ) -> DriverResult<OvnPortInfo> {
        let profile = self.validate_binding_profile(port)?;
        let qos_options = qos_options.unwrap_or_else(|| self.collab.qos.get_qos_options(port));
        let psec = port_security_enabled(port, self.config.port_security_enabled_default);
        let dhcpv4 = port_dhcp_options(self.nb(), port, IpVersion::V4)?;
        let dhcpv6 = port_dhcp_options(self.nb(), port, IpVersion::V6)?;
        Ok(OvnPortInfo::new(port, &profile, qos_options, psec).with_dhcp(dhcpv4, dhcpv6))
    }

    /// Groups whose address sets and ACLs apply to `port`. Empty with
    /// security groups disabled.
    fn port_security_groups(&self, port: &Port, skip_trusted: bool) -> BTreeSet<String> {
        if !self.sg_enabled() {
            return BTreeSet::new();
        }
        enforced_security_groups(port, self.config.port_security_enabled_default, skip_trusted)
    }

    fn compile_port_acls(&self, port: &Port, sg_ids: &BTreeSet<String>) -> DriverResult<Vec<Acl>> {
        if sg_ids.is_empty() {
            return Ok(Vec::new());
        }
        let plugin = self.collab.plugin.as_ref();
        let mut sg_cache = SecurityGroupCache::new(plugin);
        let mut subnet_cache = SubnetCache::new(plugin);
        let acls = self
            .collab
            .acl
            .port_acls(port, sg_ids, &mut sg_cache, &mut subnet_cache)?;
        debug_log!(
            SOURCE,
            port_id = %port.id,
            groups = sg_cache.len(),
            subnets = subnet_cache.len(),
            "Compiled {} ACLs",
            acls.len()
        );
        Ok(acls)
    }

    /// Creates the logical switch port with its ACLs, DHCP rows and
    /// address-set entries in one transaction.
    pub async fn create_port_in_ovn(&self, port: &Port, info: OvnPortInfo) -> DriverResult<()> {
        let lswitch = ovn_name(&port.network_id);
        let nb = self.nb();

        // The network may have been created through another worker whose
        // write has not reached this replica yet.
        self.config
            .switch_wait
            .wait_for(table::LOGICAL_SWITCH, &lswitch, || {
                Ok(nb.get_logical_switch(&lswitch)?.is_some())
            })
            .await?;

        let sg_ids = self.port_security_groups(port, true);
        let acls = self.compile_port_acls(port, &sg_ids)?;

        let OvnPortInfo {
            port_type,
            options,
            addresses,
            port_security,
            parent_name,
            tag,
            dhcpv4_options,
            dhcpv6_options,
        } = info;

        let mut txn = nb.transaction(true);
        let dhcpv4_options = dhcpv4_options.into_ref(&mut txn);
        let dhcpv6_options = dhcpv6_options.into_ref(&mut txn);
        txn.add(NbCommand::CreateLogicalSwitchPort {
            lport: port.id.clone(),
            lswitch: lswitch.clone(),
            fields: LspFields {
                port_type: Some(port_type),
                addresses: Some(addresses),
                port_security,
                external_ids: port_external_ids(port),
                options,
                parent_name,
                tag,
                enabled: Some(port.admin_state_up),
                dhcpv4_options,
                dhcpv6_options,
            },
        });
        let acl_count = acls.len();
        for acl in acls {
            txn.add(NbCommand::AddAcl {
                lswitch: lswitch.clone(),
                acl,
            });
        }
        // A missing address set fails the port: the group is out of sync.
        if !port.fixed_ips.is_empty() {
            txn.extend(port_create_commands(&sg_ids, &acl_port_ips(port)));
        }

        self.commit(
            txn,
            AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "create_port")
                .with_object_id(port.id.clone())
                .with_object_type(table::LOGICAL_SWITCH_PORT)
                .with_details(serde_json::json!({
                    "lswitch": lswitch,
                    "security_groups": sg_ids,
                    "acls": acl_count,
                })),
        )
        .await
    }

    /// Brings the logical switch port, its ACLs and its address-set entries
    /// in line with `port`.
    pub async fn update_port_in_ovn(
        &self,
        original: &Port,
        port: &Port,
        info: OvnPortInfo,
    ) -> DriverResult<()> {
        let nb = self.nb();
        let OvnPortInfo {
            port_type,
            mut options,
            addresses,
            port_security,
            parent_name,
            tag,
            dhcpv4_options,
            dhcpv6_options,
        } = info;

        // Router ports keep the type and addresses the router code set.
        let (port_type, addresses) = if port.is_router_port() {
            options.extend(nb.get_router_port_options(&port.id)?);
            (None, None)
        } else {
            (Some(port_type), Some(addresses))
        };

        let old_groups = self.port_security_groups(original, true);
        let new_groups = self.port_security_groups(port, true);
        let diff = PortSecurityGroupDiff::new(&old_groups, &new_groups, original, port);
        let acls = if self.sg_enabled() && diff.needs_acl_refresh() {
            Some(self.compile_port_acls(port, &new_groups)?)
        } else {
            None
        };

        let mut txn = nb.transaction(true);
        let dhcpv4_options = dhcpv4_options.into_ref(&mut txn);
        let dhcpv6_options = dhcpv6_options.into_ref(&mut txn);
        // Fails when the port is gone so new DHCP rows and ACLs are not
        // orphaned.
        txn.add(NbCommand::SetLogicalSwitchPort {
            lport: port.id.clone(),
            fields: LspFields {
                port_type,
                addresses,
                port_security,
                external_ids: port_external_ids(port),
                options,
                parent_name,
                tag,
                enabled: Some(port.admin_state_up),
                dhcpv4_options,
                dhcpv6_options,
            },
            if_exists: false,
        });
        if let Some(acls) = acls {
            txn.add(NbCommand::UpdateAcls {
                port_acls: BTreeMap::from([(port.id.clone(), acls)]),
                mode: AclUpdateMode::Replace,
            });
        }
        if !port.fixed_ips.is_empty() || !original.fixed_ips.is_empty() {
            txn.extend(diff.address_set_commands(&acl_port_ips(original), &acl_port_ips(port)));
        }

        self.commit(
            txn,
            AuditRecord::new(AuditCategory::ResourceModify, SOURCE, "update_port")
                .with_object_id(port.id.clone())
                .with_object_type(table::LOGICAL_SWITCH_PORT)
                .with_details(serde_json::json!({
                    "attached": diff.attached,
                    "detached": diff.detached,
                    "addresses_changed": diff.addresses_changed,
                })),
        )
        .await?;

        self.collab.qos.update_port(port, original);
        Ok(())
    }

    // ---- subnets ----

    async fn add_subnet_dhcp_options_in_ovn(
        &self,
        ctx: &SubnetContext,
        action: &str,
    ) -> DriverResult<()> {
        let subnet = &ctx.current;
        if subnet.is_slaac() {
            debug_log!(
                SOURCE,
                subnet_id = %subnet.id,
                "Skipping DHCP options for SLAAC subnet"
            );
            return Ok(());
        }

        let nb = self.nb();
        let existing = nb.get_subnet_dhcp_options(&subnet.id)?;
        let spec = subnet_dhcp_options(
            subnet,
            &ctx.network,
            &self.config,
            existing_server_mac(existing.as_ref()),
        );
        let commands = compose_subnet_commands(nb, &subnet.id, &spec, existing.as_ref())?;

        let mut txn = nb.transaction(true);
        txn.extend(commands);
        self.commit(
            txn,
            AuditRecord::new(AuditCategory::ResourceModify, SOURCE, action)
                .with_object_id(subnet.id.clone())
                .with_object_type(table::DHCP_OPTIONS)
                .with_details(serde_json::json!({
                    "cidr": subnet.cidr.to_string(),
                    "enable_dhcp": subnet.enable_dhcp,
                })),
        )
        .await
    }

    // ---- security groups ----

    /// Keeps a group's address sets in step with a group lifecycle event.
    pub async fn process_security_group(
        &self,
        sg_id: &str,
        sg_name: &str,
        event: SecurityGroupEvent,
    ) -> DriverResult<()> {
        let mut txn = self.nb().transaction(true);
        txn.extend(security_group_commands(sg_id, sg_name, event));
        let category = match event {
            SecurityGroupEvent::Created => AuditCategory::ResourceCreate,
            SecurityGroupEvent::Updated => AuditCategory::ResourceModify,
            SecurityGroupEvent::Deleting => AuditCategory::ResourceDelete,
        };
        self.commit(
            txn,
            AuditRecord::new(category, SOURCE, "process_security_group")
                .with_object_id(sg_id)
                .with_object_type(table::ADDRESS_SET)
                .with_details(serde_json::json!({ "name": sg_name })),
        )
        .await
    }

    /// Adds or removes the ACL `rule` compiles to on every port of the
    /// group, in one transaction. Trusted ports are skipped.
    pub async fn update_acls_for_security_group(
        &self,
        sg_id: &str,
        rule: &SecurityGroupRule,
        is_add: bool,
    ) -> DriverResult<()> {
        if !self.sg_enabled() {
            return Ok(());
        }

        let ports = self.collab.plugin.get_ports_in_security_group(sg_id)?;
        let port_acls: BTreeMap<String, Vec<Acl>> = ports
            .iter()
            .filter(|port| !port.is_trusted())
            .filter_map(|port| {
                self.collab
                    .acl
                    .rule_acl(port, rule)
                    .map(|acl| (port.id.clone(), vec![acl]))
            })
            .collect();
        if port_acls.is_empty() {
            debug_log!(
                SOURCE,
                sg_id = %sg_id,
                rule_id = %rule.id,
                "No port of the group is affected by the rule"
            );
            return Ok(());
        }

        let ports_affected = port_acls.len();
        let mode = if is_add {
            AclUpdateMode::Add
        } else {
            AclUpdateMode::Remove
        };
        let mut txn = self.nb().transaction(true);
        txn.add(NbCommand::UpdateAcls { port_acls, mode });
        self.commit(
            txn,
            AuditRecord::new(AuditCategory::SecurityPolicy, SOURCE, "update_acls_for_security_group")
                .with_object_id(sg_id)
                .with_object_type(table::ACL)
                .with_details(serde_json::json!({
                    "rule_id": rule.id,
                    "add": is_add,
                    "ports": ports_affected,
                })),
        )
        .await
    }

    /// Adds the ACLs of a new rule, or removes those of a rule about to be
    /// deleted.
    ///
    /// A failure leaves OVN out of sync with the entity database until the
    /// next full sync; it is logged and returned.
    pub async fn process_security_group_rule(
        &self,
        notification: RuleNotification<'_>,
    ) -> DriverResult<()> {
        let result = match notification {
            RuleNotification::Created(rule) => {
                self.update_acls_for_security_group(&rule.security_group_id, rule, true)
                    .await
            }
            RuleNotification::Deleting(rule_id) => {
                match self.collab.plugin.get_security_group_rule(rule_id) {
                    Ok(rule) => {
                        self.update_acls_for_security_group(&rule.security_group_id, &rule, false)
                            .await
                    }
                    Err(e) => Err(e.into()),
                }
            }
        };
        if let Err(e) = &result {
            warn_log!(
                SOURCE,
                error = %e,
                "Security group rule update failed, OVN is out of sync until the next full sync"
            );
        }
        result
    }

    // ---- port status ----

    /// OVN reports the port up: the L2 provisioning block is cleared.
    pub fn set_port_status_up(&self, port_id: &str) -> DriverResult<()> {
        info_log!(SOURCE, port_id = %port_id, "OVN reports status up for port");
        self.collab.provisioning.provisioning_complete(
            port_id,
            ProvisioningResource::Port,
            L2_AGENT_ENTITY,
        )?;
        audit_log!(AuditRecord::new(AuditCategory::PortBinding, SOURCE, "set_port_status_up")
            .with_object_id(port_id)
            .with_object_type("port"));
        Ok(())
    }

    /// OVN reports the port down: a provisioning block is inserted, then
    /// the port is marked down. The block goes first so no other writer
    /// can activate the port in between.
    ///
    /// Ports that vanished concurrently are only logged.
    pub fn set_port_status_down(&self, port_id: &str) -> DriverResult<()> {
        info_log!(SOURCE, port_id = %port_id, "OVN reports status down for port");
        let result = self.mark_port_down(port_id);
        match result {
            Err(DriverError::Plugin(e)) if e.is_benign_race() => {
                debug_log!(
                    SOURCE,
                    port_id = %port_id,
                    error = %e,
                    "Port not found during OVN status down report"
                );
                Ok(())
            }
            other => other,
        }
    }

    fn mark_port_down(&self, port_id: &str) -> DriverResult<()> {
        let port = self.collab.plugin.get_port(port_id)?;
        self.insert_port_provisioning_block(&port.id)?;
        self.collab
            .plugin
            .update_port_status(&port.id, PortStatus::Down)?;
        Ok(())
    }

    // ---- segments ----

    /// Replaces the segments reachable from `host` with the flat and VLAN
    /// segments on `physnets`. Does nothing without a host.
    pub fn update_segment_host_mapping(
        &self,
        host: &str,
        physnets: &BTreeSet<String>,
    ) -> DriverResult<()> {
        if host.is_empty() {
            return Ok(());
        }
        let segment_ids: BTreeSet<String> = self
            .collab
            .segments
            .get_segments_with_physnets(physnets)?
            .into_iter()
            .filter(|s| matches!(s.network_type, NetworkType::Flat | NetworkType::Vlan))
            .map(|s| s.id)
            .collect();
        debug_log!(
            SOURCE,
            host = %host,
            segments = ?segment_ids,
            "Updating segment host mapping"
        );
        self.collab
            .segments
            .update_segment_host_mapping(host, &segment_ids)?;
        Ok(())
    }

    /// Maps a new segment to every chassis whose bridge mappings cover its
    /// physical network.
    pub fn add_segment_host_mapping_for_segment(&self, segment: &Segment) -> DriverResult<()> {
        let Some(physnet) = segment.physical_network.as_deref() else {
            return Ok(());
        };
        let hosts: BTreeSet<String> = self
            .collab
            .chassis
            .get_chassis_hostname_and_physnets()
            .into_iter()
            .filter(|(_, physnets)| physnets.contains(physnet))
            .map(|(host, _)| host)
            .collect();
        self.collab.segments.map_segment_to_hosts(&segment.id, &hosts)?;
        Ok(())
    }

    // ---- process start ----

    /// Runs the bulk synchronizers, on the OVN worker only.
    pub async fn post_fork_initialize(&self, worker: WorkerKind) -> DriverResult<()> {
        if worker != WorkerKind::Ovn {
            debug_log!(SOURCE, worker = %worker, "Worker started, no sync needed");
            return Ok(());
        }
        for synchronizer in &self.collab.synchronizers {
            info_log!(SOURCE, synchronizer = synchronizer.name(), "Starting database sync");
            let result = synchronizer.sync().await;
            audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, SOURCE, "sync")
                .with_object_id(synchronizer.name())
                .with_result(&result));
            result?;
        }
        Ok(())
    }
}

fn port_external_ids(port: &Port) -> BTreeMap<String, String> {
    BTreeMap::from([(EXT_ID_PORT_NAME.to_string(), port.name.clone())])
}

#[async_trait]
impl MechanismDriver for OvnMechDriver {
    type Error = DriverError;

    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn create_network_precommit(&self, ctx: &NetworkContext) -> DriverResult<()> {
        let result = self.validate_network_segments(&ctx.network_segments);
        if let Err(e) = &result {
            self.deny(
                AuditCategory::ResourceCreate,
                "create_network_precommit",
                "network",
                &ctx.current.id,
                e,
            );
        }
        result
    }

    async fn create_network_postcommit(&self, ctx: &NetworkContext) -> DriverResult<()> {
        let network = &ctx.current;
        let lswitch = ovn_name(&network.id);
        let external_ids =
            BTreeMap::from([(EXT_ID_NETWORK_NAME.to_string(), network.name.clone())]);

        let mut txn = self.nb().transaction(true);
        txn.add(NbCommand::create_logical_switch(lswitch.clone(), external_ids));
        let provider = ctx.provider_segment();
        if let Some(segment) = provider {
            let physnet = segment.physical_network.clone().unwrap_or_default();
            let tag = segment
                .segmentation_id
                .filter(|id| *id != 0)
                .and_then(|id| VlanTag::new(i64::from(id)).ok());
            txn.add(NbCommand::CreateLogicalSwitchPort {
                lport: ovn_provnet_port_name(&network.id),
                lswitch: lswitch.clone(),
                fields: LspFields {
                    port_type: Some(LSP_TYPE_LOCALNET.to_string()),
                    addresses: Some(vec![UNKNOWN_ADDR.to_string()]),
                    options: BTreeMap::from([(LOCALNET_NETWORK_NAME.to_string(), physnet)]),
                    tag,
                    ..Default::default()
                },
            });
        }

        self.commit(
            txn,
            AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "create_network_postcommit")
                .with_object_id(network.id.clone())
                .with_object_type(table::LOGICAL_SWITCH)
                .with_details(serde_json::json!({
                    "lswitch": lswitch,
                    "physical_network": provider.and_then(|s| s.physical_network.clone()),
                })),
        )
        .await
    }

    fn update_network_precommit(&self, ctx: &NetworkContext) -> DriverResult<()> {
        let result = self.validate_network_segments(&ctx.network_segments);
        if let Err(e) = &result {
            self.deny(
                AuditCategory::ResourceModify,
                "update_network_precommit",
                "network",
                &ctx.current.id,
                e,
            );
        }
        result
    }

    async fn update_network_postcommit(&self, ctx: &NetworkContext) -> DriverResult<()> {
        let network = &ctx.current;
        let original = ctx.original.as_ref().unwrap_or(network);
        if network.name != original.name {
            let mut txn = self.nb().transaction(true);
            txn.add(NbCommand::SetLogicalSwitchExtId {
                name: ovn_name(&network.id),
                key: EXT_ID_NETWORK_NAME.to_string(),
                value: network.name.clone(),
                if_exists: false,
            });
            self.commit(
                txn,
                AuditRecord::new(AuditCategory::ResourceModify, SOURCE, "update_network_postcommit")
                    .with_object_id(network.id.clone())
                    .with_object_type(table::LOGICAL_SWITCH)
                    .with_details(serde_json::json!({
                        "old_name": original.name,
                        "new_name": network.name,
                    })),
            )
            .await?;
        }
        self.collab.qos.update_network(network, original);
        Ok(())
    }

    async fn delete_network_postcommit(&self, ctx: &NetworkContext) -> DriverResult<()> {
        let network = &ctx.current;
        let mut txn = self.nb().transaction(true);
        txn.add(NbCommand::delete_logical_switch(ovn_name(&network.id)));
        self.commit(
            txn,
            AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "delete_network_postcommit")
                .with_object_id(network.id.clone())
                .with_object_type(table::LOGICAL_SWITCH),
        )
        .await
    }

    async fn create_subnet_postcommit(&self, ctx: &SubnetContext) -> DriverResult<()> {
        if !ctx.current.enable_dhcp {
            return Ok(());
        }
        self.add_subnet_dhcp_options_in_ovn(ctx, "create_subnet_postcommit")
            .await
    }

    async fn update_subnet_postcommit(&self, ctx: &SubnetContext) -> DriverResult<()> {
        let was_enabled = ctx.original.as_ref().is_some_and(|s| s.enable_dhcp);
        if !ctx.current.enable_dhcp && !was_enabled {
            return Ok(());
        }
        self.add_subnet_dhcp_options_in_ovn(ctx, "update_subnet_postcommit")
            .await
    }

    async fn delete_subnet_postcommit(&self, ctx: &SubnetContext) -> DriverResult<()> {
        let subnet = &ctx.current;
        let nb = self.nb();
        let commands = delete_subnet_commands(nb, &subnet.id)?;
        let rows = commands.len();
        let mut txn = nb.transaction(true);
        txn.extend(commands);
        self.commit(
            txn,
            AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "delete_subnet_postcommit")
                .with_object_id(subnet.id.clone())
                .with_object_type(table::DHCP_OPTIONS)
                .with_details(serde_json::json!({ "rows": rows })),
        )
        .await
    }

    fn create_port_precommit(&self, ctx: &PortContext) -> DriverResult<()> {
        let result = self.port_precommit(ctx, None);
        if let Err(e) = &result {
            self.deny(
                AuditCategory::ResourceCreate,
                "create_port_precommit",
                "port",
                &ctx.current.id,
                e,
            );
        }
        result
    }

    async fn create_port_postcommit(&self, ctx: &PortContext) -> DriverResult<()> {
        let port = &ctx.current;
        let info = self.get_ovn_port_options(port, None)?;
        self.create_port_in_ovn(port, info).await
    }

    fn update_port_precommit(&self, ctx: &PortContext) -> DriverResult<()> {
        let result = self.port_precommit(ctx, ctx.original_host.as_deref());
        if let Err(e) = &result {
            self.deny(
                AuditCategory::ResourceModify,
                "update_port_precommit",
                "port",
                &ctx.current.id,
                e,
            );
        }
        result
    }

    async fn update_port_postcommit(&self, ctx: &PortContext) -> DriverResult<()> {
        let port = &ctx.current;
        let original = ctx.original.as_ref().unwrap_or(port);
        let info = self.get_ovn_port_options(port, None)?;
        self.update_port_in_ovn(original, port, info).await
    }

    async fn delete_port_postcommit(&self, ctx: &PortContext) -> DriverResult<()> {
        let port = &ctx.current;
        let lswitch = ovn_name(&port.network_id);

        let mut txn = self.nb().transaction(true);
        txn.add(NbCommand::delete_logical_switch_port(port.id.clone(), lswitch.clone()));
        txn.add(NbCommand::DeletePortAcls {
            lswitch,
            lport: port.id.clone(),
        });
        // Trusted ports are removed too, whatever their state when added.
        let sg_ids = self.port_security_groups(port, false);
        if !port.fixed_ips.is_empty() {
            txn.extend(port_delete_commands(&sg_ids, &acl_port_ips(port)));
        }
        self.commit(
            txn,
            AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "delete_port_postcommit")
                .with_object_id(port.id.clone())
                .with_object_type(table::LOGICAL_SWITCH_PORT)
                .with_details(serde_json::json!({ "security_groups": sg_ids })),
        )
        .await
    }

    fn bind_port(&self, ctx: &mut PortContext) {
        BindingNegotiator::new(self.sg_enabled(), &self.config.vhost_sock_dir)
            .negotiate(self.collab.chassis.as_ref(), ctx);
    }
}
