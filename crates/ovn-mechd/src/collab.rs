//! Interfaces of the services the driver depends on but does not own.
//!
//! The composition root hands implementations of these traits to
//! [`OvnMechDriver`](crate::OvnMechDriver). Tests and the demonstration
//! binary use the in-memory versions from [`crate::standalone`].

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use ovn_nb_common::model::{Network, Port, Segment};
use ovn_nb_common::PluginError;

use crate::error::DriverResult;

/// Datapath type of a userspace (DPDK) Open vSwitch.
pub const CHASSIS_DATAPATH_NETDEV: &str = "netdev";
/// Interface type advertised by chassis that can plug vhost-user ports.
pub const CHASSIS_IFACE_DPDKVHOSTUSER: &str = "dpdkvhostuser";

/// What a chassis reports about itself for port binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct ChassisBindData {
    #[serde(default)]
    pub datapath_type: String,
    #[serde(default)]
    pub iface_types: Vec<String>,
    /// Physical networks mapped to bridges on the chassis.
    #[serde(default)]
    pub physnets: BTreeSet<String>,
}

impl ChassisBindData {
    /// A userspace datapath that can plug vhost-user sockets.
    pub fn supports_vhost_user(&self) -> bool {
        self.datapath_type == CHASSIS_DATAPATH_NETDEV
            && self
                .iface_types
                .iter()
                .any(|t| t == CHASSIS_IFACE_DPDKVHOSTUSER)
    }
}

/// Read-only view of the chassis registered in the southbound database.
pub trait ChassisStore: Send + Sync {
    fn chassis_exists(&self, host: &str) -> bool;

    /// `None` when no chassis is registered for `host`.
    fn get_chassis_data_for_port_bind(&self, host: &str) -> Option<ChassisBindData>;

    /// Physical networks of every chassis, keyed by hostname.
    fn get_chassis_hostname_and_physnets(&self) -> BTreeMap<String, BTreeSet<String>>;
}

/// Kind of resource a provisioning block is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProvisioningResource {
    Port,
}

/// Entity that clears port provisioning blocks (the L2 agent role).
pub const L2_AGENT_ENTITY: &str = "L2";

/// Provisioning blocks held in the entity database.
pub trait ProvisioningBlocks: Send + Sync {
    fn add_provisioning_component(
        &self,
        object_id: &str,
        resource: ProvisioningResource,
        entity: &str,
    ) -> Result<(), PluginError>;

    fn provisioning_complete(
        &self,
        object_id: &str,
        resource: ProvisioningResource,
        entity: &str,
    ) -> Result<(), PluginError>;
}

/// Segment-to-host reachability kept by the segments service.
pub trait SegmentDb: Send + Sync {
    /// Segments on any of the given physical networks.
    fn get_segments_with_physnets(&self, physnets: &BTreeSet<String>) -> Result<Vec<Segment>, PluginError>;

    /// Replaces the set of segments reachable from `host`.
    fn update_segment_host_mapping(
        &self,
        host: &str,
        segment_ids: &BTreeSet<String>,
    ) -> Result<(), PluginError>;

    /// Adds `hosts` to the hosts reachable from `segment_id`.
    fn map_segment_to_hosts(
        &self,
        segment_id: &str,
        hosts: &BTreeSet<String>,
    ) -> Result<(), PluginError>;
}

/// QoS extension. All methods default to doing nothing.
pub trait QosDriver: Send + Sync {
    /// Northbound port options that implement the port's QoS policy.
    fn get_qos_options(&self, _port: &Port) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn update_network(&self, _network: &Network, _original: &Network) {}

    fn update_port(&self, _port: &Port, _original: &Port) {}
}

/// QoS driver used when no QoS extension is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoQos;

impl QosDriver for NoQos {}

/// Bulk reconciliation between the entity database and OVN.
#[async_trait]
pub trait DbSynchronizer: Send + Sync {
    fn name(&self) -> &str;

    async fn sync(&self) -> DriverResult<()>;
}
