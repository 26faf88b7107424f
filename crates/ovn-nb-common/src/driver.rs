//! Mechanism-driver lifecycle contract and hook contexts.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::model::{Network, Port, Segment, Subnet};

/// Context passed to network hooks.
#[derive(Debug, Clone)]
pub struct NetworkContext {
    pub current: Network,
    /// Previous state, only set for updates.
    pub original: Option<Network>,
    pub network_segments: Vec<Segment>,
}

impl NetworkContext {
    pub fn new(current: Network, network_segments: Vec<Segment>) -> Self {
        Self {
            current,
            original: None,
            network_segments,
        }
    }

    pub fn with_original(mut self, original: Network) -> Self {
        self.original = Some(original);
        self
    }

    /// The first segment that carries a physical network, if any.
    pub fn provider_segment(&self) -> Option<&Segment> {
        self.network_segments
            .iter()
            .find(|s| s.physical_network.is_some())
    }
}

/// Context passed to subnet hooks.
#[derive(Debug, Clone)]
pub struct SubnetContext {
    pub current: Subnet,
    pub original: Option<Subnet>,
    /// The network owning the subnet.
    pub network: Network,
}

impl SubnetContext {
    pub fn new(current: Subnet, network: Network) -> Self {
        Self {
            current,
            original: None,
            network,
        }
    }

    pub fn with_original(mut self, original: Subnet) -> Self {
        self.original = Some(original);
        self
    }
}

/// The vif type chosen by a successful binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VifType {
    Ovs,
    VhostUser,
}

impl VifType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            VifType::Ovs => "ovs",
            VifType::VhostUser => "vhostuser",
        }
    }
}

impl fmt::Display for VifType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details handed to the hypervisor agent together with the vif type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VifDetails {
    pub port_filter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vhostuser_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vhostuser_ovs_plug: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vhostuser_socket: Option<PathBuf>,
}

/// A recorded binding decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortBinding {
    pub segment_id: String,
    pub vif_type: VifType,
    pub vif_details: VifDetails,
}

/// Context passed to port hooks and to `bind_port`.
#[derive(Debug, Clone)]
pub struct PortContext {
    pub current: Port,
    pub original: Option<Port>,
    /// The network the port is attached to.
    pub network: Network,
    /// Binding host requested for the port.
    pub host: Option<String>,
    pub original_host: Option<String>,
    /// Candidate segments, in the order the framework offers them.
    pub segments_to_bind: Vec<Segment>,
    binding: Option<PortBinding>,
}

impl PortContext {
    pub fn new(current: Port, network: Network) -> Self {
        Self {
            current,
            original: None,
            network,
            host: None,
            original_host: None,
            segments_to_bind: Vec::new(),
            binding: None,
        }
    }

    pub fn with_original(mut self, original: Port) -> Self {
        self.original = Some(original);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_original_host(mut self, host: impl Into<String>) -> Self {
        self.original_host = Some(host.into());
        self
    }

    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments_to_bind = segments;
        self
    }

    /// The binding profile supplied with the port.
    pub fn binding_profile(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.current.binding_profile
    }

    /// Records the binding decision. The last call wins.
    pub fn set_binding(
        &mut self,
        segment_id: impl Into<String>,
        vif_type: VifType,
        vif_details: VifDetails,
    ) {
        self.binding = Some(PortBinding {
            segment_id: segment_id.into(),
            vif_type,
            vif_details,
        });
    }

    pub fn binding(&self) -> Option<&PortBinding> {
        self.binding.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }
}

/// Lifecycle hooks the framework invokes for every network, subnet and port
/// change.
///
/// # Contract
///
/// - `*_precommit` runs inside the framework's database transaction. It must
///   not perform blocking external I/O. An error rolls the transaction back.
/// - `*_postcommit` runs after the transaction committed and may wait on the
///   northbound database. An error tells the framework to delete the
///   resource that was just committed.
/// - `bind_port` never fails. Leaving the context unbound hands the port to
///   the next driver or binding level.
///
/// Every hook defaults to a no-op so implementations only override what
/// they need.
#[async_trait]
pub trait MechanismDriver: Send + Sync {
    /// Error raised by precommit and postcommit hooks.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the name of this driver (for logging and debugging).
    fn name(&self) -> &str;

    fn create_network_precommit(&self, _ctx: &NetworkContext) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn create_network_postcommit(&self, _ctx: &NetworkContext) -> Result<(), Self::Error> {
        Ok(())
    }

    fn update_network_precommit(&self, _ctx: &NetworkContext) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn update_network_postcommit(&self, _ctx: &NetworkContext) -> Result<(), Self::Error> {
        Ok(())
    }

    fn delete_network_precommit(&self, _ctx: &NetworkContext) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn delete_network_postcommit(&self, _ctx: &NetworkContext) -> Result<(), Self::Error> {
        Ok(())
    }

    fn create_subnet_precommit(&self, _ctx: &SubnetContext) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn create_subnet_postcommit(&self, _ctx: &SubnetContext) -> Result<(), Self::Error> {
        Ok(())
    }

    fn update_subnet_precommit(&self, _ctx: &SubnetContext) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn update_subnet_postcommit(&self, _ctx: &SubnetContext) -> Result<(), Self::Error> {
        Ok(())
    }

    fn delete_subnet_precommit(&self, _ctx: &SubnetContext) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn delete_subnet_postcommit(&self, _ctx: &SubnetContext) -> Result<(), Self::Error> {
        Ok(())
    }

    fn create_port_precommit(&self, _ctx: &PortContext) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn create_port_postcommit(&self, _ctx: &PortContext) -> Result<(), Self::Error> {
        Ok(())
    }

    fn update_port_precommit(&self, _ctx: &PortContext) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn update_port_postcommit(&self, _ctx: &PortContext) -> Result<(), Self::Error> {
        Ok(())
    }

    fn delete_port_precommit(&self, _ctx: &PortContext) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn delete_port_postcommit(&self, _ctx: &PortContext) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Attempts to bind the port to one of `ctx.segments_to_bind`.
    fn bind_port(&self, _ctx: &mut PortContext) {
        // Default: leave unbound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovn_types::{MacAddress, NetworkType};
    use pretty_assertions::assert_eq;

    struct NoopDriver;

    #[async_trait]
    impl MechanismDriver for NoopDriver {
        type Error = std::io::Error;

        fn name(&self) -> &str {
            "noop"
        }
    }

    fn port_ctx() -> PortContext {
        let port = Port::new("p1", "n1", MacAddress::new([0xfa, 0x16, 0x3e, 0, 0, 1]));
        PortContext::new(port, Network::new("n1", "net"))
    }

    #[tokio::test]
    async fn test_default_hooks_are_noops() {
        let driver = NoopDriver;
        let ctx = NetworkContext::new(Network::new("n1", "net"), vec![]);
        assert!(driver.create_network_precommit(&ctx).is_ok());
        assert!(driver.create_network_postcommit(&ctx).await.is_ok());

        let mut pctx = port_ctx();
        driver.bind_port(&mut pctx);
        assert!(!pctx.is_bound());
    }

    #[test]
    fn test_set_binding_last_wins() {
        let mut ctx = port_ctx();
        let details = VifDetails {
            port_filter: true,
            vhostuser_mode: None,
            vhostuser_ovs_plug: None,
            vhostuser_socket: None,
        };
        ctx.set_binding("seg-1", VifType::Ovs, details.clone());
        ctx.set_binding("seg-2", VifType::Ovs, details);
        assert_eq!(ctx.binding().map(|b| b.segment_id.as_str()), Some("seg-2"));
    }

    #[test]
    fn test_provider_segment() {
        let ctx = NetworkContext::new(
            Network::new("n1", "net"),
            vec![
                Segment {
                    id: "s1".into(),
                    network_type: NetworkType::Geneve,
                    physical_network: None,
                    segmentation_id: Some(100),
                },
                Segment {
                    id: "s2".into(),
                    network_type: NetworkType::Vlan,
                    physical_network: Some("physnet1".into()),
                    segmentation_id: Some(42),
                },
            ],
        );
        assert_eq!(ctx.provider_segment().map(|s| s.id.as_str()), Some("s2"));
    }

    #[test]
    fn test_vif_details_serialization_skips_unset() {
        let details = VifDetails {
            port_filter: false,
            vhostuser_mode: None,
            vhostuser_ovs_plug: None,
            vhostuser_socket: None,
        };
        assert_eq!(
            serde_json::to_value(&details).unwrap(),
            serde_json::json!({"port_filter": false})
        );
    }
}
