//! Port binding negotiation.
//!
//! Matches a port against the capabilities its target chassis reports and
//! picks the first candidate segment the chassis can serve. Not binding is
//! a normal outcome: the port is left for another driver or a lower
//! binding level.

use std::path::Path;

use ovn_nb_common::model::Segment;
use ovn_nb_common::naming::ovn_vhu_sockpath;
use ovn_nb_common::{PortContext, VifDetails, VifType};
use ovn_types::VnicType;

use crate::audit::{AuditCategory, AuditRecord};
use crate::collab::{ChassisBindData, ChassisStore};

const SOURCE: &str = "PortBinding";

/// Mode of the vhost-user socket; OVS is the server side.
pub const VHOST_USER_MODE_CLIENT: &str = "client";

/// Vnic types the driver can bind and provision.
pub fn is_vnic_supported(vnic_type: &VnicType) -> bool {
    matches!(vnic_type, VnicType::Normal)
}

/// Where a negotiation stands.
///
/// `Bound` and `Rejected` are terminal. `Rejected` is silent: it means "no
/// decision", never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    SegmentEvaluated,
    Bound,
    Rejected,
}

impl BindingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BindingState::Bound | BindingState::Rejected)
    }
}

/// Binding inputs that do not change between ports.
#[derive(Debug, Clone)]
pub struct BindingNegotiator<'a> {
    pub sg_enabled: bool,
    pub vhost_sock_dir: &'a Path,
}

impl<'a> BindingNegotiator<'a> {
    pub fn new(sg_enabled: bool, vhost_sock_dir: &'a Path) -> Self {
        Self {
            sg_enabled,
            vhost_sock_dir,
        }
    }

    /// Runs the negotiation and records the binding on `ctx` when one is
    /// found.
    pub fn negotiate(&self, chassis: &dyn ChassisStore, ctx: &mut PortContext) -> BindingState {
        let port_id = ctx.current.id.clone();
        let vnic_type = &ctx.current.vnic_type;
        if !is_vnic_supported(vnic_type) {
            debug_log!(
                SOURCE,
                port_id = %port_id,
                "Refusing to bind port due to unsupported vnic_type: {}",
                vnic_type
            );
            return BindingState::Rejected;
        }

        let Some(host) = ctx.host.clone() else {
            debug_log!(SOURCE, port_id = %port_id, "Refusing to bind port without a host");
            return BindingState::Rejected;
        };
        let Some(chassis_data) = chassis.get_chassis_data_for_port_bind(&host) else {
            debug_log!(
                SOURCE,
                port_id = %port_id,
                host = %host,
                "Refusing to bind port due to no OVN chassis for host"
            );
            return BindingState::Rejected;
        };

        let mut chosen = None;
        for segment in &ctx.segments_to_bind {
            if self.evaluate(&port_id, &host, segment, &chassis_data) == BindingState::Bound {
                chosen = Some(segment.id.clone());
                break;
            }
        }

        let Some(segment_id) = chosen else {
            return BindingState::Rejected;
        };
        let (vif_type, vif_details) = self.vif_for(&chassis_data, &port_id);
        audit_log!(AuditRecord::new(AuditCategory::PortBinding, SOURCE, "bind_port")
            .with_object_id(port_id.clone())
            .with_object_type("port")
            .with_details(serde_json::json!({
                "host": host,
                "segment_id": segment_id,
                "vif_type": vif_type.as_str(),
            })));
        ctx.set_binding(segment_id, vif_type, vif_details);
        BindingState::Bound
    }

    fn evaluate(
        &self,
        port_id: &str,
        host: &str,
        segment: &Segment,
        chassis_data: &ChassisBindData,
    ) -> BindingState {
        debug_log!(
            SOURCE,
            port_id = %port_id,
            host = %host,
            network_type = %segment.network_type,
            segmentation_id = ?segment.segmentation_id,
            physical_network = ?segment.physical_network,
            "Attempting to bind port on network segment"
        );

        // Segments predating type validation are still bindable.
        if !segment.network_type.is_supported() {
            info_log!(
                SOURCE,
                port_id = %port_id,
                "Upgrade allowing bind port with unsupported network type: {}",
                segment.network_type
            );
        }

        if segment.network_type.is_provider() {
            let served = segment
                .physical_network
                .as_ref()
                .is_some_and(|physnet| chassis_data.physnets.contains(physnet));
            if !served {
                info_log!(
                    SOURCE,
                    port_id = %port_id,
                    host = %host,
                    chassis_physnets = ?chassis_data.physnets,
                    physical_network = ?segment.physical_network,
                    "Refusing to bind port: chassis bridge mappings do not cover the physical network"
                );
                return BindingState::SegmentEvaluated;
            }
        }
        BindingState::Bound
    }

    /// Vif type and details for a port bound on a chassis.
    pub fn vif_for(&self, chassis_data: &ChassisBindData, port_id: &str) -> (VifType, VifDetails) {
        if chassis_data.supports_vhost_user() {
            let socket = ovn_vhu_sockpath(self.vhost_sock_dir, port_id);
            (
                VifType::VhostUser,
                VifDetails {
                    port_filter: false,
                    vhostuser_mode: Some(VHOST_USER_MODE_CLIENT.to_string()),
                    vhostuser_ovs_plug: Some(true),
                    vhostuser_socket: Some(socket),
                },
            )
        } else {
            (
                VifType::Ovs,
                VifDetails {
                    port_filter: self.sg_enabled,
                    vhostuser_mode: None,
                    vhostuser_ovs_plug: None,
                    vhostuser_socket: None,
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standalone::StaticChassisStore;
    use ovn_nb_common::model::{Network, Port};
    use ovn_types::NetworkType;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn segment(id: &str, network_type: NetworkType, physnet: Option<&str>) -> Segment {
        Segment {
            id: id.to_string(),
            network_type,
            physical_network: physnet.map(str::to_string),
            segmentation_id: Some(100),
        }
    }

    fn chassis(datapath: &str, iface_types: &[&str], physnets: &[&str]) -> StaticChassisStore {
        let store = StaticChassisStore::new();
        store.insert(
            "host1",
            ChassisBindData {
                datapath_type: datapath.to_string(),
                iface_types: iface_types.iter().map(|s| s.to_string()).collect(),
                physnets: physnets.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            },
        );
        store
    }

    fn context(segments: Vec<Segment>) -> PortContext {
        let port = Port::new("0123456789abcdef", "n1", "fa:16:3e:00:00:01".parse().unwrap());
        PortContext::new(port, Network::new("n1", "net"))
            .with_host("host1")
            .with_segments(segments)
    }

    #[test]
    fn test_binds_first_eligible_segment() {
        let store = chassis("system", &[], &["physnet1"]);
        let mut ctx = context(vec![
            segment("seg-vlan-missing", NetworkType::Vlan, Some("physnet2")),
            segment("seg-vlan", NetworkType::Vlan, Some("physnet1")),
            segment("seg-geneve", NetworkType::Geneve, None),
        ]);
        let negotiator = BindingNegotiator::new(true, Path::new("/var/run/openvswitch"));
        assert_eq!(negotiator.negotiate(&store, &mut ctx), BindingState::Bound);

        let binding = ctx.binding().unwrap();
        assert_eq!(binding.segment_id, "seg-vlan");
        assert_eq!(binding.vif_type, VifType::Ovs);
        assert!(binding.vif_details.port_filter);
    }

    #[test]
    fn test_missing_physnet_stays_unbound() {
        let store = chassis("system", &[], &["physnet1"]);
        let mut ctx = context(vec![segment("seg", NetworkType::Vlan, Some("physnet9"))]);
        let negotiator = BindingNegotiator::new(true, Path::new("/tmp"));
        assert_eq!(negotiator.negotiate(&store, &mut ctx), BindingState::Rejected);
        assert!(!ctx.is_bound());
    }

    #[test]
    fn test_unsupported_type_still_binds() {
        let store = chassis("system", &[], &[]);
        let mut ctx = context(vec![segment("seg", NetworkType::Vxlan, None)]);
        let negotiator = BindingNegotiator::new(false, Path::new("/tmp"));
        assert_eq!(negotiator.negotiate(&store, &mut ctx), BindingState::Bound);
        assert!(!ctx.binding().unwrap().vif_details.port_filter);
    }

    #[test]
    fn test_vhost_user_binding() {
        let store = chassis("netdev", &["dpdkvhostuser"], &[]);
        let mut ctx = context(vec![segment("seg", NetworkType::Geneve, None)]);
        let negotiator = BindingNegotiator::new(true, Path::new("/var/run/openvswitch"));
        assert_eq!(negotiator.negotiate(&store, &mut ctx), BindingState::Bound);

        let binding = ctx.binding().unwrap();
        assert_eq!(binding.vif_type, VifType::VhostUser);
        assert_eq!(
            binding.vif_details,
            VifDetails {
                port_filter: false,
                vhostuser_mode: Some("client".to_string()),
                vhostuser_ovs_plug: Some(true),
                vhostuser_socket: Some(PathBuf::from("/var/run/openvswitch/vhu0123456789a")),
            }
        );
    }

    #[test]
    fn test_rejections() {
        let negotiator = BindingNegotiator::new(true, Path::new("/tmp"));

        let store = StaticChassisStore::new();
        let mut ctx = context(vec![segment("seg", NetworkType::Geneve, None)]);
        assert_eq!(negotiator.negotiate(&store, &mut ctx), BindingState::Rejected);

        let store = chassis("system", &[], &[]);
        let mut ctx = context(vec![segment("seg", NetworkType::Geneve, None)]);
        ctx.current.vnic_type = VnicType::Direct;
        assert_eq!(negotiator.negotiate(&store, &mut ctx), BindingState::Rejected);

        let mut ctx = context(Vec::new());
        assert_eq!(negotiator.negotiate(&store, &mut ctx), BindingState::Rejected);
        assert!(BindingState::Rejected.is_terminal());
        assert!(!BindingState::SegmentEvaluated.is_terminal());
    }
}
