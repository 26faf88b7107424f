//! Provisioning-block gate.
//!
//! A port bound to a new host must not go `ACTIVE` before the L2 agent on
//! that host has wired it up. The gate decides whether such a block is
//! needed; the driver inserts it during precommit and clears it when the
//! northbound monitor reports the port up.

use ovn_nb_common::model::Port;
use ovn_types::PortStatus;

use crate::binding::is_vnic_supported;
use crate::collab::ChassisStore;

const SOURCE: &str = "ProvisioningGate";

/// Whether `port` needs a provisioning block before it may become active.
///
/// Every condition must hold; the first one that does not is logged at
/// debug and short-circuits.
pub fn is_port_provisioning_required(
    port: &Port,
    host: Option<&str>,
    original_host: Option<&str>,
    chassis: &dyn ChassisStore,
) -> bool {
    if !is_vnic_supported(&port.vnic_type) {
        debug_log!(
            SOURCE,
            port_id = %port.id,
            "No provisioning block for port due to unsupported vnic_type: {}",
            port.vnic_type
        );
        return false;
    }

    if port.status == PortStatus::Active {
        debug_log!(
            SOURCE,
            port_id = %port.id,
            "No provisioning block for port since it is active"
        );
        return false;
    }

    let Some(host) = host.filter(|h| !h.is_empty()) else {
        debug_log!(
            SOURCE,
            port_id = %port.id,
            "No provisioning block for port since it does not have a host"
        );
        return false;
    };

    if original_host == Some(host) {
        debug_log!(
            SOURCE,
            port_id = %port.id,
            "No provisioning block for port since its host did not change"
        );
        return false;
    }

    if !chassis.chassis_exists(host) {
        debug_log!(
            SOURCE,
            port_id = %port.id,
            host = %host,
            "No provisioning block for port since no OVN chassis for host"
        );
        return false;
    }

    true
}
