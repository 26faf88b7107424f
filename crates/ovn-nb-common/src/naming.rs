//! Deterministic northbound names and external-id keys.
//!
//! External agents correlate on these values, so they must never change.

use std::path::{Path, PathBuf};

use ovn_types::IpVersion;

pub const EXT_ID_NETWORK_NAME: &str = "neutron:network_name";
pub const EXT_ID_PORT_NAME: &str = "neutron:port_name";
pub const EXT_ID_SG_NAME: &str = "neutron:security_group_name";
pub const EXT_ID_LPORT: &str = "neutron:lport";
pub const EXT_ID_SUBNET_ID: &str = "subnet_id";
pub const EXT_ID_PORT_ID: &str = "port_id";

/// Prefix of vhost-user socket names.
pub const VHOST_USER_DEVICE_PREFIX: &str = "vhu";
/// Kernel interface names are limited to 14 characters.
const DEVICE_NAME_MAX_LEN: usize = 14;

/// Logical switch name for a network.
pub fn ovn_name(network_id: &str) -> String {
    format!("neutron-{network_id}")
}

/// Name of the localnet port bridging a provider network.
pub fn ovn_provnet_port_name(network_id: &str) -> String {
    format!("provnet-{network_id}")
}

/// Address-set name for a security group and address family.
///
/// Dashes are not valid in match expressions, so they become underscores.
pub fn ovn_addrset_name(sg_id: &str, version: IpVersion) -> String {
    format!("as-{}-{}", version.as_str(), sg_id).replace('-', "_")
}

/// Path of the vhost-user socket for a port.
pub fn ovn_vhu_sockpath(sock_dir: &Path, port_id: &str) -> PathBuf {
    let budget = DEVICE_NAME_MAX_LEN - VHOST_USER_DEVICE_PREFIX.len();
    let suffix: String = port_id.chars().take(budget).collect();
    sock_dir.join(format!("{VHOST_USER_DEVICE_PREFIX}{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_names() {
        assert_eq!(ovn_name("1234"), "neutron-1234");
        assert_eq!(ovn_provnet_port_name("1234"), "provnet-1234");
        assert_eq!(
            ovn_addrset_name("4f0c-88a1", IpVersion::V4),
            "as_ip4_4f0c_88a1"
        );
        assert_eq!(ovn_addrset_name("sg", IpVersion::V6), "as_ip6_sg");
    }

    #[test]
    fn test_vhu_sockpath_truncates_port_id() {
        let path = ovn_vhu_sockpath(
            Path::new("/var/run/openvswitch"),
            "fa0c6aa8-65c7-4b2b-9d9a-1f0c7e1e2c3d",
        );
        assert_eq!(path, PathBuf::from("/var/run/openvswitch/vhufa0c6aa8-65"));
    }
}
