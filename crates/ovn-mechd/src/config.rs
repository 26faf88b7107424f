//! Driver configuration.

use std::path::{Path, PathBuf};

use ovn_nb_common::RetryPolicy;
use ovn_types::{IpAddress, MacAddress};
use serde::Deserialize;

use crate::error::{DriverError, DriverResult};

/// Configuration of the OVN mechanism driver.
///
/// Every field has a default, so an empty YAML document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OvnMechConfig {
    /// Subscribe to security-group events and report `port_filter` on
    /// kernel vifs.
    pub security_groups_enabled: bool,
    /// Port security for ports that do not say either way.
    pub port_security_enabled_default: bool,
    /// DHCPv4 lease time in seconds.
    pub dhcp_default_lease_time: u32,
    /// Fallback DNS servers for subnets without nameservers.
    pub dns_servers: Vec<IpAddress>,
    pub vhost_sock_dir: PathBuf,
    /// Prefix of generated DHCP server MACs.
    pub base_mac: MacAddress,
    /// Wait for a logical switch created by another worker.
    pub switch_wait: RetryPolicy,
    pub log_level: String,
}

impl Default for OvnMechConfig {
    fn default() -> Self {
        Self {
            security_groups_enabled: true,
            port_security_enabled_default: true,
            dhcp_default_lease_time: 43200,
            dns_servers: Vec::new(),
            vhost_sock_dir: PathBuf::from("/var/run/openvswitch"),
            base_mac: MacAddress::new([0xfa, 0x16, 0x3e, 0x00, 0x00, 0x00]),
            switch_wait: RetryPolicy::default(),
            log_level: "info".to_string(),
        }
    }
}

impl OvnMechConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> DriverResult<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| DriverError::config("config", e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn load(path: &Path) -> DriverResult<Self> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| DriverError::config(path.display().to_string(), e.to_string()))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> DriverResult<()> {
        if self.base_mac.is_multicast() {
            return Err(DriverError::config(
                "base_mac",
                format!("{} is a multicast address", self.base_mac),
            ));
        }
        if self.switch_wait.max_attempts == 0 {
            return Err(DriverError::config(
                "switch_wait.max_attempts",
                "must be at least 1",
            ));
        }
        if self.dhcp_default_lease_time == 0 {
            return Err(DriverError::config(
                "dhcp_default_lease_time",
                "must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = OvnMechConfig::from_yaml_str("").unwrap();
        assert_eq!(config, OvnMechConfig::default());
        assert_eq!(config.dhcp_default_lease_time, 43200);
        assert_eq!(config.base_mac.to_string(), "fa:16:3e:00:00:00");
        assert_eq!(config.switch_wait, RetryPolicy::new(10, 200));
    }

    #[test]
    fn test_partial_override() {
        let config = OvnMechConfig::from_yaml_str(
            "security_groups_enabled: false\nswitch_wait:\n  interval_ms: 5\ndns_servers: [8.8.8.8]\n",
        )
        .unwrap();
        assert!(!config.security_groups_enabled);
        assert_eq!(config.switch_wait, RetryPolicy::new(10, 5));
        assert_eq!(config.dns_servers, vec!["8.8.8.8".parse().unwrap()]);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = OvnMechConfig::from_yaml_str("base_mac: not-a-mac\n").unwrap_err();
        assert!(matches!(err, DriverError::Config { .. }));

        let err = OvnMechConfig::from_yaml_str("base_mac: 01:00:5e:00:00:00\n").unwrap_err();
        assert_eq!(
            err,
            DriverError::config("base_mac", "01:00:5e:00:00:00 is a multicast address")
        );

        let err = OvnMechConfig::from_yaml_str("switch_wait:\n  max_attempts: 0\n").unwrap_err();
        assert_eq!(
            err,
            DriverError::config("switch_wait.max_attempts", "must be at least 1")
        );

        let err = OvnMechConfig::from_yaml_str("no_such_option: 1\n").unwrap_err();
        assert!(matches!(err, DriverError::Config { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "vhost_sock_dir: /tmp/vhu\nlog_level: debug").unwrap();
        let config = OvnMechConfig::load(file.path()).unwrap();
        assert_eq!(config.vhost_sock_dir, PathBuf::from("/tmp/vhu"));
        assert_eq!(config.log_level, "debug");

        let err = OvnMechConfig::load(Path::new("/nonexistent/ovn-mechd.yaml")).unwrap_err();
        assert!(matches!(err, DriverError::Config { .. }));
    }
}
