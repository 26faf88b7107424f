//! Read-through lookups scoped to one reconciliation.
//!
//! A cache is created at the start of a driver operation, borrowed by the
//! ACL compiler for as long as the operation runs and dropped with it.
//! Nothing is shared between operations.

use std::collections::BTreeMap;

use ovn_nb_common::model::{SecurityGroup, Subnet};
use ovn_nb_common::{CorePlugin, PluginError};

/// Security groups fetched during one operation.
pub struct SecurityGroupCache<'a> {
    plugin: &'a dyn CorePlugin,
    groups: BTreeMap<String, SecurityGroup>,
}

impl<'a> SecurityGroupCache<'a> {
    pub fn new(plugin: &'a dyn CorePlugin) -> Self {
        Self {
            plugin,
            groups: BTreeMap::new(),
        }
    }

    /// Returns the group, asking the plugin on first use.
    pub fn get(&mut self, sg_id: &str) -> Result<&SecurityGroup, PluginError> {
        if !self.groups.contains_key(sg_id) {
            let group = self.plugin.get_security_group(sg_id)?;
            self.groups.insert(sg_id.to_string(), group);
        }
        self.groups
            .get(sg_id)
            .ok_or_else(|| PluginError::not_found("security group", sg_id))
    }

    /// Number of distinct groups fetched so far.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Subnets fetched during one operation.
pub struct SubnetCache<'a> {
    plugin: &'a dyn CorePlugin,
    subnets: BTreeMap<String, Subnet>,
}

impl<'a> SubnetCache<'a> {
    pub fn new(plugin: &'a dyn CorePlugin) -> Self {
        Self {
            plugin,
            subnets: BTreeMap::new(),
        }
    }

    pub fn get(&mut self, subnet_id: &str) -> Result<&Subnet, PluginError> {
        if !self.subnets.contains_key(subnet_id) {
            let subnet = self.plugin.get_subnet(subnet_id)?;
            self.subnets.insert(subnet_id.to_string(), subnet);
        }
        self.subnets
            .get(subnet_id)
            .ok_or_else(|| PluginError::not_found("subnet", subnet_id))
    }

    pub fn len(&self) -> usize {
        self.subnets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subnets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standalone::MemoryPlugin;
    use ovn_nb_common::model::SecurityGroup;

    #[test]
    fn test_security_group_fetched_once() {
        let plugin = MemoryPlugin::new();
        plugin.put_security_group(SecurityGroup {
            id: "sg1".to_string(),
            name: "web".to_string(),
            rules: Vec::new(),
        });

        let mut cache = SecurityGroupCache::new(&plugin);
        assert!(cache.is_empty());
        assert_eq!(cache.get("sg1").unwrap().name, "web");
        assert_eq!(cache.get("sg1").unwrap().name, "web");
        assert_eq!(cache.len(), 1);

        let err = cache.get("missing").unwrap_err();
        assert!(err.is_benign_race());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_subnet() {
        let plugin = MemoryPlugin::new();
        let mut cache = SubnetCache::new(&plugin);
        assert!(cache.get("s1").is_err());
        assert!(cache.is_empty());
    }
}
