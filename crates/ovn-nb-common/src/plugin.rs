//! Entity database access exposed by the hosting framework.

use ovn_types::PortStatus;
use thiserror::Error;

use crate::model::{Port, SecurityGroup, SecurityGroupRule, Subnet};

/// Error returned by the entity database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("{kind} {id} could not be found")]
    NotFound { kind: &'static str, id: String },

    /// The row is referenced by another row and cannot be changed now.
    #[error("{kind} {id} is still referenced: {message}")]
    Reference {
        kind: &'static str,
        id: String,
        message: String,
    },

    #[error("entity database error: {0}")]
    Internal(String),
}

impl PluginError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PluginError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for races with a concurrent delete (not-found or reference
    /// errors), which status handling only logs.
    pub fn is_benign_race(&self) -> bool {
        matches!(
            self,
            PluginError::NotFound { .. } | PluginError::Reference { .. }
        )
    }
}

/// Read/write interface of the entity database used by the driver.
pub trait CorePlugin: Send + Sync {
    fn get_port(&self, port_id: &str) -> Result<Port, PluginError>;

    fn get_subnet(&self, subnet_id: &str) -> Result<Subnet, PluginError>;

    /// Security group with its rules.
    fn get_security_group(&self, sg_id: &str) -> Result<SecurityGroup, PluginError>;

    fn get_security_group_rule(&self, rule_id: &str) -> Result<SecurityGroupRule, PluginError>;

    /// Ports that are members of the security group.
    fn get_ports_in_security_group(&self, sg_id: &str) -> Result<Vec<Port>, PluginError>;

    fn update_port_status(&self, port_id: &str, status: PortStatus) -> Result<(), PluginError>;
}
