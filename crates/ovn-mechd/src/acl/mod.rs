//! Security group reconciler.
//!
//! Each security group owns two address sets in the northbound database,
//! `as_ip4_<group>` and `as_ip6_<group>`, holding the `"<mac> <ip>"` entries
//! of its member ports. ACLs are compiled per port from the rules of the
//! groups enforced on it.
//!
//! # Key Components
//!
//! - [`AclCompiler`] / [`DefaultAclCompiler`]: rule to ACL compilation
//! - [`SecurityGroupCache`] / [`SubnetCache`]: per-operation lookups
//! - [`PortSecurityGroupDiff`]: minimal address-set updates on port change

mod cache;
mod compiler;
mod reconciler;

pub use cache::{SecurityGroupCache, SubnetCache};
pub use compiler::{AclCompiler, DefaultAclCompiler, ACL_PRIORITY_ALLOW, ACL_PRIORITY_DROP};
pub use reconciler::{
    acl_port_ips, enforced_security_groups, port_create_commands, port_delete_commands,
    security_group_commands, PortSecurityGroupDiff, SecurityGroupEvent,
};
