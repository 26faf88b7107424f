//! OVN ML2 mechanism driver.
//!
//! Translates network, subnet, port and security-group lifecycle events of
//! the entity database into OVN northbound state, negotiates port bindings
//! against chassis capabilities and gates port activation on the L2 agent.
//!
//! # Components
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`mech`] | Lifecycle hooks, port status, segment mapping, notifications |
//! | [`acl`] | Address sets and ACL compilation for security groups |
//! | [`dhcp`] | Subnet and port `DHCP_Options` rows |
//! | [`binding`] | Segment selection and vif details |
//! | [`provisioning`] | When a port needs an L2 provisioning block |
//! | [`profile`] | Binding-profile validation |
//! | [`port_info`] | Logical switch port columns for a port |
//! | [`standalone`] | In-memory collaborators |
//! | [`replay`] | Event-file replay used by the `ovn-mechd` binary |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ovn_mechd::{Collaborators, OvnMechConfig, OvnMechDriver};
//!
//! let collab = Collaborators::new(nb, plugin, chassis, provisioning, segments);
//! let driver = OvnMechDriver::new(OvnMechConfig::default(), collab);
//! driver.create_network_postcommit(&ctx).await?;
//! ```

// Logging macros are used by every other module.
#[macro_use]
pub mod audit;

pub mod acl;
pub mod binding;
pub mod collab;
pub mod config;
pub mod dhcp;
pub mod error;
pub mod mech;
pub mod port_info;
pub mod profile;
pub mod provisioning;
pub mod replay;
pub mod standalone;

pub use audit::{init_logging, init_logging_pretty, AuditCategory, AuditOutcome, AuditRecord};
pub use collab::{ChassisBindData, ChassisStore, DbSynchronizer, ProvisioningBlocks, QosDriver, SegmentDb};
pub use config::OvnMechConfig;
pub use error::{DriverError, DriverResult};
pub use mech::{
    Collaborators, DriverEvent, EventHandler, EventKind, EventRegistry, OvnMechDriver,
    RuleNotification, WorkerKind,
};
pub use replay::{ReplayEvent, ReplayFile, ReplayReport, Replayer};
