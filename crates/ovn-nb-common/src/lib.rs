//! Common abstractions shared by the OVN mechanism driver.
//!
//! This crate provides the two sides the driver sits between:
//!
//! - The entity side: [`model`] types (networks, subnets, ports, security
//!   groups), the [`MechanismDriver`] lifecycle contract with its
//!   [`NetworkContext`]/[`SubnetContext`]/[`PortContext`], and the
//!   [`CorePlugin`] read/write interface of the entity database.
//! - The northbound side: [`rows`] as stored in the OVN northbound database,
//!   the typed [`NbCommand`] set, the [`NbStore`] client trait, the
//!   [`Transaction`] batcher and an in-memory backend ([`MemoryNb`]).
//!
//! # Architecture
//!
//! ```text
//! framework ──> MechanismDriver::*_precommit   (inside the entity DB txn)
//!           ──> MechanismDriver::*_postcommit  (after commit)
//!                        │
//!                        ▼
//!                  Transaction ──add()──> [NbCommand, ...]
//!                        │
//!                     commit()
//!                        ▼
//!                     NbStore  (applies the batch atomically)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ovn_nb_common::{naming, MemoryNb, NbCommand, NbStoreExt};
//!
//! let nb = MemoryNb::new();
//! let mut txn = nb.transaction(true);
//! txn.add(NbCommand::create_logical_switch(naming::ovn_name("net-1"), Default::default()));
//! txn.commit().await?;
//! ```

pub mod driver;
pub mod error;
pub mod memory;
pub mod model;
pub mod naming;
pub mod plugin;
pub mod retry;
pub mod rows;
pub mod store;
pub mod transaction;

mod command;

pub use command::{AclUpdateMode, DhcpOptionsRef, LspFields, NbCommand};
pub use driver::{
    MechanismDriver, NetworkContext, PortBinding, PortContext, SubnetContext, VifDetails, VifType,
};
pub use error::{NbError, NbResult};
pub use memory::MemoryNb;
pub use plugin::{CorePlugin, PluginError};
pub use retry::RetryPolicy;
pub use store::{NbStore, NbStoreExt};
pub use transaction::{CommandHandle, CommandOutput, Transaction, TransactionOutcome};
