//! The mechanism driver and its notification wiring.
//!
//! ```text
//!  entity DB txn                 after commit
//!  ─────────────                 ────────────
//!  *_precommit ── validate        *_postcommit ── Transaction ──> NbStore
//!               └ provisioning                    (one per hook)
//!                 block
//!
//!  EventRegistry ──publish──> OvnMechDriver (EventHandler)
//!     process start, segment create, security group and rule events
//! ```

mod driver;
mod events;

pub use driver::{Collaborators, OvnMechDriver, RuleNotification, WorkerKind, DRIVER_NAME};
pub use events::{DriverEvent, EventHandler, EventKind, EventRegistry};
