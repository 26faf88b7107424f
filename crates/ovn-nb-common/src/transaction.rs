//! Batching of northbound commands into one atomic commit.
//!
//! A [`Transaction`] collects [`NbCommand`]s and hands them to the
//! [`NbStore`] in a single [`commit`](Transaction::commit). The store applies
//! the whole batch or nothing. Commands that need the result of an earlier
//! command (a logical switch port pointing at a DHCP options row inserted in
//! the same batch) refer to it through the [`CommandHandle`] returned by
//! [`add`](Transaction::add).

use log::{debug, warn};
use uuid::Uuid;

use crate::command::NbCommand;
use crate::error::NbResult;
use crate::store::NbStore;

/// Position of a command inside its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandHandle(usize);

impl CommandHandle {
    pub const fn new(index: usize) -> Self {
        CommandHandle(index)
    }

    pub const fn index(&self) -> usize {
        self.0
    }
}

/// Result of one applied command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandOutput {
    #[default]
    None,
    /// The row inserted or refreshed by the command.
    Uuid(Uuid),
}

/// Per-command results of a committed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOutcome {
    outputs: Vec<CommandOutput>,
}

impl TransactionOutcome {
    pub fn new(outputs: Vec<CommandOutput>) -> Self {
        Self { outputs }
    }

    /// Row uuid produced by the command behind `handle`.
    pub fn uuid(&self, handle: CommandHandle) -> Option<Uuid> {
        match self.outputs.get(handle.index()) {
            Some(CommandOutput::Uuid(uuid)) => Some(*uuid),
            _ => None,
        }
    }

    pub fn outputs(&self) -> &[CommandOutput] {
        &self.outputs
    }
}

/// An open batch of northbound commands.
///
/// Dropping a transaction without calling [`commit`](Transaction::commit)
/// discards its commands.
pub struct Transaction<'a, S: NbStore + ?Sized> {
    store: &'a S,
    check_error: bool,
    commands: Vec<NbCommand>,
    finished: bool,
}

impl<'a, S: NbStore + ?Sized> Transaction<'a, S> {
    /// Opens a transaction. With `check_error` unset, commit failures are
    /// logged and swallowed.
    pub fn new(store: &'a S, check_error: bool) -> Self {
        Self {
            store,
            check_error,
            commands: Vec::new(),
            finished: false,
        }
    }

    /// Queues a command and returns its handle.
    pub fn add(&mut self, command: NbCommand) -> CommandHandle {
        let handle = CommandHandle(self.commands.len());
        self.commands.push(command);
        handle
    }

    pub fn extend(&mut self, commands: impl IntoIterator<Item = NbCommand>) {
        self.commands.extend(commands);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[NbCommand] {
        &self.commands
    }

    /// Applies every queued command atomically.
    ///
    /// The first failing command aborts the batch and nothing is written.
    /// An empty transaction is not sent to the store.
    pub async fn commit(mut self) -> NbResult<TransactionOutcome> {
        self.finished = true;
        let commands = std::mem::take(&mut self.commands);
        if commands.is_empty() {
            return Ok(TransactionOutcome::default());
        }

        let count = commands.len();
        match self.store.commit(commands).await {
            Ok(outputs) => {
                debug!("Committed northbound transaction with {} command(s)", count);
                Ok(TransactionOutcome::new(outputs))
            }
            Err(e) if !self.check_error => {
                warn!("Ignoring failed northbound transaction: {}", e);
                Ok(TransactionOutcome::default())
            }
            Err(e) => Err(e),
        }
    }
}

impl<S: NbStore + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if !self.finished && !self.commands.is_empty() {
            debug!(
                "Discarding uncommitted northbound transaction with {} command(s)",
                self.commands.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNb;
    use crate::naming;
    use crate::store::NbStoreExt;
    use crate::NbError;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_commit_applies_all_commands() {
        let nb = MemoryNb::new();
        let mut txn = nb.transaction(true);
        txn.add(NbCommand::create_logical_switch(
            naming::ovn_name("n1"),
            BTreeMap::new(),
        ));
        txn.add(NbCommand::create_logical_switch(
            naming::ovn_name("n2"),
            BTreeMap::new(),
        ));
        assert_eq!(txn.len(), 2);
        txn.commit().await.unwrap();

        assert!(nb.get_logical_switch("neutron-n1").unwrap().is_some());
        assert!(nb.get_logical_switch("neutron-n2").unwrap().is_some());
        assert_eq!(nb.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_command_aborts_batch() {
        let nb = MemoryNb::new();
        let mut txn = nb.transaction(true);
        txn.add(NbCommand::create_logical_switch("neutron-n1", BTreeMap::new()));
        txn.add(NbCommand::DeleteLogicalSwitch {
            name: "neutron-missing".to_string(),
            if_exists: false,
        });
        let err = txn.commit().await.unwrap_err();
        assert_eq!(err, NbError::row_not_found("Logical_Switch", "neutron-missing"));
        assert!(nb.get_logical_switch("neutron-n1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_check_error_false_swallows_failure() {
        let nb = MemoryNb::new();
        let mut txn = nb.transaction(false);
        txn.add(NbCommand::DeleteLogicalSwitch {
            name: "neutron-missing".to_string(),
            if_exists: false,
        });
        let outcome = txn.commit().await.unwrap();
        assert!(outcome.outputs().is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_dropped_transactions_write_nothing() {
        let nb = MemoryNb::new();
        nb.transaction(true).commit().await.unwrap();
        {
            let mut txn = nb.transaction(true);
            txn.add(NbCommand::create_logical_switch("neutron-n1", BTreeMap::new()));
        }
        assert_eq!(nb.commit_count(), 0);
        assert!(nb.get_logical_switch("neutron-n1").unwrap().is_none());
    }

    #[test]
    fn test_outcome_uuid_lookup() {
        let uuid = Uuid::new_v4();
        let outcome = TransactionOutcome::new(vec![CommandOutput::None, CommandOutput::Uuid(uuid)]);
        assert_eq!(outcome.uuid(CommandHandle::new(1)), Some(uuid));
        assert_eq!(outcome.uuid(CommandHandle::new(0)), None);
        assert_eq!(outcome.uuid(CommandHandle::new(5)), None);
    }
}
