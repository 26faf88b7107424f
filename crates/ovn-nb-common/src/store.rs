//! Northbound database client interface.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::command::NbCommand;
use crate::error::NbResult;
use crate::rows::{AddressSet, DhcpOptions, LogicalSwitch, LogicalSwitchPort};
use crate::transaction::{CommandOutput, Transaction};

/// Option key linking a router-owned switch port to its router port.
pub const ROUTER_PORT_OPTION: &str = "router-port";

/// Client for the OVN northbound database.
///
/// Reads are served from the client's local replica and never block.
/// Writes go through [`commit`](NbStore::commit), normally via a
/// [`Transaction`].
#[async_trait]
pub trait NbStore: Send + Sync {
    /// Applies `commands` atomically, returning one output per command.
    async fn commit(&self, commands: Vec<NbCommand>) -> NbResult<Vec<CommandOutput>>;

    fn get_logical_switch(&self, name: &str) -> NbResult<Option<LogicalSwitch>>;

    fn get_logical_switch_port(&self, name: &str) -> NbResult<Option<LogicalSwitchPort>>;

    fn get_address_set(&self, name: &str) -> NbResult<Option<AddressSet>>;

    /// The shared DHCP options row of a subnet.
    fn get_subnet_dhcp_options(&self, subnet_id: &str) -> NbResult<Option<DhcpOptions>>;

    /// Shared rows for the given subnets. Subnets without one are skipped.
    fn get_subnets_dhcp_options(&self, subnet_ids: &[String]) -> NbResult<Vec<DhcpOptions>> {
        let mut rows = Vec::with_capacity(subnet_ids.len());
        for subnet_id in subnet_ids {
            if let Some(row) = self.get_subnet_dhcp_options(subnet_id)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Port-scoped DHCP rows derived from a subnet.
    fn get_port_dhcp_options_for_subnet(&self, subnet_id: &str) -> NbResult<Vec<DhcpOptions>>;

    /// Router-related options of an existing switch port.
    fn get_router_port_options(&self, lport: &str) -> NbResult<BTreeMap<String, String>> {
        Ok(self
            .get_logical_switch_port(lport)?
            .map(|lsp| {
                lsp.options
                    .into_iter()
                    .filter(|(k, _)| k == ROUTER_PORT_OPTION)
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Convenience constructors available on every [`NbStore`].
pub trait NbStoreExt: NbStore {
    /// Opens a transaction against this store.
    fn transaction(&self, check_error: bool) -> Transaction<'_, Self> {
        Transaction::new(self, check_error)
    }
}

impl<S: NbStore + ?Sized> NbStoreExt for S {}
