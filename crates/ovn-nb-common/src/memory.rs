//! In-memory northbound database.
//!
//! Applies each transaction to a copy of the current contents and swaps the
//! copy in only when every command succeeded, so readers never observe a
//! partially applied batch. Used by the demonstration binary and by tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use uuid::Uuid;

use crate::command::{AclUpdateMode, DhcpOptionsRef, LspFields, NbCommand};
use crate::error::{NbError, NbResult};
use crate::naming::{EXT_ID_PORT_ID, EXT_ID_SUBNET_ID};
use crate::rows::{table, Acl, AddressSet, DhcpOptions, LogicalSwitch, LogicalSwitchPort};
use crate::store::NbStore;
use crate::transaction::CommandOutput;

/// Full contents of the in-memory database.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NbSnapshot {
    pub logical_switches: BTreeMap<String, LogicalSwitch>,
    pub logical_switch_ports: BTreeMap<String, LogicalSwitchPort>,
    pub address_sets: BTreeMap<String, AddressSet>,
    pub dhcp_options: BTreeMap<Uuid, DhcpOptions>,
}

impl NbSnapshot {
    fn resolve_dhcp_ref(
        &self,
        reference: Option<DhcpOptionsRef>,
        outputs: &[CommandOutput],
    ) -> NbResult<Option<Uuid>> {
        match reference {
            None => Ok(None),
            Some(DhcpOptionsRef::Existing(uuid)) => {
                if self.dhcp_options.contains_key(&uuid) {
                    Ok(Some(uuid))
                } else {
                    Err(NbError::row_not_found(table::DHCP_OPTIONS, uuid.to_string()))
                }
            }
            Some(DhcpOptionsRef::Pending(handle)) => match outputs.get(handle.index()) {
                Some(CommandOutput::Uuid(uuid)) => Ok(Some(*uuid)),
                _ => Err(NbError::UnresolvedHandle(handle.index())),
            },
        }
    }

    fn switch_mut(&mut self, name: &str) -> NbResult<&mut LogicalSwitch> {
        self.logical_switches
            .get_mut(name)
            .ok_or_else(|| NbError::row_not_found(table::LOGICAL_SWITCH, name))
    }

    fn remove_dhcp_row(&mut self, uuid: &Uuid) {
        self.dhcp_options.remove(uuid);
        for lsp in self.logical_switch_ports.values_mut() {
            if lsp.dhcpv4_options.as_ref() == Some(uuid) {
                lsp.dhcpv4_options = None;
            }
            if lsp.dhcpv6_options.as_ref() == Some(uuid) {
                lsp.dhcpv6_options = None;
            }
        }
    }

    fn create_lsp(
        &mut self,
        lport: String,
        lswitch: String,
        fields: LspFields,
        outputs: &[CommandOutput],
    ) -> NbResult<()> {
        if self.logical_switch_ports.contains_key(&lport) {
            return Err(NbError::row_exists(table::LOGICAL_SWITCH_PORT, lport));
        }
        let dhcpv4_options = self.resolve_dhcp_ref(fields.dhcpv4_options, outputs)?;
        let dhcpv6_options = self.resolve_dhcp_ref(fields.dhcpv6_options, outputs)?;
        self.switch_mut(&lswitch)?.ports.insert(lport.clone());
        let lsp = LogicalSwitchPort {
            name: lport.clone(),
            lswitch,
            port_type: fields.port_type.unwrap_or_default(),
            addresses: fields.addresses.unwrap_or_default(),
            port_security: fields.port_security,
            external_ids: fields.external_ids,
            options: fields.options,
            parent_name: fields.parent_name,
            tag: fields.tag,
            enabled: fields.enabled,
            dhcpv4_options,
            dhcpv6_options,
        };
        self.logical_switch_ports.insert(lport, lsp);
        Ok(())
    }

    fn set_lsp(
        &mut self,
        lport: &str,
        fields: LspFields,
        if_exists: bool,
        outputs: &[CommandOutput],
    ) -> NbResult<()> {
        let dhcpv4_options = self.resolve_dhcp_ref(fields.dhcpv4_options, outputs)?;
        let dhcpv6_options = self.resolve_dhcp_ref(fields.dhcpv6_options, outputs)?;
        let Some(lsp) = self.logical_switch_ports.get_mut(lport) else {
            return if if_exists {
                Ok(())
            } else {
                Err(NbError::row_not_found(table::LOGICAL_SWITCH_PORT, lport))
            };
        };
        if let Some(port_type) = fields.port_type {
            lsp.port_type = port_type;
        }
        if let Some(addresses) = fields.addresses {
            lsp.addresses = addresses;
        }
        lsp.port_security = fields.port_security;
        lsp.external_ids = fields.external_ids;
        lsp.options = fields.options;
        lsp.parent_name = fields.parent_name;
        lsp.tag = fields.tag;
        lsp.enabled = fields.enabled;
        lsp.dhcpv4_options = dhcpv4_options;
        lsp.dhcpv6_options = dhcpv6_options;
        Ok(())
    }

    fn delete_lsp(&mut self, lport: &str, lswitch: &str, if_exists: bool) -> NbResult<()> {
        if self.logical_switch_ports.remove(lport).is_none() {
            return if if_exists {
                Ok(())
            } else {
                Err(NbError::row_not_found(table::LOGICAL_SWITCH_PORT, lport))
            };
        }
        if let Some(ls) = self.logical_switches.get_mut(lswitch) {
            ls.ports.remove(lport);
        }
        let owned: Vec<Uuid> = self
            .dhcp_options
            .values()
            .filter(|row| row.port_id() == Some(lport))
            .map(|row| row.uuid)
            .collect();
        for uuid in owned {
            self.remove_dhcp_row(&uuid);
        }
        Ok(())
    }

    fn update_acls(
        &mut self,
        port_acls: BTreeMap<String, Vec<Acl>>,
        mode: AclUpdateMode,
    ) -> NbResult<()> {
        for (lport, acls) in port_acls {
            // Ports that are gone have no ACLs left to update.
            let Some(lswitch) = self
                .logical_switch_ports
                .get(&lport)
                .map(|lsp| lsp.lswitch.clone())
            else {
                continue;
            };
            let ls = self.switch_mut(&lswitch)?;
            match mode {
                AclUpdateMode::Replace => {
                    ls.acls
                        .retain(|cur| cur.lport != lport || acls.iter().any(|a| a.same_rule(cur)));
                    for acl in acls {
                        if !ls.acls.iter().any(|cur| cur.same_rule(&acl)) {
                            ls.acls.push(acl);
                        }
                    }
                }
                AclUpdateMode::Add => {
                    for acl in acls {
                        if !ls.acls.iter().any(|cur| cur.same_rule(&acl)) {
                            ls.acls.push(acl);
                        }
                    }
                }
                AclUpdateMode::Remove => {
                    ls.acls.retain(|cur| !acls.iter().any(|a| a.same_rule(cur)));
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, command: NbCommand, outputs: &[CommandOutput]) -> NbResult<CommandOutput> {
        match command {
            NbCommand::CreateLogicalSwitch {
                name,
                external_ids,
                may_exist,
            } => {
                if self.logical_switches.contains_key(&name) {
                    if !may_exist {
                        return Err(NbError::row_exists(table::LOGICAL_SWITCH, name));
                    }
                } else {
                    let ls = LogicalSwitch {
                        name: name.clone(),
                        external_ids,
                        ..Default::default()
                    };
                    self.logical_switches.insert(name, ls);
                }
            }
            NbCommand::SetLogicalSwitchExtId {
                name,
                key,
                value,
                if_exists,
            } => match self.logical_switches.get_mut(&name) {
                Some(ls) => {
                    ls.external_ids.insert(key, value);
                }
                None if if_exists => {}
                None => return Err(NbError::row_not_found(table::LOGICAL_SWITCH, name)),
            },
            NbCommand::DeleteLogicalSwitch { name, if_exists } => {
                match self.logical_switches.remove(&name) {
                    Some(ls) => {
                        for lport in ls.ports {
                            self.delete_lsp(&lport, &name, true)?;
                        }
                    }
                    None if if_exists => {}
                    None => return Err(NbError::row_not_found(table::LOGICAL_SWITCH, name)),
                }
            }
            NbCommand::CreateLogicalSwitchPort {
                lport,
                lswitch,
                fields,
            } => self.create_lsp(lport, lswitch, fields, outputs)?,
            NbCommand::SetLogicalSwitchPort {
                lport,
                fields,
                if_exists,
            } => self.set_lsp(&lport, fields, if_exists, outputs)?,
            NbCommand::DeleteLogicalSwitchPort {
                lport,
                lswitch,
                if_exists,
            } => self.delete_lsp(&lport, &lswitch, if_exists)?,
            NbCommand::AddAcl { lswitch, acl } => {
                let ls = self.switch_mut(&lswitch)?;
                if !ls.acls.iter().any(|cur| cur.same_rule(&acl)) {
                    ls.acls.push(acl);
                }
            }
            NbCommand::DeletePortAcls { lswitch, lport } => {
                if let Some(ls) = self.logical_switches.get_mut(&lswitch) {
                    ls.acls.retain(|acl| acl.lport != lport);
                }
            }
            NbCommand::UpdateAcls { port_acls, mode } => self.update_acls(port_acls, mode)?,
            NbCommand::CreateAddressSet { name, external_ids } => {
                let set = self
                    .address_sets
                    .entry(name.clone())
                    .or_insert_with(|| AddressSet {
                        name,
                        ..Default::default()
                    });
                set.external_ids = external_ids;
            }
            NbCommand::UpdateAddressSetExtIds {
                name,
                external_ids,
                if_exists,
            } => match self.address_sets.get_mut(&name) {
                Some(set) => set.external_ids = external_ids,
                None if if_exists => {}
                None => return Err(NbError::row_not_found(table::ADDRESS_SET, name)),
            },
            NbCommand::DeleteAddressSet { name, if_exists } => {
                if self.address_sets.remove(&name).is_none() && !if_exists {
                    return Err(NbError::row_not_found(table::ADDRESS_SET, name));
                }
            }
            NbCommand::UpdateAddressSet {
                name,
                addrs_add,
                addrs_remove,
                if_exists,
            } => match self.address_sets.get_mut(&name) {
                Some(set) => {
                    for addr in addrs_remove {
                        set.addresses.remove(&addr);
                    }
                    set.addresses.extend(addrs_add);
                }
                None if if_exists => {}
                None => return Err(NbError::row_not_found(table::ADDRESS_SET, name)),
            },
            NbCommand::AddDhcpOptions {
                subnet_id,
                port_id,
                cidr,
                options,
                mut external_ids,
            } => {
                external_ids.insert(EXT_ID_SUBNET_ID.to_string(), subnet_id.clone());
                if let Some(port_id) = &port_id {
                    external_ids.insert(EXT_ID_PORT_ID.to_string(), port_id.clone());
                }
                let existing = self
                    .dhcp_options
                    .values_mut()
                    .find(|row| {
                        row.subnet_id() == Some(subnet_id.as_str())
                            && row.port_id() == port_id.as_deref()
                    });
                let uuid = match existing {
                    Some(row) => {
                        row.cidr = cidr;
                        row.options = options;
                        row.external_ids = external_ids;
                        row.uuid
                    }
                    None => {
                        let uuid = Uuid::new_v4();
                        let row = DhcpOptions {
                            uuid,
                            cidr,
                            options,
                            external_ids,
                        };
                        self.dhcp_options.insert(uuid, row);
                        uuid
                    }
                };
                return Ok(CommandOutput::Uuid(uuid));
            }
            NbCommand::DeleteDhcpOptions { uuid, if_exists } => {
                if self.dhcp_options.contains_key(&uuid) {
                    self.remove_dhcp_row(&uuid);
                } else if !if_exists {
                    return Err(NbError::row_not_found(table::DHCP_OPTIONS, uuid.to_string()));
                }
            }
        }
        Ok(CommandOutput::None)
    }
}

/// Northbound database kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryNb {
    state: RwLock<NbSnapshot>,
    commits: AtomicUsize,
    injected_failure: Mutex<Option<NbError>>,
}

impl MemoryNb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> NbResult<NbSnapshot> {
        Ok(self.read()?.clone())
    }

    /// Number of transactions applied so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Makes the next commit fail with `error` without touching the data.
    pub fn fail_next_commit(&self, error: NbError) -> NbResult<()> {
        let mut slot = self
            .injected_failure
            .lock()
            .map_err(|_| NbError::backend("failure injection lock poisoned"))?;
        *slot = Some(error);
        Ok(())
    }

    /// ACLs of a switch.
    pub fn acls(&self, lswitch: &str) -> NbResult<Vec<Acl>> {
        Ok(self
            .read()?
            .logical_switches
            .get(lswitch)
            .map(|ls| ls.acls.clone())
            .unwrap_or_default())
    }

    fn read(&self) -> NbResult<std::sync::RwLockReadGuard<'_, NbSnapshot>> {
        self.state
            .read()
            .map_err(|_| NbError::backend("northbound state lock poisoned"))
    }

    fn take_injected_failure(&self) -> NbResult<Option<NbError>> {
        Ok(self
            .injected_failure
            .lock()
            .map_err(|_| NbError::backend("failure injection lock poisoned"))?
            .take())
    }
}

#[async_trait]
impl NbStore for MemoryNb {
    async fn commit(&self, commands: Vec<NbCommand>) -> NbResult<Vec<CommandOutput>> {
        if let Some(err) = self.take_injected_failure()? {
            return Err(err);
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| NbError::backend("northbound state lock poisoned"))?;
        let mut next = state.clone();
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            let what = format!("{} {}", command.verb(), command.table());
            match next.apply(command, &outputs) {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    debug!("Aborting transaction at {}: {}", what, e);
                    return Err(e);
                }
            }
        }
        *state = next;
        let n = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Applied northbound transaction #{} ({} commands)", n, outputs.len());
        Ok(outputs)
    }

    fn get_logical_switch(&self, name: &str) -> NbResult<Option<LogicalSwitch>> {
        Ok(self.read()?.logical_switches.get(name).cloned())
    }

    fn get_logical_switch_port(&self, name: &str) -> NbResult<Option<LogicalSwitchPort>> {
        Ok(self.read()?.logical_switch_ports.get(name).cloned())
    }

    fn get_address_set(&self, name: &str) -> NbResult<Option<AddressSet>> {
        Ok(self.read()?.address_sets.get(name).cloned())
    }

    fn get_subnet_dhcp_options(&self, subnet_id: &str) -> NbResult<Option<DhcpOptions>> {
        Ok(self
            .read()?
            .dhcp_options
            .values()
            .find(|row| row.subnet_id() == Some(subnet_id) && row.port_id().is_none())
            .cloned())
    }

    fn get_port_dhcp_options_for_subnet(&self, subnet_id: &str) -> NbResult<Vec<DhcpOptions>> {
        Ok(self
            .read()?
            .dhcp_options
            .values()
            .filter(|row| row.subnet_id() == Some(subnet_id) && row.port_id().is_some())
            .cloned()
            .collect())
    }
}
