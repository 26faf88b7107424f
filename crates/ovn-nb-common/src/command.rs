//! Typed northbound write commands.

use std::collections::BTreeMap;

use ovn_types::{IpPrefix, VlanTag};
use uuid::Uuid;

use crate::rows::{table, Acl};
use crate::transaction::CommandHandle;

/// Reference from a logical switch port to a DHCP options row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpOptionsRef {
    /// A row that already exists in the database.
    Existing(Uuid),
    /// A row inserted by an earlier command of the same transaction.
    Pending(CommandHandle),
}

/// Column values for creating or updating a logical switch port.
///
/// On update, `port_type` and `addresses` set to `None` leave the stored
/// columns alone. On create they default to `""` and no addresses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LspFields {
    pub port_type: Option<String>,
    pub addresses: Option<Vec<String>>,
    pub port_security: Vec<String>,
    pub external_ids: BTreeMap<String, String>,
    pub options: BTreeMap<String, String>,
    pub parent_name: Option<String>,
    pub tag: Option<VlanTag>,
    pub enabled: Option<bool>,
    pub dhcpv4_options: Option<DhcpOptionsRef>,
    pub dhcpv6_options: Option<DhcpOptionsRef>,
}

/// How `UpdateAcls` treats the ACLs it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclUpdateMode {
    /// Make each listed port's ACLs exactly the given set, touching only
    /// the difference.
    Replace,
    /// Add the given ACLs that are not present yet.
    Add,
    /// Remove the given ACLs if present.
    Remove,
}

/// A single northbound write, queued into a [`Transaction`](crate::Transaction).
#[derive(Debug, Clone, PartialEq)]
pub enum NbCommand {
    CreateLogicalSwitch {
        name: String,
        external_ids: BTreeMap<String, String>,
        may_exist: bool,
    },
    SetLogicalSwitchExtId {
        name: String,
        key: String,
        value: String,
        if_exists: bool,
    },
    DeleteLogicalSwitch {
        name: String,
        if_exists: bool,
    },
    CreateLogicalSwitchPort {
        lport: String,
        lswitch: String,
        fields: LspFields,
    },
    SetLogicalSwitchPort {
        lport: String,
        fields: LspFields,
        if_exists: bool,
    },
    DeleteLogicalSwitchPort {
        lport: String,
        lswitch: String,
        if_exists: bool,
    },
    AddAcl {
        lswitch: String,
        acl: Acl,
    },
    /// Removes every ACL compiled for `lport`.
    DeletePortAcls {
        lswitch: String,
        lport: String,
    },
    /// Applies per-port ACL changes on the switches the ports live on.
    UpdateAcls {
        port_acls: BTreeMap<String, Vec<Acl>>,
        mode: AclUpdateMode,
    },
    CreateAddressSet {
        name: String,
        external_ids: BTreeMap<String, String>,
    },
    UpdateAddressSetExtIds {
        name: String,
        external_ids: BTreeMap<String, String>,
        if_exists: bool,
    },
    DeleteAddressSet {
        name: String,
        if_exists: bool,
    },
    UpdateAddressSet {
        name: String,
        addrs_add: Vec<String>,
        addrs_remove: Vec<String>,
        if_exists: bool,
    },
    /// Inserts or refreshes the row keyed by `(subnet_id, port_id)`.
    AddDhcpOptions {
        subnet_id: String,
        port_id: Option<String>,
        cidr: IpPrefix,
        options: BTreeMap<String, String>,
        external_ids: BTreeMap<String, String>,
    },
    DeleteDhcpOptions {
        uuid: Uuid,
        if_exists: bool,
    },
}

impl NbCommand {
    pub fn create_logical_switch(
        name: impl Into<String>,
        external_ids: BTreeMap<String, String>,
    ) -> Self {
        NbCommand::CreateLogicalSwitch {
            name: name.into(),
            external_ids,
            may_exist: true,
        }
    }

    pub fn delete_logical_switch(name: impl Into<String>) -> Self {
        NbCommand::DeleteLogicalSwitch {
            name: name.into(),
            if_exists: true,
        }
    }

    pub fn delete_logical_switch_port(lport: impl Into<String>, lswitch: impl Into<String>) -> Self {
        NbCommand::DeleteLogicalSwitchPort {
            lport: lport.into(),
            lswitch: lswitch.into(),
            if_exists: true,
        }
    }

    pub fn update_address_set(
        name: impl Into<String>,
        addrs_add: Vec<String>,
        addrs_remove: Vec<String>,
        if_exists: bool,
    ) -> Self {
        NbCommand::UpdateAddressSet {
            name: name.into(),
            addrs_add,
            addrs_remove,
            if_exists,
        }
    }

    /// Northbound table the command writes to.
    pub fn table(&self) -> &'static str {
        match self {
            NbCommand::CreateLogicalSwitch { .. }
            | NbCommand::SetLogicalSwitchExtId { .. }
            | NbCommand::DeleteLogicalSwitch { .. } => table::LOGICAL_SWITCH,
            NbCommand::CreateLogicalSwitchPort { .. }
            | NbCommand::SetLogicalSwitchPort { .. }
            | NbCommand::DeleteLogicalSwitchPort { .. } => table::LOGICAL_SWITCH_PORT,
            NbCommand::AddAcl { .. }
            | NbCommand::DeletePortAcls { .. }
            | NbCommand::UpdateAcls { .. } => table::ACL,
            NbCommand::CreateAddressSet { .. }
            | NbCommand::UpdateAddressSetExtIds { .. }
            | NbCommand::DeleteAddressSet { .. }
            | NbCommand::UpdateAddressSet { .. } => table::ADDRESS_SET,
            NbCommand::AddDhcpOptions { .. } | NbCommand::DeleteDhcpOptions { .. } => {
                table::DHCP_OPTIONS
            }
        }
    }

    /// Short verb for logs, e.g. `create`, `update`, `delete`.
    pub fn verb(&self) -> &'static str {
        match self {
            NbCommand::CreateLogicalSwitch { .. }
            | NbCommand::CreateLogicalSwitchPort { .. }
            | NbCommand::AddAcl { .. }
            | NbCommand::CreateAddressSet { .. }
            | NbCommand::AddDhcpOptions { .. } => "create",
            NbCommand::DeleteLogicalSwitch { .. }
            | NbCommand::DeleteLogicalSwitchPort { .. }
            | NbCommand::DeletePortAcls { .. }
            | NbCommand::DeleteAddressSet { .. }
            | NbCommand::DeleteDhcpOptions { .. } => "delete",
            _ => "update",
        }
    }
}
