//! DHCP options resolver.
//!
//! Each DHCP-enabled subnet owns one shared `DHCP_Options` row. A port
//! references that row unless it carries extra DHCP options, in which case
//! it gets a row of its own, created in the same transaction as the port.
//!
//! ```text
//! subnet create/update ──> subnet_dhcp_options ──> compose_subnet_commands
//!                                                   (shared row + port rows)
//! port create/update   ──> port_dhcp_options ──> Disabled | Shared | PortSpecific
//! ```

mod options;
mod resolver;

pub use options::{
    classless_static_routes, dhcpv4_options, dhcpv6_options, lsp_dhcp_opts,
    subnet_dhcp_options, DhcpOptionsSpec, LspDhcpOpts, DHCPV6_STATELESS, DHCP_DISABLED,
};
pub use resolver::{
    compose_subnet_commands, delete_subnet_commands, existing_server_mac, port_dhcp_options,
    PortDhcpOptions,
};
