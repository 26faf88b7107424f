//! Common network types for the OVN mechanism driver.
//!
//! This crate provides type-safe representations of the network primitives
//! that flow between the entity database and the OVN northbound database:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpAddress`]: IPv4 and IPv6 addresses
//! - [`IpPrefix`]: IP network prefixes (CIDR notation)
//! - [`IpVersion`]: address family selector used for address sets and DHCP
//! - [`VlanTag`]: 802.1Q tag carried by sub-interfaces and provider networks
//! - [`NetworkType`], [`VnicType`], [`PortStatus`]: entity attributes

mod ip;
mod mac;
mod net;
mod tag;

pub use ip::{IpAddress, IpPrefix, IpVersion};
pub use mac::MacAddress;
pub use net::{NetworkType, PortStatus, VnicType};
pub use tag::VlanTag;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN tag: {0} (must be 0-4095)")]
    InvalidVlanTag(i64),

    #[error("invalid port status: {0}")]
    InvalidPortStatus(String),
}
