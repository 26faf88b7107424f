//! Security-group rule to ACL compilation.

use std::collections::{BTreeMap, BTreeSet};

use ovn_nb_common::model::{Port, RuleDirection, SecurityGroupRule};
use ovn_nb_common::naming::{ovn_addrset_name, EXT_ID_LPORT};
use ovn_nb_common::rows::{Acl, AclAction, AclDirection};
use ovn_nb_common::PluginError;
use ovn_types::IpVersion;

use super::cache::{SecurityGroupCache, SubnetCache};

/// Priority of the per-port default drop ACLs.
pub const ACL_PRIORITY_DROP: u16 = 1001;
/// Priority of allow ACLs, above the default drops.
pub const ACL_PRIORITY_ALLOW: u16 = 1002;

/// Turns a port and its security groups into ACL rows.
///
/// The driver only supplies the inputs and applies the result; what the
/// rows look like is up to the compiler.
pub trait AclCompiler: Send + Sync {
    /// Every ACL of `port` given the groups enforced on it. No groups means
    /// no ACLs.
    fn port_acls(
        &self,
        port: &Port,
        sg_ids: &BTreeSet<String>,
        sg_cache: &mut SecurityGroupCache<'_>,
        subnet_cache: &mut SubnetCache<'_>,
    ) -> Result<Vec<Acl>, PluginError>;

    /// The ACL one rule produces on `port`, if the rule applies to it.
    fn rule_acl(&self, port: &Port, rule: &SecurityGroupRule) -> Option<Acl>;
}

/// Compiles rules the way `ovn-northd` expects them from the driver:
/// default drops, a DHCP allow per IPv4 subnet and one `allow-related`
/// per applicable rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAclCompiler;

impl AclCompiler for DefaultAclCompiler {
    fn port_acls(
        &self,
        port: &Port,
        sg_ids: &BTreeSet<String>,
        sg_cache: &mut SecurityGroupCache<'_>,
        subnet_cache: &mut SubnetCache<'_>,
    ) -> Result<Vec<Acl>, PluginError> {
        if sg_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut acls = drop_acls(port);

        let v4_subnets: BTreeSet<&str> = port
            .fixed_ips_of(IpVersion::V4)
            .map(|ip| ip.subnet_id.as_str())
            .collect();
        for subnet_id in v4_subnets {
            let subnet = subnet_cache.get(subnet_id)?;
            acls.push(dhcp_acl(port, &subnet.cidr.to_string()));
        }

        for sg_id in sg_ids {
            let group = sg_cache.get(sg_id)?;
            acls.extend(group.rules.iter().filter_map(|rule| self.rule_acl(port, rule)));
        }
        Ok(acls)
    }

    fn rule_acl(&self, port: &Port, rule: &SecurityGroupRule) -> Option<Acl> {
        let versions: BTreeSet<IpVersion> =
            port.fixed_ips.iter().map(|ip| ip.ip_address.version()).collect();
        if !versions.contains(&rule.ethertype) {
            return None;
        }

        let ip = rule.ethertype.as_str();
        let (direction, remote_field) = match rule.direction {
            RuleDirection::Ingress => (AclDirection::ToLport, "src"),
            RuleDirection::Egress => (AclDirection::FromLport, "dst"),
        };

        let mut match_expr = format!("{} == \"{}\" && {}", direction.port_field(), port.id, ip);
        if let Some(prefix) = &rule.remote_ip_prefix {
            match_expr.push_str(&format!(" && {ip}.{remote_field} == {prefix}"));
        } else if let Some(group) = &rule.remote_group_id {
            let set = ovn_addrset_name(group, rule.ethertype);
            match_expr.push_str(&format!(" && {ip}.{remote_field} == ${set}"));
        }
        match_expr.push_str(&protocol_and_ports(rule));

        Some(acl(
            port,
            direction,
            ACL_PRIORITY_ALLOW,
            match_expr,
            AclAction::AllowRelated,
        ))
    }
}

fn acl(
    port: &Port,
    direction: AclDirection,
    priority: u16,
    match_expr: String,
    action: AclAction,
) -> Acl {
    Acl {
        lport: port.id.clone(),
        direction,
        priority,
        match_expr,
        action,
        log: false,
        external_ids: BTreeMap::from([(EXT_ID_LPORT.to_string(), port.id.clone())]),
    }
}

/// Drops all IP traffic to and from the port unless a higher ACL allows it.
fn drop_acls(port: &Port) -> Vec<Acl> {
    [AclDirection::FromLport, AclDirection::ToLport]
        .into_iter()
        .map(|direction| {
            let match_expr = format!("{} == \"{}\" && ip", direction.port_field(), port.id);
            acl(port, direction, ACL_PRIORITY_DROP, match_expr, AclAction::Drop)
        })
        .collect()
}

/// Lets the port reach the DHCP server of its subnet.
fn dhcp_acl(port: &Port, cidr: &str) -> Acl {
    let match_expr = format!(
        "inport == \"{}\" && ip4 && ip4.dst == {{255.255.255.255, {}}} && udp && udp.src == 68 && udp.dst == 67",
        port.id, cidr
    );
    acl(
        port,
        AclDirection::FromLport,
        ACL_PRIORITY_ALLOW,
        match_expr,
        AclAction::Allow,
    )
}

fn protocol_and_ports(rule: &SecurityGroupRule) -> String {
    let Some(protocol) = rule.protocol.as_deref() else {
        return String::new();
    };
    let (min, max) = (rule.port_range_min, rule.port_range_max);

    let l4 = match protocol {
        "tcp" | "6" => Some("tcp"),
        "udp" | "17" => Some("udp"),
        _ => None,
    };
    if let Some(l4) = l4 {
        let mut out = format!(" && {l4}");
        match (min, max) {
            (Some(lo), Some(hi)) if lo == hi => out.push_str(&format!(" && {l4}.dst == {lo}")),
            _ => {
                if let Some(lo) = min {
                    out.push_str(&format!(" && {l4}.dst >= {lo}"));
                }
                if let Some(hi) = max {
                    out.push_str(&format!(" && {l4}.dst <= {hi}"));
                }
            }
        }
        return out;
    }

    if matches!(protocol, "icmp" | "1" | "icmpv6" | "ipv6-icmp" | "58") {
        let icmp = match rule.ethertype {
            IpVersion::V4 => "icmp4",
            IpVersion::V6 => "icmp6",
        };
        let mut out = format!(" && {icmp}");
        if let Some(icmp_type) = min {
            out.push_str(&format!(" && {icmp}.type == {icmp_type}"));
        }
        if let Some(code) = max {
            out.push_str(&format!(" && {icmp}.code == {code}"));
        }
        return out;
    }

    if protocol.parse::<u8>().is_ok() {
        format!(" && ip.proto == {protocol}")
    } else {
        format!(" && {protocol}")
    }
}
