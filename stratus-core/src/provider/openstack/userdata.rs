//! First-boot configuration script for freshly created hosts.
//!
//! Rendered into the instance's user-data: provisions the operating user and
//! its key, optionally configures extra interfaces to DHCP, IP forwarding on
//! gateway hosts, and the default route of private hosts.

use crate::error::Result;
use crate::model::{HostRequest, KeyPair, SINGLE_HOST_NETWORK_NAME};
use crate::provider::ConfigOptions;
use std::fmt::Write;

/// Name of the operating user created on every host.
pub const DEFAULT_USER: &str = "stratus";

/// Render the user-data shell script for a host creation request.
pub fn prepare(
    config: &ConfigOptions,
    request: &HostRequest,
    key_pair: &KeyPair,
    cidr: &str,
    gateway_ip: &str,
) -> Result<String> {
    let default_network_name =
        request.networks.first().map(|n| n.name.as_str()).unwrap_or_default();
    let configure_interfaces = !config.auto_host_network_interfaces;
    let is_gateway = request.default_gateway.is_none()
        && default_network_name != SINGLE_HOST_NETWORK_NAME
        && !config.use_layer3_networking;
    let add_default_route = !request.public_ip && !config.use_layer3_networking;
    let mut dns_list = config.dns_list.clone();
    if dns_list.is_empty() {
        dns_list = vec!["1.1.1.1".to_string()];
    }

    let mut script = String::new();
    script.push_str("#!/bin/bash\nset -eu\n\n");

    writeln!(script, "# operating user").ok();
    writeln!(script, "useradd --create-home --shell /bin/bash {DEFAULT_USER} || true").ok();
    writeln!(script, "mkdir -p /home/{DEFAULT_USER}/.ssh").ok();
    writeln!(
        script,
        "echo '{}' >>/home/{DEFAULT_USER}/.ssh/authorized_keys",
        key_pair.public_key.trim()
    )
    .ok();
    writeln!(script, "chmod 0700 /home/{DEFAULT_USER}/.ssh").ok();
    writeln!(script, "chmod 0600 /home/{DEFAULT_USER}/.ssh/authorized_keys").ok();
    writeln!(script, "chown -R {DEFAULT_USER}:{DEFAULT_USER} /home/{DEFAULT_USER}/.ssh").ok();
    writeln!(
        script,
        "echo '{DEFAULT_USER} ALL=(ALL) NOPASSWD:ALL' >/etc/sudoers.d/{DEFAULT_USER}"
    )
    .ok();

    if configure_interfaces {
        script.push('\n');
        writeln!(script, "# bring secondary interfaces up with DHCP").ok();
        writeln!(
            script,
            "for iface in $(ls /sys/class/net | grep -v lo | tail -n +2); do"
        )
        .ok();
        writeln!(script, "    dhclient \"$iface\" || true").ok();
        writeln!(script, "done").ok();
    }

    if is_gateway {
        script.push('\n');
        writeln!(script, "# this host routes for the {cidr} network").ok();
        writeln!(script, "echo 1 >/proc/sys/net/ipv4/ip_forward").ok();
        writeln!(script, "sysctl -w net.ipv4.ip_forward=1").ok();
        writeln!(
            script,
            "iptables -t nat -A POSTROUTING -s {cidr} ! -d {cidr} -j MASQUERADE"
        )
        .ok();
        let dns = dns_list.join(" ");
        writeln!(script, "echo 'nameservers: {dns}' >/etc/stratus-dns").ok();
    }

    if add_default_route && !gateway_ip.is_empty() {
        script.push('\n');
        writeln!(script, "# private host: egress through the network gateway").ok();
        writeln!(script, "ip route replace default via {gateway_ip}").ok();
        for dns in &dns_list {
            writeln!(script, "echo 'nameserver {dns}' >>/etc/resolv.conf").ok();
        }
    }

    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Host, Network};

    fn base_request(public: bool, network_name: &str) -> HostRequest {
        HostRequest {
            resource_name: "easyvm".into(),
            public_ip: public,
            networks: vec![Network { name: network_name.into(), ..Network::new() }],
            ..Default::default()
        }
    }

    fn key_pair() -> KeyPair {
        KeyPair { public_key: "ssh-rsa AAAA test".into(), ..Default::default() }
    }

    #[test]
    fn gateway_host_gets_forwarding() {
        let config = ConfigOptions { use_layer3_networking: false, ..Default::default() };
        let script =
            prepare(&config, &base_request(true, "crazy"), &key_pair(), "192.168.0.0/24", "")
                .unwrap();
        assert!(script.contains("ip_forward"));
        assert!(script.contains("MASQUERADE"));
    }

    #[test]
    fn layer3_backend_skips_forwarding() {
        let config = ConfigOptions { use_layer3_networking: true, ..Default::default() };
        let script =
            prepare(&config, &base_request(true, "crazy"), &key_pair(), "192.168.0.0/24", "")
                .unwrap();
        assert!(!script.contains("ip_forward"));
    }

    #[test]
    fn single_host_network_is_never_a_gateway() {
        let config = ConfigOptions { use_layer3_networking: false, ..Default::default() };
        let script = prepare(
            &config,
            &base_request(true, SINGLE_HOST_NETWORK_NAME),
            &key_pair(),
            "10.0.0.0/8",
            "",
        )
        .unwrap();
        assert!(!script.contains("ip_forward"));
    }

    #[test]
    fn private_host_routes_through_gateway() {
        let config = ConfigOptions { use_layer3_networking: false, ..Default::default() };
        let mut request = base_request(false, "crazy");
        request.default_gateway = Some(Box::new(Host::new()));
        let script =
            prepare(&config, &request, &key_pair(), "192.168.0.0/24", "192.168.0.1").unwrap();
        assert!(script.contains("default via 192.168.0.1"));
    }
}
