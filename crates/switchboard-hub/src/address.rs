//! Bind address resolution for the publishing server

use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, warn};

/// Get all non-loopback local IPv4 addresses
pub fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    let mut ips = Vec::new();

    match NetworkInterface::show() {
        Ok(interfaces) => {
            for iface in interfaces {
                for addr in iface.addr {
                    if let network_interface::Addr::V4(v4) = addr {
                        if !v4.ip.is_loopback() {
                            ips.push(v4.ip);
                        }
                    }
                }
            }
        }
        Err(e) => warn!(error = %e, "Failed to enumerate network interfaces"),
    }

    ips
}

/// Pick the address the hub should reach us on
///
/// Loopback when the hub itself is on loopback or when no other address exists.
pub fn select_bind_address(candidates: &[Ipv4Addr], hub_address: IpAddr) -> IpAddr {
    if hub_address.is_loopback() {
        return IpAddr::V4(Ipv4Addr::LOCALHOST);
    }
    candidates
        .iter()
        .find(|ip| !ip.is_loopback())
        .map(|&ip| IpAddr::V4(ip))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Use `explicit` if given, otherwise pick a local address
pub fn resolve_bind_address(explicit: Option<IpAddr>, hub_address: IpAddr) -> IpAddr {
    if let Some(addr) = explicit {
        return addr;
    }
    let candidates = if hub_address.is_loopback() {
        Vec::new()
    } else {
        local_ipv4_addresses()
    };
    let chosen = select_bind_address(&candidates, hub_address);
    debug!(address = %chosen, candidates = candidates.len(), "Resolved bind address");
    chosen
}
