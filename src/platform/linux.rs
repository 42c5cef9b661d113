//! Linux-specific routing implementation
//!
//! Reads and mutates the table with iproute2. `ip route` only takes
//! addresses, so host names are resolved to IPv4 before rendering.

use super::{CommandLine, DefaultRouteProvider, PlatformError, Route, RouteInstaller, RouteOp};
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use tracing::debug;

/// Tunnel interfaces created by OpenVPN/OpenConnect (tun0, tun1, ...)
pub const TUNNEL_PREFIX: &str = "tun";

pub struct LinuxRouteTable {
    prefix: String,
}

impl LinuxRouteTable {
    pub fn new() -> Self {
        Self::with_prefix(TUNNEL_PREFIX)
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }
}

impl Default for LinuxRouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultRouteProvider for LinuxRouteTable {
    fn default_routes(&self) -> Result<Vec<Route>, PlatformError> {
        let output = CommandLine::new("ip", ["-4", "route", "show", "default"])
            .run()
            .map_err(|e| PlatformError::QueryFailed(e.to_string()))?;
        let routes = parse_ip_route(&output);
        debug!("ip route reported {} default routes", routes.len());
        Ok(routes)
    }

    fn tunnel_prefix(&self) -> &str {
        &self.prefix
    }
}

impl RouteInstaller for LinuxRouteTable {
    fn render(&self, op: &RouteOp) -> Result<CommandLine, PlatformError> {
        let cmd = match op {
            RouteOp::DeleteDefault { interface } => CommandLine::new(
                "ip",
                ["-4", "route", "del", "default", "dev", interface.as_str()],
            ),
            RouteOp::AddDefault {
                gateway: Some(gateway),
                ..
            } => CommandLine::new(
                "ip",
                ["-4", "route", "add", "default", "via", gateway.as_str()],
            ),
            RouteOp::AddDefault {
                gateway: None,
                interface,
            } => CommandLine::new(
                "ip",
                ["-4", "route", "add", "default", "dev", interface.as_str()],
            ),
            RouteOp::AddHost { host, interface } => {
                let addr = resolve_ipv4(host)?;
                let dest = format!("{}/32", addr);
                CommandLine::new(
                    "ip",
                    ["-4", "route", "add", dest.as_str(), "dev", interface.as_str()],
                )
            }
        };
        Ok(cmd)
    }

    fn apply(&mut self, _op: &RouteOp, command: &CommandLine) -> Result<(), PlatformError> {
        command.run()?;
        Ok(())
    }
}

/// Resolve `host` to its first IPv4 address via the system resolver
fn resolve_ipv4(host: &str) -> Result<Ipv4Addr, PlatformError> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok(addr);
    }

    let addrs = (host, 0).to_socket_addrs().map_err(|e| PlatformError::Resolve {
        host: host.to_string(),
        message: e.to_string(),
    })?;

    let addr = addrs
        .filter_map(|a| match a.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| PlatformError::Resolve {
            host: host.to_string(),
            message: "no IPv4 address".to_string(),
        })?;

    debug!("Resolved {} -> {}", host, addr);
    Ok(addr)
}

/// Parse `ip -4 route show default` output
///
/// ```text
/// default via 192.168.1.1 dev eth0 proto dhcp metric 100
/// default dev tun0 scope link
/// ```
pub fn parse_ip_route(output: &str) -> Vec<Route> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.first() != Some(&"default") {
                return None;
            }

            let value_after = |key: &str| {
                fields
                    .windows(2)
                    .find(|pair| pair[0] == key)
                    .map(|pair| pair[1].to_string())
            };

            let interface = value_after("dev").unwrap_or_default();
            let gateway = value_after("via");
            let flags = fields
                .iter()
                .skip(1)
                .filter(|f| **f == "onlink" || **f == "linkdown" || **f == "dead")
                .copied()
                .collect::<Vec<_>>()
                .join(",");

            Some(Route {
                destination: fields[0].to_string(),
                gateway,
                interface,
                flags,
            })
        })
        .collect()
}
