//! macOS-specific routing implementation
//!
//! Reads the table with `netstat -nr -f inet` and mutates it with `route`.

use super::{CommandLine, DefaultRouteProvider, PlatformError, Route, RouteInstaller, RouteOp};
use tracing::debug;

/// Tunnel interfaces created by VPN clients on macOS (utun0, utun1, ...)
pub const TUNNEL_PREFIX: &str = "utun";

pub struct MacRouteTable {
    prefix: String,
}

impl MacRouteTable {
    pub fn new() -> Self {
        Self::with_prefix(TUNNEL_PREFIX)
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }
}

impl Default for MacRouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultRouteProvider for MacRouteTable {
    fn default_routes(&self) -> Result<Vec<Route>, PlatformError> {
        let output = CommandLine::new("netstat", ["-nr", "-f", "inet"])
            .run()
            .map_err(|e| PlatformError::QueryFailed(e.to_string()))?;
        let routes = parse_netstat(&output);
        debug!("netstat reported {} default routes", routes.len());
        Ok(routes)
    }

    fn tunnel_prefix(&self) -> &str {
        &self.prefix
    }
}

impl RouteInstaller for MacRouteTable {
    fn render(&self, op: &RouteOp) -> Result<CommandLine, PlatformError> {
        let cmd = match op {
            RouteOp::DeleteDefault { interface } => CommandLine::new(
                "route",
                ["-n", "delete", "-net", "default", "-interface", interface.as_str()],
            ),
            RouteOp::AddDefault {
                gateway: Some(gateway),
                ..
            } => CommandLine::new("route", ["-n", "add", "-net", "default", gateway.as_str()]),
            RouteOp::AddDefault {
                gateway: None,
                interface,
            } => CommandLine::new(
                "route",
                ["-n", "add", "-net", "default", "-interface", interface.as_str()],
            ),
            RouteOp::AddHost { host, interface } => CommandLine::new(
                "route",
                ["-n", "add", "-host", host.as_str(), "-interface", interface.as_str()],
            ),
        };
        Ok(cmd)
    }

    fn apply(&mut self, _op: &RouteOp, command: &CommandLine) -> Result<(), PlatformError> {
        command.run()?;
        Ok(())
    }
}

/// Extract the default routes from `netstat -nr -f inet` output
///
/// ```text
/// Destination        Gateway            Flags        Netif Expire
/// default            link#22            UCSg         utun3
/// default            192.168.1.1        UGScg          en0
/// ```
pub fn parse_netstat(output: &str) -> Vec<Route> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.first() != Some(&"default") || fields.len() < 2 {
                return None;
            }
            Some(Route {
                destination: fields[0].to_string(),
                gateway: Some(fields[1].to_string()),
                flags: fields.get(2).unwrap_or(&"").to_string(),
                interface: fields.get(3).unwrap_or(&"").to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETSTAT_ON_VPN: &str = "\
Routing tables

Internet:
Destination        Gateway            Flags        Netif Expire
default            10.0.0.1           UGScg        utun3
default            192.168.1.1        UGScIg         en0
10.0.0.1           10.0.0.1           UH           utun3
127                127.0.0.1          UCS            lo0
127.0.0.1          127.0.0.1          UH             lo0
192.168.1          link#6             UCS            en0      !
192.168.1.1/32     link#6             UCS            en0      !
";

    #[test]
    fn test_parse_netstat_default_routes_in_order() {
        let routes = parse_netstat(NETSTAT_ON_VPN);

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].gateway.as_deref(), Some("10.0.0.1"));
        assert_eq!(routes[0].interface, "utun3");
        assert_eq!(routes[0].flags, "UGScg");
        assert_eq!(routes[1].gateway.as_deref(), Some("192.168.1.1"));
        assert_eq!(routes[1].interface, "en0");
        assert!(routes.iter().all(|r| r.destination == "default"));
    }

    #[test]
    fn test_parse_netstat_link_gateway() {
        let output = "default            link#22            UCSg         utun4\n";
        let routes = parse_netstat(output);

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].gateway.as_deref(), Some("link#22"));
        assert_eq!(routes[0].interface, "utun4");
    }

    #[test]
    fn test_parse_netstat_missing_interface_column() {
        let routes = parse_netstat("default 192.168.1.1\n");
        assert_eq!(routes.len(), 1);
        assert!(routes[0].interface.is_empty());
        assert!(routes[0].flags.is_empty());
    }

    #[test]
    fn test_parse_netstat_no_default() {
        let output = "Destination Gateway Flags Netif\n127 127.0.0.1 UCS lo0\n";
        assert!(parse_netstat(output).is_empty());
        assert!(parse_netstat("").is_empty());
    }

    #[test]
    fn test_render_commands() {
        let table = MacRouteTable::new();

        let cmd = table
            .render(&RouteOp::DeleteDefault {
                interface: "utun3".to_string(),
            })
            .unwrap();
        assert_eq!(cmd.to_string(), "route -n delete -net default -interface utun3");

        let cmd = table
            .render(&RouteOp::AddDefault {
                gateway: Some("192.168.1.1".to_string()),
                interface: "en0".to_string(),
            })
            .unwrap();
        assert_eq!(cmd.to_string(), "route -n add -net default 192.168.1.1");

        let cmd = table
            .render(&RouteOp::AddDefault {
                gateway: None,
                interface: "ppp0".to_string(),
            })
            .unwrap();
        assert_eq!(cmd.to_string(), "route -n add -net default -interface ppp0");

        let cmd = table
            .render(&RouteOp::AddHost {
                host: "git.example.com".to_string(),
                interface: "utun3".to_string(),
            })
            .unwrap();
        assert_eq!(
            cmd.to_string(),
            "route -n add -host git.example.com -interface utun3"
        );
    }

    #[test]
    fn test_tunnel_prefix() {
        let table = MacRouteTable::default();
        assert_eq!(table.tunnel_prefix(), "utun");
        assert!(table.is_vpn_interface("utun3"));
        assert!(!table.is_vpn_interface("en0"));

        let table = MacRouteTable::with_prefix("ppp");
        assert!(table.is_vpn_interface("ppp0"));
        assert!(!table.is_vpn_interface("utun3"));
    }
}
