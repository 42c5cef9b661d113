//! Default route swap for split-tunnel VPN
//!
//! Moves the default route off the VPN tunnel and back onto the pre-VPN
//! gateway, then pins each requested host to the tunnel with a host route.
//!
//! The sequence is strictly ordered because every step depends on the kernel
//! having applied the previous one:
//!
//! 1. Read the IPv4 default routes; the first one is the current default
//! 2. Require its interface to be a VPN tunnel (no changes otherwise)
//! 3. Delete the tunnel's default route
//! 4. Read the default routes again; the first one is now the pre-VPN gateway
//! 5. Re-add that gateway as the default route
//! 6. Add a host route through the tunnel for every host
//!
//! Nothing is retried or rolled back. A failure in step 3 or 5 aborts the run
//! and can leave the table without a default route.

use crate::config::ConfigError;
use crate::platform::{PlatformError, Route, RouteOp, RouteTable};
use crate::vpn::hosts::{HostList, HostsError};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum RerouteError {
    #[error("Usage error: {0}")]
    Usage(String),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Hosts error: {0}")]
    Hosts(#[from] HostsError),
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("Route query failed: {0}")]
    RouteQuery(PlatformError),
    #[error("No IPv4 default route found")]
    NoDefaultRoute,
    #[error("Not on VPN: default route uses {interface}, not a tunnel interface")]
    NotOnVpn { interface: String },
    #[error("Failed to delete VPN default route: {0}")]
    RouteDeleteFailed(PlatformError),
    #[error("Failed to add default route: {0}")]
    RouteAddFailed(PlatformError),
    #[error("Failed to add host routes for {}", failed_hosts(.failures))]
    HostRoutesFailed { failures: Vec<HostFailure> },
}

impl RerouteError {
    /// Process exit code for this error
    ///
    /// Failed route commands propagate their own exit status.
    pub fn exit_code(&self) -> i32 {
        let platform = match self {
            RerouteError::RouteDeleteFailed(e) | RerouteError::RouteAddFailed(e) => Some(e),
            RerouteError::HostRoutesFailed { failures } => failures.first().map(|f| &f.error),
            _ => None,
        };
        platform
            .and_then(PlatformError::exit_code)
            .filter(|code| *code != 0)
            .unwrap_or(1)
    }
}

/// A host whose route could not be installed
#[derive(Debug)]
pub struct HostFailure {
    pub host: String,
    pub error: PlatformError,
}

fn failed_hosts(failures: &[HostFailure]) -> String {
    failures
        .iter()
        .map(|f| f.host.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// How route changes are carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Log each command, then run it
    Apply,
    /// Log each command without running it
    DryRun,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RerouteSummary {
    pub vpn_interface: String,
    pub vpn_gateway: Option<String>,
    /// `None` when the restored default route has no next hop
    pub restored_gateway: Option<String>,
    pub restored_interface: String,
    pub hosts: Vec<String>,
    /// Route commands in the order they were issued
    pub commands: Vec<String>,
    pub dry_run: bool,
}

/// Issues route operations against a table, in either mode
struct Interpreter<'a, T: RouteTable + ?Sized> {
    table: &'a mut T,
    mode: Mode,
    issued: Vec<String>,
}

impl<'a, T: RouteTable + ?Sized> Interpreter<'a, T> {
    fn new(table: &'a mut T, mode: Mode) -> Self {
        Self {
            table,
            mode,
            issued: Vec::new(),
        }
    }

    fn issue(&mut self, op: &RouteOp) -> Result<(), PlatformError> {
        let command = self.table.render(op)?;
        match self.mode {
            Mode::Apply => info!("{}", command),
            Mode::DryRun => info!("[dry-run] {}", command),
        }
        self.issued.push(command.to_string());

        if self.mode == Mode::Apply {
            self.table.apply(op, &command)?;
        }
        Ok(())
    }
}

/// First default route, after dropping the first entry on `deleted_interface`
///
/// The kernel deletes a single matching entry, so only one is dropped.
fn first_default_route<T: RouteTable + ?Sized>(
    table: &T,
    deleted_interface: Option<&str>,
) -> Result<Route, RerouteError> {
    let mut routes = table.default_routes().map_err(RerouteError::RouteQuery)?;
    if let Some(iface) = deleted_interface {
        if let Some(pos) = routes.iter().position(|r| r.interface == iface) {
            routes.remove(pos);
        }
    }
    routes.into_iter().next().ok_or(RerouteError::NoDefaultRoute)
}

/// Drop repeated hosts, keeping the first occurrence
fn dedup_hosts(hosts: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    hosts
        .iter()
        .filter(|h| seen.insert(h.as_str()))
        .cloned()
        .collect()
}

/// Restore the pre-VPN default route and pin `hosts` to the VPN tunnel
///
/// Every host is attempted even if an earlier one fails. Host failures are
/// reported together once all hosts were tried.
pub fn reroute_through_vpn<T: RouteTable + ?Sized>(
    table: &mut T,
    hosts: &[String],
    mode: Mode,
) -> Result<RerouteSummary, RerouteError> {
    let current = first_default_route(&*table, None)?;
    info!("Current default route: {}", current);

    if !table.is_vpn_interface(&current.interface) {
        return Err(RerouteError::NotOnVpn {
            interface: current.interface,
        });
    }
    let vpn_interface = current.interface;

    let mut interpreter = Interpreter::new(table, mode);

    interpreter
        .issue(&RouteOp::DeleteDefault {
            interface: vpn_interface.clone(),
        })
        .map_err(RerouteError::RouteDeleteFailed)?;

    // Nothing was deleted in a dry run, so drop the entry a real delete removes
    let skip = match mode {
        Mode::Apply => None,
        Mode::DryRun => Some(vpn_interface.as_str()),
    };
    let previous = first_default_route(&*interpreter.table, skip)?;
    if interpreter.table.is_vpn_interface(&previous.interface) {
        warn!(
            "Next default route is also a tunnel ({}), using it anyway",
            previous.interface
        );
    }
    info!("Pre-VPN default route: {}", previous);

    interpreter
        .issue(&RouteOp::AddDefault {
            gateway: previous.gateway.clone(),
            interface: previous.interface.clone(),
        })
        .map_err(RerouteError::RouteAddFailed)?;

    let mut installed = Vec::new();
    let mut failures = Vec::new();

    for host in dedup_hosts(hosts) {
        let op = RouteOp::AddHost {
            host: host.clone(),
            interface: vpn_interface.clone(),
        };
        match interpreter.issue(&op) {
            Ok(()) => installed.push(host),
            Err(e) => {
                error!("Failed to add route for {}: {}", host, e);
                failures.push(HostFailure { host, error: e });
            }
        }
    }

    if !failures.is_empty() {
        warn!(
            "{} of {} host routes failed",
            failures.len(),
            failures.len() + installed.len()
        );
        return Err(RerouteError::HostRoutesFailed { failures });
    }

    info!(
        "Default route restored to {}, {} hosts routed via {}",
        previous,
        installed.len(),
        vpn_interface
    );

    Ok(RerouteSummary {
        vpn_interface,
        vpn_gateway: current.gateway,
        restored_gateway: previous.gateway,
        restored_interface: previous.interface,
        hosts: installed,
        commands: interpreter.issued,
        dry_run: mode == Mode::DryRun,
    })
}

/// Run the reroute for a collected host list
///
/// An empty list is a usage error and leaves the routing table untouched.
pub fn reroute_host_list<T: RouteTable + ?Sized>(
    table: &mut T,
    list: &HostList,
    mode: Mode,
) -> Result<RerouteSummary, RerouteError> {
    if list.hosts.is_empty() {
        return Err(RerouteError::Usage(
            "no hosts given (use --file, arguments, or stdin)".to_string(),
        ));
    }
    info!("Routing {} hosts through VPN ({:?})", list.hosts.len(), list.source);
    reroute_through_vpn(table, &list.hosts, mode)
}
