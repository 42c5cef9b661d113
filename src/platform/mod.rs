//! Platform-specific implementations
//!
//! The rewrite sequence in [`crate::vpn::routing`] only talks to the routing
//! table through [`DefaultRouteProvider`] and [`RouteInstaller`]. Each platform
//! adapter queries the table and renders [`RouteOp`]s into the exact command
//! line its routing tool expects.
//!
//! Both adapters are built on every OS so their output parsers and command
//! rendering stay testable anywhere; [`get_route_table`] picks the live one.

pub mod linux;
pub mod mac;

use std::fmt;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Failed to query routing table: {0}")]
    QueryFailed(String),
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` failed ({}): {stderr}", describe_code(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Failed to resolve {host}: {message}")]
    Resolve { host: String, message: String },
    #[error("Unsupported platform")]
    UnsupportedPlatform,
}

impl PlatformError {
    /// Exit status of the failed OS command, if it ran and exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            PlatformError::CommandFailed { code, .. } => *code,
            _ => None,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// A routing table entry as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub destination: String,
    /// Next hop; `None` for interface-only routes (`default dev ppp0`)
    pub gateway: Option<String>,
    pub interface: String,
    pub flags: String,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.destination)?;
        if let Some(gateway) = &self.gateway {
            write!(f, " via {}", gateway)?;
        }
        write!(f, " dev {}", self.interface)
    }
}

/// A routing table mutation, independent of any platform's command syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOp {
    /// Remove the default route bound to `interface`
    DeleteDefault { interface: String },
    /// Add a default route via `gateway`, or straight out of `interface`
    /// when the route has no next hop
    AddDefault {
        gateway: Option<String>,
        interface: String,
    },
    /// Add a host route for `host` scoped to `interface`
    AddHost { host: String, interface: String },
}

/// A concrete command line (program plus arguments)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Run the command, returning stdout on success
    pub fn run(&self) -> Result<String, PlatformError> {
        debug!("Running: {}", self);
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| PlatformError::Spawn {
                command: self.to_string(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlatformError::CommandFailed {
                command: self.to_string(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Read access to the IPv4 default routes
pub trait DefaultRouteProvider {
    /// IPv4 default routes in the order the kernel presents them
    fn default_routes(&self) -> Result<Vec<Route>, PlatformError>;

    /// Prefix of tunnel interface names (e.g. `utun`)
    fn tunnel_prefix(&self) -> &str;

    fn is_vpn_interface(&self, name: &str) -> bool {
        is_tunnel_name(name, self.tunnel_prefix())
    }
}

/// Privileged routing table mutations
pub trait RouteInstaller {
    /// Render `op` into the command line that performs it
    fn render(&self, op: &RouteOp) -> Result<CommandLine, PlatformError>;

    /// Perform `op`. `command` is what [`RouteInstaller::render`] produced for it.
    fn apply(&mut self, op: &RouteOp, command: &CommandLine) -> Result<(), PlatformError>;
}

/// Full routing table capability used by the rewrite sequence
pub trait RouteTable: DefaultRouteProvider + RouteInstaller {}

impl<T: DefaultRouteProvider + RouteInstaller + ?Sized> RouteTable for T {}

/// `prefix` followed by at least one digit, e.g. `utun3`
pub fn is_tunnel_name(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Get the routing table for the current platform
///
/// `prefix` overrides the platform's tunnel interface prefix.
pub fn get_route_table(prefix: Option<&str>) -> Result<Box<dyn RouteTable>, PlatformError> {
    #[cfg(target_os = "macos")]
    {
        let table = match prefix {
            Some(p) => mac::MacRouteTable::with_prefix(p),
            None => mac::MacRouteTable::new(),
        };
        Ok(Box::new(table))
    }

    #[cfg(target_os = "linux")]
    {
        let table = match prefix {
            Some(p) => linux::LinuxRouteTable::with_prefix(p),
            None => linux::LinuxRouteTable::new(),
        };
        Ok(Box::new(table))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = prefix;
        Err(PlatformError::UnsupportedPlatform)
    }
}

/// Whether the process runs with the privileges route changes need
pub fn is_privileged() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }

    #[cfg(not(unix))]
    {
        true
    }
}
