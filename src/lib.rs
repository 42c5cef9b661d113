//! VPN reroute - put general traffic back on the pre-VPN gateway
//!
//! When a full-tunnel VPN takes over the default route, this crate swaps the
//! default route back to the gateway that was in place before the VPN came up
//! and pins a list of hosts to the tunnel interface with host routes.
//!
//! # Architecture
//!
//! - `config`: Optional configuration file handling (TOML)
//! - `platform`: Routing table capabilities (macOS, Linux)
//! - `vpn`: The route rewrite sequence and host list input
//!
//! # Usage
//!
//! ```bash
//! sudo vpn-reroute -f ~/.vpn-hosts
//! sudo vpn-reroute --dry-run git.internal.example.com 10.20.0.5
//! ```

pub mod config;
pub mod platform;
pub mod vpn;

pub use config::Config;
pub use vpn::routing::{reroute_host_list, reroute_through_vpn, Mode, RerouteError, RerouteSummary};
