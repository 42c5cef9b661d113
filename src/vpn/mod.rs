//! VPN route rewriting and host list input

pub mod hosts;
pub mod routing;

pub use hosts::{collect_hosts, HostList, HostSource, HostsError};
pub use routing::{reroute_host_list, reroute_through_vpn, HostFailure, Mode, RerouteError, RerouteSummary};
