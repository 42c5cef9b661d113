//! Configuration handling for VPN reroute

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const LOCAL_CONFIG: &str = "vpn-reroute.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub routing: RoutingConfig,
    pub hosts: HostsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Tunnel interface prefix, overriding the platform default (`utun`, `tun`)
    pub interface_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostsConfig {
    /// Hosts file used when `--file` is not given
    pub file: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from the default locations
    ///
    /// Looks for `./vpn-reroute.toml`, then `<config dir>/vpn-reroute/config.toml`.
    /// Falls back to defaults when neither exists.
    pub fn discover() -> Result<Self, ConfigError> {
        for path in Self::search_paths() {
            if path.exists() {
                info!("Using config {}", path.display());
                return Self::load(&path);
            }
            debug!("No config at {}", path.display());
        }

        debug!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("vpn-reroute").join("config.toml"));
        }
        paths
    }
}
