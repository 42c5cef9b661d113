//! Host list input
//!
//! Hosts come from exactly one source, in priority order: a hosts file,
//! positional arguments, then stdin. Lines starting with `#` are comments.

use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum HostsError {
    #[error("Failed to read hosts from {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
}

/// Where a host list was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSource {
    File(PathBuf),
    Args,
    Stdin,
    /// Nothing supplied any host
    Empty,
}

#[derive(Debug, Clone)]
pub struct HostList {
    pub hosts: Vec<String>,
    pub source: HostSource,
}

/// Parse one host per line, skipping blank lines and `#` comments
pub fn parse_hosts(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

pub fn read_hosts_file(path: &Path) -> Result<Vec<String>, HostsError> {
    let content = fs::read_to_string(path).map_err(|e| HostsError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse_hosts(&content))
}

pub fn read_hosts<R: BufRead>(mut reader: R) -> Result<Vec<String>, HostsError> {
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .map_err(|e| HostsError::ReadError {
            path: PathBuf::from("<stdin>"),
            source: e,
        })?;
    Ok(parse_hosts(&content))
}

/// Collect hosts from the first source that supplies any
///
/// `stdin` is only read when neither `file` nor `args` produced a host.
pub fn collect_hosts<R: BufRead>(
    file: Option<&Path>,
    args: &[String],
    stdin: Option<R>,
) -> Result<HostList, HostsError> {
    if let Some(path) = file {
        let hosts = read_hosts_file(path)?;
        if !hosts.is_empty() {
            if !args.is_empty() {
                warn!(
                    "Ignoring {} host argument(s), using {}",
                    args.len(),
                    path.display()
                );
            }
            debug!("Read {} hosts from {}", hosts.len(), path.display());
            return Ok(HostList {
                hosts,
                source: HostSource::File(path.to_path_buf()),
            });
        }
        debug!("{} contains no hosts", path.display());
    }

    let hosts = parse_hosts(&args.join("\n"));
    if !hosts.is_empty() {
        return Ok(HostList {
            hosts,
            source: HostSource::Args,
        });
    }

    if let Some(reader) = stdin {
        let hosts = read_hosts(reader)?;
        if !hosts.is_empty() {
            debug!("Read {} hosts from stdin", hosts.len());
            return Ok(HostList {
                hosts,
                source: HostSource::Stdin,
            });
        }
    }

    Ok(HostList {
        hosts: Vec::new(),
        source: HostSource::Empty,
    })
}
