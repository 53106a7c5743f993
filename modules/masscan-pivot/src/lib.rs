//! Turn masscan XML into an nmap follow-up script and a host -> ports list.

use roxmltree::Document;
use scanconv_core::xml::{attribute, child, children};
use scanconv_core::{write_lines, Error, ScanDocument, WriteMode};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::path::Path;

pub const DEFAULT_NMAP_ARGS: &str = "-T4 -Pn -sS -sV --version-intensity 3 --max-retries 3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotOptions {
    /// Flags placed between `nmap` and the per-host `-oX`/`-p` arguments.
    pub nmap_args: String,
    /// Directory the generated commands write their XML into.
    pub out_dir: String,
    /// Emit a progress echo every N hosts; 0 disables it.
    pub progress_every: usize,
}

impl Default for PivotOptions {
    fn default() -> Self {
        PivotOptions { nmap_args: DEFAULT_NMAP_ARGS.to_string(), out_dir: "nmap".to_string(), progress_every: 5 }
    }
}

/// Host key that orders IP addresses numerically and anything else after them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum HostKey {
    Ip(IpAddr),
    Name(String),
}

impl From<&str> for HostKey {
    fn from(s: &str) -> Self {
        match s.parse::<IpAddr>() {
            Ok(ip) => HostKey::Ip(ip),
            Err(_) => HostKey::Name(s.to_string()),
        }
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKey::Ip(ip) => write!(f, "{}", ip),
            HostKey::Name(n) => f.write_str(n),
        }
    }
}

pub type HostPorts = BTreeMap<HostKey, BTreeSet<u16>>;

/// Union the ports of every host entry, keyed by address.
///
/// masscan writes one `host` per discovered port, so the same address repeats.
pub fn host_ports(tree: &Document) -> HostPorts {
    let mut map = HostPorts::new();
    for host in children(tree.root_element(), "host") {
        let addr = child(host, "address").map(|a| attribute(a, "addr", "")).unwrap_or_default();
        if addr.is_empty() {
            tracing::debug!("masscan host without address skipped");
            continue;
        }
        let ports = map.entry(HostKey::from(addr.as_str())).or_default();
        let Some(port_list) = child(host, "ports") else { continue };
        for port in children(port_list, "port") {
            let id = attribute(port, "portid", "");
            match id.parse::<u16>() {
                Ok(p) => {
                    ports.insert(p);
                }
                Err(_) => tracing::debug!(address = %addr, portid = %id, "unusable portid skipped"),
            }
        }
    }
    map.retain(|_, ports| !ports.is_empty());
    map
}

fn join_ports(ports: &BTreeSet<u16>) -> String {
    ports.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(",")
}

/// Body of the nmap script, without the shebang.
pub fn script_lines(map: &HostPorts, opts: &PivotOptions) -> Vec<String> {
    let total = map.len();
    let mut lines = Vec::with_capacity(total * 2 + total / opts.progress_every.max(1) + 1);
    for (i, (host, ports)) in map.iter().enumerate() {
        if opts.progress_every > 0 && i % opts.progress_every == 0 {
            let pct = i as f64 / total as f64 * 100.0;
            lines.push(format!("echo '>>>> Scan {:.2}% ({}/{}) complete'", pct, i, total));
        }
        lines.push(format!("echo 'Scanning {}'", host));
        lines.push(format!(
            "nmap {} -oX {}/{}.xml -p T:{} {}",
            opts.nmap_args,
            opts.out_dir,
            host,
            join_ports(ports),
            host
        ));
    }
    lines
}

/// `ADDR:p1,p2,...`, one line per host.
pub fn list_lines(map: &HostPorts) -> Vec<String> {
    map.iter().map(|(host, ports)| format!("{}:{}", host, join_ports(ports))).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotSummary {
    pub hosts: usize,
    pub ports: usize,
}

/// Read a masscan XML file and write the script and list files (both overwritten).
pub fn pivot_file(input: &Path, script: &Path, list: &Path, opts: &PivotOptions) -> Result<PivotSummary, Error> {
    let doc = ScanDocument::load(input)?;
    let tree = doc.parse()?;
    let map = host_ports(&tree);
    write_lines(script, Some("#!/bin/bash"), script_lines(&map, opts), WriteMode::Overwrite)?;
    make_executable(script)?;
    write_lines(list, None, list_lines(&map), WriteMode::Overwrite)?;
    Ok(PivotSummary { hosts: map.len(), ports: map.values().map(BTreeSet::len).sum() })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|source| Error::Write { path: path.to_path_buf(), source })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), Error> {
    Ok(())
}
