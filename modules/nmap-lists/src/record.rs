//! Per-port record extraction from nmap XML.

use roxmltree::{Document, Node};
use scanconv_core::xml::{attribute, child, children};
use std::collections::BTreeSet;

/// Value of the `notes` column; filled in by hand downstream.
pub const NOTES_PLACEHOLDER: &str = "todo";

/// What a script's output contributes to a [`PortRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptRole {
    TlsSubject,
    HttpTitle,
    SystemInfo,
    Ignored,
}

/// Script ids with a role. Anything not listed is ignored.
pub const SCRIPT_ROLES: &[(&str, ScriptRole)] = &[
    ("ssl-cert", ScriptRole::TlsSubject),
    ("http-title", ScriptRole::HttpTitle),
    ("http-ntlm-info", ScriptRole::SystemInfo),
    ("imap-ntlm-info", ScriptRole::SystemInfo),
    ("ms-sql-ntlm-info", ScriptRole::SystemInfo),
    ("nntp-ntlm-info", ScriptRole::SystemInfo),
    ("pop3-ntlm-info", ScriptRole::SystemInfo),
    ("rdp-ntlm-info", ScriptRole::SystemInfo),
    ("smtp-ntlm-info", ScriptRole::SystemInfo),
    ("telnet-ntlm-info", ScriptRole::SystemInfo),
    ("smb-system-info", ScriptRole::SystemInfo),
];

pub fn script_role(id: &str) -> ScriptRole {
    SCRIPT_ROLES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(id))
        .map(|(_, role)| *role)
        .unwrap_or(ScriptRole::Ignored)
}

/// An address and the hostnames one host entry declared for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostIdentity {
    pub address: String,
    pub hostnames: BTreeSet<String>,
}

/// Canonical facts about one port of one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortRecord {
    pub address: String,
    pub hostnames: BTreeSet<String>,
    /// Kept as text exactly as the scanner wrote it.
    pub port: String,
    pub service_name: String,
    pub service_product: String,
    pub service_version: String,
    pub service_extra_info: String,
    pub service_device_type: String,
    pub tls_subject: String,
    pub http_title: String,
    pub system_info: String,
    pub notes: String,
}

/// Address and hostnames of a `host` element; `None` when it has no usable address.
///
/// MAC addresses are passed over in favour of the first IP address element.
pub fn host_identity(host: Node) -> Option<HostIdentity> {
    let addresses = children(host, "address");
    let chosen = addresses
        .iter()
        .find(|a| attribute(**a, "addrtype", "") != "mac")
        .or_else(|| addresses.first())?;
    let address = attribute(*chosen, "addr", "");
    if address.is_empty() {
        return None;
    }
    let hostnames: BTreeSet<String> = child(host, "hostnames")
        .map(|hn| {
            children(hn, "hostname")
                .into_iter()
                .map(|h| attribute(h, "name", ""))
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Some(HostIdentity { address, hostnames })
}

/// Build the record for one `port` element. Ports without a `portid` yield `None`.
pub fn extract_port(port: Node, host: &HostIdentity) -> Option<PortRecord> {
    let port_id = attribute(port, "portid", "");
    if port_id.is_empty() {
        tracing::debug!(address = %host.address, "port entry without portid dropped");
        return None;
    }

    let mut record = PortRecord {
        address: host.address.clone(),
        hostnames: host.hostnames.clone(),
        port: port_id,
        notes: NOTES_PLACEHOLDER.to_string(),
        ..PortRecord::default()
    };

    if let Some(service) = child(port, "service") {
        record.service_name = attribute(service, "name", "");
        record.service_product = attribute(service, "product", "");
        record.service_version = attribute(service, "version", "");
        record.service_extra_info = attribute(service, "extrainfo", "");
        record.service_device_type = attribute(service, "devicetype", "");
    }

    for script in children(port, "script") {
        let id = attribute(script, "id", "");
        let output = attribute(script, "output", "");
        match script_role(&id) {
            ScriptRole::TlsSubject => record.tls_subject = output,
            ScriptRole::HttpTitle => record.http_title = output,
            ScriptRole::SystemInfo => {
                record.system_info.push_str(&format!("{}:\n{}\n", id, output));
            }
            ScriptRole::Ignored => {}
        }
    }

    Some(record)
}

fn is_open(port: Node) -> bool {
    child(port, "state").map(|s| attribute(s, "state", "") == "open").unwrap_or(false)
}

/// Every port record in a parsed document, in document order.
///
/// With `only_open`, ports whose state is anything but `open` are left out.
pub fn extract_records(tree: &Document, only_open: bool) -> Vec<PortRecord> {
    let mut out = Vec::new();
    for host in children(tree.root_element(), "host") {
        let Some(identity) = host_identity(host) else {
            tracing::debug!("host entry without address skipped");
            continue;
        };
        let Some(ports) = child(host, "ports") else { continue };
        for port in children(ports, "port") {
            if only_open && !is_open(port) {
                continue;
            }
            if let Some(record) = extract_port(port, &identity) {
                out.push(record);
            }
        }
    }
    out
}
