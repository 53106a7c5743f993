//! Deduplicated output views folded from port records.

use crate::classify::Classification;
use crate::csv_row::{render_row, CSV_HEADER};
use crate::record::PortRecord;
use scanconv_core::{write_lines, Error, WriteMode};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ViewKind {
    Hosts,
    Hostnames,
    HostToPort,
    HostnameToPort,
    HostToPortWeb,
    HostnameToPortWeb,
    Urls,
    Csv,
}

impl ViewKind {
    pub const ALL: [ViewKind; 8] = [
        ViewKind::Hosts,
        ViewKind::Hostnames,
        ViewKind::HostToPort,
        ViewKind::HostnameToPort,
        ViewKind::HostToPortWeb,
        ViewKind::HostnameToPortWeb,
        ViewKind::Urls,
        ViewKind::Csv,
    ];

    pub fn default_file_name(self) -> &'static str {
        match self {
            ViewKind::Hosts => "hosts.txt",
            ViewKind::Hostnames => "hostnames.txt",
            ViewKind::HostToPort => "host_to_port.txt",
            ViewKind::HostnameToPort => "hostname_to_port.txt",
            ViewKind::HostToPortWeb => "host_to_port_web.txt",
            ViewKind::HostnameToPortWeb => "hostname_to_port_web.txt",
            ViewKind::Urls => "urls_base.txt",
            ViewKind::Csv => "nmap.csv",
        }
    }

    /// Short description used in run summaries.
    pub fn label(self) -> &'static str {
        match self {
            ViewKind::Hosts => "HOST list",
            ViewKind::Hostnames => "HOSTNAME list",
            ViewKind::HostToPort => "HOST:PORT list",
            ViewKind::HostnameToPort => "HOSTNAME:PORT list",
            ViewKind::HostToPortWeb => "HOST:PORT (web) list",
            ViewKind::HostnameToPortWeb => "HOSTNAME:PORT (web) list",
            ViewKind::Urls => "http(s)://HOST:PORT list",
            ViewKind::Csv => "CSV",
        }
    }

    pub fn header(self) -> Option<&'static str> {
        match self {
            ViewKind::Csv => Some(CSV_HEADER),
            _ => None,
        }
    }
}

/// Output file name per view; unset views use [`ViewKind::default_file_name`].
#[derive(Debug, Clone, Default)]
pub struct OutputNames {
    overrides: BTreeMap<ViewKind, String>,
}

impl OutputNames {
    pub fn set(&mut self, kind: ViewKind, name: impl Into<String>) {
        self.overrides.insert(kind, name.into());
    }

    pub fn get(&self, kind: ViewKind) -> &str {
        self.overrides.get(&kind).map(String::as_str).unwrap_or_else(|| kind.default_file_name())
    }
}

/// Result of writing one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenView {
    pub kind: ViewKind,
    pub path: PathBuf,
    pub lines: usize,
}

/// Owns every view. Each view is a set of fully rendered lines, so folding a
/// record twice, or the same port from two documents, leaves it unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregator {
    views: BTreeMap<ViewKind, BTreeSet<String>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, kind: ViewKind, line: String) {
        self.views.entry(kind).or_default().insert(line);
    }

    pub fn fold(&mut self, record: &PortRecord, class: Classification) {
        let port = &record.port;
        self.insert(ViewKind::Hosts, record.address.clone());
        self.insert(ViewKind::HostToPort, format!("{}:{}", record.address, port));
        for name in &record.hostnames {
            self.insert(ViewKind::Hostnames, name.clone());
            self.insert(ViewKind::HostnameToPort, format!("{}:{}", name, port));
        }

        if class.is_web {
            self.insert(ViewKind::HostToPortWeb, format!("{}:{}", record.address, port));
            for name in &record.hostnames {
                self.insert(ViewKind::HostnameToPortWeb, format!("{}:{}", name, port));
            }
        }

        if let Some(scheme) = class.scheme {
            let targets = std::iter::once(&record.address).chain(record.hostnames.iter());
            for target in targets {
                self.insert(ViewKind::Urls, format!("{}://{}:{}", scheme, target, port));
            }
        }

        match render_row(record) {
            Ok(row) => self.insert(ViewKind::Csv, row),
            Err(e) => tracing::warn!(address = %record.address, port = %port, error = %e, "csv row not rendered"),
        }
    }

    /// Lines of one view in sorted order; empty if nothing was folded into it.
    pub fn lines(&self, kind: ViewKind) -> Vec<&str> {
        self.views
            .get(&kind)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, kind: ViewKind) -> usize {
        self.views.get(&kind).map(BTreeSet::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.views.values().all(BTreeSet::is_empty)
    }

    /// Write every view into `out_dir`, stopping at the first unwritable file.
    pub fn write_all(&self, out_dir: &Path, names: &OutputNames, mode: WriteMode) -> Result<Vec<WrittenView>, Error> {
        let mut written = Vec::with_capacity(ViewKind::ALL.len());
        for kind in ViewKind::ALL {
            let path = out_dir.join(names.get(kind));
            let lines = write_lines(&path, kind.header(), self.lines(kind), mode)?;
            written.push(WrittenView { kind, path, lines });
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Scheme;

    fn record(hostnames: &[&str]) -> PortRecord {
        PortRecord {
            address: "10.0.0.5".into(),
            hostnames: hostnames.iter().map(|s| s.to_string()).collect(),
            port: "443".into(),
            service_name: "https".into(),
            notes: "todo".into(),
            ..PortRecord::default()
        }
    }

    const WEB: Classification = Classification { is_web: true, scheme: Some(Scheme::Https) };
    const NOT_WEB: Classification = Classification { is_web: false, scheme: None };

    #[test]
    fn hostnames_fan_out() {
        let mut agg = Aggregator::new();
        agg.fold(&record(&["a", "b"]), WEB);
        assert_eq!(agg.lines(ViewKind::HostnameToPort), vec!["a:443", "b:443"]);
        assert_eq!(agg.lines(ViewKind::HostToPort), vec!["10.0.0.5:443"]);
        assert_eq!(agg.lines(ViewKind::HostnameToPortWeb), vec!["a:443", "b:443"]);
        assert_eq!(
            agg.lines(ViewKind::Urls),
            vec!["https://10.0.0.5:443", "https://a:443", "https://b:443"]
        );
        assert_eq!(agg.len(ViewKind::Csv), 1);
    }

    #[test]
    fn folding_twice_is_idempotent() {
        let mut once = Aggregator::new();
        once.fold(&record(&["a"]), WEB);
        let mut twice = once.clone();
        twice.fold(&record(&["a"]), WEB);
        assert_eq!(once, twice);
    }

    #[test]
    fn non_web_records_skip_web_views() {
        let mut agg = Aggregator::new();
        agg.fold(&record(&["a"]), NOT_WEB);
        assert!(agg.lines(ViewKind::HostToPortWeb).is_empty());
        assert!(agg.lines(ViewKind::HostnameToPortWeb).is_empty());
        assert!(agg.lines(ViewKind::Urls).is_empty());
        assert_eq!(agg.lines(ViewKind::Hosts), vec!["10.0.0.5"]);
        assert_eq!(agg.lines(ViewKind::Hostnames), vec!["a"]);
        assert_eq!(agg.len(ViewKind::Csv), 1);
    }

    #[test]
    fn output_names_fall_back_to_defaults() {
        let mut names = OutputNames::default();
        names.set(ViewKind::Csv, "scan.csv");
        assert_eq!(names.get(ViewKind::Csv), "scan.csv");
        assert_eq!(names.get(ViewKind::Urls), "urls_base.txt");
    }

    #[test]
    fn empty_aggregator() {
        let agg = Aggregator::new();
        assert!(agg.is_empty());
        assert!(agg.lines(ViewKind::Hosts).is_empty());
    }
}
