//! Web / protocol classification of port records.

use crate::record::PortRecord;
use std::fmt;

/// How the service name is compared against `http` / `https`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Whole name must equal `http` or `https` (ignoring case).
    Strict,
    /// Name only has to contain `http` or `https` (ignoring case), so
    /// `ssl/https-alt` or `http-proxy` count as web.
    #[default]
    Substring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_web: bool,
    pub scheme: Option<Scheme>,
}

/// A certificate always means https; otherwise the service name decides.
pub fn classify(record: &PortRecord, mode: MatchMode) -> Classification {
    let name = record.service_name.to_lowercase();
    let has_tls = !record.tls_subject.is_empty();
    let named = |proto: &str| match mode {
        MatchMode::Strict => name == proto,
        MatchMode::Substring => name.contains(proto),
    };
    let scheme = if has_tls || named("https") {
        Some(Scheme::Https)
    } else if named("http") {
        Some(Scheme::Http)
    } else {
        None
    };
    Classification { is_web: scheme.is_some() || has_tls, scheme }
}
