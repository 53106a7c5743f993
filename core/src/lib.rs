//! Core utilities and shared types for the scan conversion tools.

pub mod sink;
pub mod xml;

pub use sink::{write_lines, WriteMode};
pub use xml::{discover_documents, ScanDocument};

use std::path::PathBuf;
use thiserror::Error;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Failures surfaced by document loading and output writing.
///
/// Absent attributes or sub-elements are never errors; they read as empty values.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse {}: {source}", path.display())]
    Parse { path: PathBuf, source: roxmltree::Error },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: std::io::Error },
    #[error("not a directory: {}", .0.display())]
    InputNotDirectory(PathBuf),
    #[error("no XML documents found in {}", .0.display())]
    NoDocuments(PathBuf),
    #[error("none of the {0} documents could be parsed")]
    NothingParsed(usize),
}
