//! Flatten nmap XML results into address/hostname/port lists, web URL lists and CSV.
//!
//! Each document goes through [`record::extract_records`], every record is tagged by
//! [`classify::classify`] and then folded into an [`Aggregator`], whose views are
//! written once all documents are in.

pub mod classify;
pub mod csv_row;
pub mod record;
pub mod views;

pub use classify::{classify, Classification, MatchMode, Scheme};
pub use csv_row::{encode_field, render_row, CSV_HEADER};
pub use record::{extract_port, extract_records, host_identity, HostIdentity, PortRecord};
pub use views::{Aggregator, OutputNames, ViewKind, WrittenView};

use scanconv_core::{Error, ScanDocument};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListsOptions {
    pub match_mode: MatchMode,
    pub only_open: bool,
}

/// Outcome of folding a batch of documents.
#[derive(Debug, Default)]
pub struct CollectReport {
    pub documents: usize,
    pub records: usize,
    pub skipped: Vec<(PathBuf, Error)>,
}

/// Fold every port record of one document into `agg`. Returns the record count.
pub fn collect_document(doc: &ScanDocument, opts: &ListsOptions, agg: &mut Aggregator) -> Result<usize, Error> {
    let tree = doc.parse()?;
    let records = extract_records(&tree, opts.only_open);
    for r in &records {
        agg.fold(r, classify(r, opts.match_mode));
    }
    tracing::info!(path = %doc.path.display(), records = records.len(), "collected document");
    Ok(records.len())
}

/// Load one file and fold it. Read and parse failures are returned to the caller.
pub fn collect_file(path: &Path, opts: &ListsOptions, agg: &mut Aggregator) -> Result<usize, Error> {
    let doc = ScanDocument::load(path)?;
    collect_document(&doc, opts, agg)
}

/// Fold a batch of files. A file that cannot be read or parsed is logged and
/// skipped; the rest of the batch still goes through.
pub fn collect_paths(paths: &[PathBuf], opts: &ListsOptions, agg: &mut Aggregator) -> CollectReport {
    let mut report = CollectReport::default();
    for path in paths {
        match collect_file(path, opts, agg) {
            Ok(n) => {
                report.documents += 1;
                report.records += n;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping document");
                report.skipped.push((path.clone(), e));
            }
        }
    }
    report
}
