//! Tolerant read access over scan-result XML trees.
//!
//! Everything here treats absence as normal: a missing attribute reads as the
//! supplied default and a missing child as `None` or an empty list. Only a
//! document that is not well-formed XML produces an error.

use crate::Error;
use roxmltree::{Document, Node, ParsingOptions};
use std::path::{Path, PathBuf};

/// A scan-result document held in memory.
///
/// The parsed tree borrows from `text`, so callers keep the `ScanDocument`
/// alive and call [`ScanDocument::parse`] when they need the tree.
#[derive(Debug, Clone)]
pub struct ScanDocument {
    pub path: PathBuf,
    pub text: String,
}

impl ScanDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
        Ok(ScanDocument { path: path.to_path_buf(), text })
    }

    pub fn from_text(name: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        ScanDocument { path: name.into(), text: text.into() }
    }

    pub fn parse(&self) -> Result<Document<'_>, Error> {
        Document::parse_with_options(&self.text, parsing_options())
            .map_err(|source| Error::Parse { path: self.path.clone(), source })
    }
}

/// nmap and masscan both emit a DOCTYPE, which roxmltree rejects by default.
pub fn parsing_options() -> ParsingOptions {
    ParsingOptions { allow_dtd: true, ..ParsingOptions::default() }
}

/// Attribute value, or `default` when the attribute is absent.
pub fn attribute(node: Node, name: &str, default: &str) -> String {
    node.attribute(name).unwrap_or(default).to_string()
}

/// First child element with the given tag name.
pub fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

/// All child elements with the given tag name, in document order.
pub fn children<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Vec<Node<'a, 'input>> {
    node.children().filter(|n| n.has_tag_name(tag)).collect()
}

/// List the `.xml` files directly inside `dir`, sorted by path.
pub fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    if !dir.is_dir() {
        return Err(Error::InputNotDirectory(dir.to_path_buf()));
    }
    let entries = std::fs::read_dir(dir)
        .map_err(|source| Error::Read { path: dir.to_path_buf(), source })?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Read { path: dir.to_path_buf(), source })?;
        let path = entry.path();
        let is_xml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("xml"))
            .unwrap_or(false);
        if is_xml && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    tracing::debug!(dir = %dir.display(), count = found.len(), "discovered documents");
    Ok(found)
}
