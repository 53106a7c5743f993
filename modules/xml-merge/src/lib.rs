//! Merge several nmap XML result files into one document.
//!
//! The first document that parses becomes the base. `host` elements from the
//! others are copied in verbatim, and the run metadata on the root element and
//! on `runstats/finished` is rewritten to describe the merge.

use roxmltree::{Document, Node};
use quick_xml::escape::escape;
use scanconv_core::xml::children;
use scanconv_core::{discover_documents, Error, ScanDocument};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug)]
pub struct MergeOutcome {
    pub xml: String,
    /// Documents that made it into the output, base included.
    pub merged: usize,
    pub hosts: usize,
    pub skipped: Vec<(PathBuf, Error)>,
}

/// Merge every `.xml` file in `input_dir` and write the result to `output`.
pub fn merge_dir(input_dir: &Path, output: &Path) -> Result<MergeOutcome, Error> {
    let paths = discover_documents(input_dir)?;
    if paths.is_empty() {
        return Err(Error::NoDocuments(input_dir.to_path_buf()));
    }
    let mut docs = Vec::with_capacity(paths.len());
    let mut unreadable = Vec::new();
    for path in &paths {
        match ScanDocument::load(path) {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable document");
                unreadable.push((path.clone(), e));
            }
        }
    }
    if docs.is_empty() {
        return Err(Error::NothingParsed(paths.len()));
    }
    let mut outcome = merge_documents(&docs, paths.len(), OffsetDateTime::now_utc())?;
    unreadable.append(&mut outcome.skipped);
    outcome.skipped = unreadable;

    let werr = |source: std::io::Error| Error::Write { path: output.to_path_buf(), source };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(werr)?;
    }
    std::fs::write(output, &outcome.xml).map_err(werr)?;
    Ok(outcome)
}

/// Merge already-loaded documents. `file_count` is the number reported in the
/// rewritten metadata, which counts every discovered file.
pub fn merge_documents(docs: &[ScanDocument], file_count: usize, now: OffsetDateTime) -> Result<MergeOutcome, Error> {
    let mut parsed: Vec<(&ScanDocument, Document)> = Vec::new();
    let mut skipped = Vec::new();
    for doc in docs {
        match doc.parse() {
            Ok(tree) => parsed.push((doc, tree)),
            Err(e) => {
                tracing::warn!(path = %doc.path.display(), error = %e, "skipping unparseable document");
                skipped.push((doc.path.clone(), e));
            }
        }
    }
    let Some(((base_doc, base_tree), rest)) = parsed.split_first() else {
        return Err(Error::NothingParsed(docs.len()));
    };

    let mut extra_hosts = Vec::new();
    for (doc, tree) in rest {
        let hosts = children(tree.root_element(), "host");
        tracing::debug!(path = %doc.path.display(), hosts = hosts.len(), "appending hosts");
        extra_hosts.extend(hosts.iter().map(|h| &doc.text[h.range()]));
    }
    let base_hosts = children(base_tree.root_element(), "host").len();

    let xml = render(base_doc, base_tree, &extra_hosts, file_count, now);
    Ok(MergeOutcome { xml, merged: parsed.len(), hosts: base_hosts + extra_hosts.len(), skipped })
}

fn render(doc: &ScanDocument, tree: &Document, extra_hosts: &[&str], file_count: usize, now: OffsetDateTime) -> String {
    let text = doc.text.as_str();
    let root = tree.root_element();
    let mut out = String::with_capacity(text.len() + extra_hosts.iter().map(|h| h.len() + 1).sum::<usize>());
    out.push_str(XML_DECLARATION);
    out.push_str(prolog(text, root.range().start));

    let started = now
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_else(|_| String::new());
    let root_attrs = with_overrides(
        root,
        &[("args", format!("nmap (merged from {} files)", file_count)), ("startstr", started)],
    );
    out.push_str(&start_tag(root.tag_name().name(), &root_attrs, false));

    let nodes: Vec<Node> = root.children().collect();
    let insert_after = nodes.iter().rposition(|n| n.has_tag_name("host"));
    let insert_before = nodes.iter().position(|n| n.has_tag_name("runstats"));
    let splice_hosts = |out: &mut String| {
        for host in extra_hosts {
            out.push('\n');
            out.push_str(host);
        }
    };

    let mut spliced = false;
    for (i, node) in nodes.iter().enumerate() {
        if !spliced && insert_after.is_none() && insert_before == Some(i) {
            splice_hosts(&mut out);
            out.push('\n');
            spliced = true;
        }
        if node.has_tag_name("runstats") {
            out.push_str(&render_runstats(*node, text, file_count, now));
        } else {
            out.push_str(&text[node.range()]);
        }
        if !spliced && insert_after == Some(i) {
            splice_hosts(&mut out);
            spliced = true;
        }
    }
    if !spliced {
        splice_hosts(&mut out);
        out.push('\n');
    }
    out.push_str(&format!("</{}>\n", root.tag_name().name()));
    out
}

/// Anything between the XML declaration and the root element (DOCTYPE, stylesheet).
fn prolog(text: &str, root_start: usize) -> &str {
    let head = text[..root_start].trim_start_matches('\u{feff}');
    let body = match head.trim_start().strip_prefix("<?xml ") {
        Some(rest) => rest.find("?>").map(|i| &rest[i + 2..]).unwrap_or(rest),
        None => head,
    };
    body.trim_start_matches(|c: char| c == '\r' || c == '\n')
}

fn render_runstats(node: Node, text: &str, file_count: usize, now: OffsetDateTime) -> String {
    let mut out = start_tag("runstats", &with_overrides(node, &[]), false);
    for c in node.children() {
        if c.has_tag_name("finished") {
            let timestr = now
                .format(format_description!(
                    "[weekday repr:short] [month repr:short] [day] [hour]:[minute]:[second] [year]"
                ))
                .unwrap_or_else(|_| String::new());
            let attrs = with_overrides(
                c,
                &[
                    ("time", now.unix_timestamp().to_string()),
                    ("timestr", timestr),
                    ("summary", format!("Merged from {} files", file_count)),
                ],
            );
            out.push_str(&start_tag("finished", &attrs, true));
        } else {
            out.push_str(&text[c.range()]);
        }
    }
    out.push_str("</runstats>");
    out
}

/// Element attributes in source order, with `overrides` replacing or appending.
fn with_overrides(node: Node, overrides: &[(&str, String)]) -> Vec<(String, String)> {
    let mut attrs: Vec<(String, String)> =
        node.attributes().map(|a| (a.name().to_string(), a.value().to_string())).collect();
    for (name, value) in overrides {
        match attrs.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value.clone(),
            None => attrs.push((name.to_string(), value.clone())),
        }
    }
    attrs
}

fn start_tag(name: &str, attrs: &[(String, String)], empty: bool) -> String {
    let mut s = format!("<{}", name);
    for (k, v) in attrs {
        let value = escape(v);
        // keep whitespace characters from being normalised away on the next read
        let value = if value.contains(['\n', '\r', '\t']) {
            value.replace('\n', "&#10;").replace('\r', "&#13;").replace('\t', "&#9;").into()
        } else {
            value
        };
        s.push_str(&format!(" {}=\"{}\"", k, value));
    }
    s.push_str(if empty { "/>" } else { ">" });
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanconv_core::xml::child;
    use time::macros::datetime;

    fn finished_summary(tree: &Document) -> Option<String> {
        let runstats = child(tree.root_element(), "runstats")?;
        child(runstats, "finished")?.attribute("summary").map(str::to_string)
    }

    fn scan(addr: &str, start: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -sV {addr}" startstr="{start}">
<scaninfo type="syn" protocol="tcp"/>
<host><address addr="{addr}" addrtype="ipv4"/><ports><port protocol="tcp" portid="80"><service name="http" product="a &amp; b"/></port></ports></host>
<runstats><finished time="1" timestr="old" summary="1 IP address" exit="success"/><hosts up="1" down="0" total="1"/></runstats>
</nmaprun>
"#
        )
    }

    const NOW: OffsetDateTime = datetime!(2024-03-05 14:07:09 UTC);

    fn addrs(tree: &Document) -> Vec<String> {
        children(tree.root_element(), "host")
            .into_iter()
            .filter_map(|h| child(h, "address").and_then(|a| a.attribute("addr")).map(str::to_string))
            .collect()
    }

    #[test]
    fn hosts_from_all_documents_end_up_in_the_base() {
        let docs = vec![
            ScanDocument::from_text("a.xml", scan("10.0.0.1", "first")),
            ScanDocument::from_text("b.xml", scan("10.0.0.2", "second")),
            ScanDocument::from_text("c.xml", scan("10.0.0.3", "third")),
        ];
        let outcome = merge_documents(&docs, 3, NOW).unwrap();
        assert_eq!(outcome.merged, 3);
        assert_eq!(outcome.hosts, 3);
        assert!(outcome.xml.starts_with(XML_DECLARATION));

        let merged = ScanDocument::from_text("merged.xml", outcome.xml);
        let tree = merged.parse().unwrap();
        assert_eq!(addrs(&tree), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        let root = tree.root_element();
        assert_eq!(root.attribute("args"), Some("nmap (merged from 3 files)"));
        assert_eq!(root.attribute("startstr"), Some("2024-03-05 14:07:09"));
        assert_eq!(root.attribute("scanner"), Some("nmap"));
        assert_eq!(finished_summary(&tree).as_deref(), Some("Merged from 3 files"));
        let finished = child(child(root, "runstats").unwrap(), "finished").unwrap();
        assert_eq!(finished.attribute("timestr"), Some("Tue Mar 05 14:07:09 2024"));
        assert_eq!(finished.attribute("time"), Some(NOW.unix_timestamp().to_string().as_str()));
        assert_eq!(finished.attribute("exit"), Some("success"));
        // hosts are placed ahead of runstats
        let last = root.children().filter(|n| n.is_element()).last().unwrap();
        assert!(last.has_tag_name("runstats"));
        // escaped content survives the copy
        let service = tree.descendants().find(|n| n.has_tag_name("service")).unwrap();
        assert_eq!(service.attribute("product"), Some("a & b"));
    }

    #[test]
    fn unparseable_documents_are_skipped_and_next_becomes_base() {
        let docs = vec![
            ScanDocument::from_text("a.xml", "<nmaprun><host>"),
            ScanDocument::from_text("b.xml", scan("10.0.0.2", "second")),
            ScanDocument::from_text("c.xml", scan("10.0.0.3", "third")),
        ];
        let outcome = merge_documents(&docs, 3, NOW).unwrap();
        assert_eq!(outcome.merged, 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].0, PathBuf::from("a.xml"));
        let merged = ScanDocument::from_text("merged.xml", outcome.xml);
        let tree = merged.parse().unwrap();
        assert_eq!(addrs(&tree), vec!["10.0.0.2", "10.0.0.3"]);
        assert_eq!(tree.root_element().attribute("args"), Some("nmap (merged from 3 files)"));
    }

    #[test]
    fn nothing_parseable_is_an_error() {
        let docs = vec![ScanDocument::from_text("a.xml", "not xml")];
        assert!(matches!(merge_documents(&docs, 1, NOW), Err(Error::NothingParsed(1))));
    }

    #[test]
    fn base_without_hosts_or_runstats() {
        let docs = vec![
            ScanDocument::from_text("a.xml", "<nmaprun scanner=\"nmap\"/>"),
            ScanDocument::from_text("b.xml", scan("10.0.0.2", "second")),
        ];
        let outcome = merge_documents(&docs, 2, NOW).unwrap();
        let merged = ScanDocument::from_text("merged.xml", outcome.xml);
        let tree = merged.parse().unwrap();
        assert_eq!(addrs(&tree), vec!["10.0.0.2"]);
        assert_eq!(finished_summary(&tree), None);
    }

    #[test]
    fn merge_dir_writes_output_and_requires_documents() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let target = out.path().join("merged/nmap_merged.xml");
        assert!(matches!(merge_dir(input.path(), &target), Err(Error::NoDocuments(_))));

        std::fs::write(input.path().join("a.xml"), scan("10.0.0.1", "first")).unwrap();
        std::fs::write(input.path().join("b.xml"), scan("10.0.0.2", "second")).unwrap();
        let outcome = merge_dir(input.path(), &target).unwrap();
        assert_eq!(outcome.hosts, 2);
        let written = ScanDocument::load(&target).unwrap();
        assert_eq!(addrs(&written.parse().unwrap()).len(), 2);
    }

    #[test]
    fn attribute_values_are_escaped() {
        let attrs = vec![("args".to_string(), "a<b & \"c\"\nnext".to_string())];
        let tag = start_tag("nmaprun", &attrs, true);
        assert_eq!(tag, "<nmaprun args=\"a&lt;b &amp; &quot;c&quot;&#10;next\"/>");
        let doc = ScanDocument::from_text("tag.xml", tag);
        let tree = doc.parse().unwrap();
        assert_eq!(tree.root_element().attribute("args"), Some("a<b & \"c\"\nnext"));
    }

    #[test]
    fn byte_order_mark_does_not_duplicate_the_declaration() {
        let with_bom = format!("\u{feff}{}", scan("10.0.0.1", "first"));
        let docs = vec![
            ScanDocument::from_text("a.xml", with_bom),
            ScanDocument::from_text("b.xml", scan("10.0.0.2", "second")),
        ];
        let outcome = merge_documents(&docs, 2, NOW).unwrap();
        assert_eq!(outcome.xml.matches("<?xml ").count(), 1);
        assert!(outcome.xml.starts_with(XML_DECLARATION));
        assert!(outcome.xml.contains("<!DOCTYPE nmaprun>"));
        let merged = ScanDocument::from_text("merged.xml", outcome.xml);
        assert_eq!(addrs(&merged.parse().unwrap()), vec!["10.0.0.1", "10.0.0.2"]);
    }
}
