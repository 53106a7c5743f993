#![allow(dead_code)]
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "scanconv.yaml";

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct ListsConfig {
    pub out_dir: Option<PathBuf>,
    pub match_mode: Option<String>,
    pub write_mode: Option<String>,
    pub only_open: Option<bool>,
    pub format: Option<String>,
    pub hosts: Option<String>,
    pub hostnames: Option<String>,
    pub host_to_port: Option<String>,
    pub hostname_to_port: Option<String>,
    pub host_to_port_web: Option<String>,
    pub hostname_to_port_web: Option<String>,
    pub urls_base: Option<String>,
    pub csv: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct MergeConfig {
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct PivotConfig {
    pub out_dir: Option<String>,
    pub nmap_args: Option<String>,
    pub script_file: Option<PathBuf>,
    pub list_file: Option<PathBuf>,
    pub progress_every: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub lists: Option<ListsConfig>,
    pub merge: Option<MergeConfig>,
    pub pivot: Option<PivotConfig>,
}

/// Load the config at `path`, or `./scanconv.yaml` when no path is given and it exists.
/// A file that cannot be read or parsed is reported and ignored.
pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config not readable, using defaults");
            return None;
        }
    };
    parse_config(&s)
        .map_err(|e| tracing::warn!(path = %path.display(), error = %e, "config not valid YAML, using defaults"))
        .ok()
}

pub fn parse_config(s: &str) -> Result<Config, serde_yaml::Error> {
    serde_yaml::from_str(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_sections() {
        let cfg = parse_config(
            r#"
lists:
  out_dir: out
  match_mode: strict
  write_mode: append
  only_open: true
  csv: scan.csv
merge:
  output_file: merged.xml
pivot:
  nmap_args: "-sV -Pn"
  progress_every: 10
"#,
        )
        .unwrap();
        let lists = cfg.lists.unwrap();
        assert_eq!(lists.out_dir, Some(PathBuf::from("out")));
        assert_eq!(lists.match_mode.as_deref(), Some("strict"));
        assert_eq!(lists.only_open, Some(true));
        assert_eq!(lists.csv.as_deref(), Some("scan.csv"));
        assert_eq!(lists.urls_base, None);
        assert_eq!(cfg.merge.unwrap().output_file, Some(PathBuf::from("merged.xml")));
        let pivot = cfg.pivot.unwrap();
        assert_eq!(pivot.nmap_args.as_deref(), Some("-sV -Pn"));
        assert_eq!(pivot.progress_every, Some(10));
    }

    #[test]
    fn empty_sections_are_none() {
        let cfg = parse_config("{}").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn explicit_missing_file_is_ignored() {
        assert_eq!(load_config(Some(Path::new("/nonexistent/scanconv.yaml"))), None);
    }
}
