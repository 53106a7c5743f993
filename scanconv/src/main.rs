use anyhow::Result;
#[cfg(any(feature = "lists", feature = "merge"))]
use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json }

impl OutputFormat {
    fn from_config(s: &str) -> Option<Self> {
        match s {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

#[cfg(feature = "lists")]
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum MatchArg {
    /// Service name must be exactly http/https
    #[value(alias = "strict_match")]
    Strict,
    /// Service name only has to contain http/https
    #[value(alias = "substring_match")]
    Substring,
}

#[cfg(feature = "lists")]
impl From<MatchArg> for nmap_lists::MatchMode {
    fn from(m: MatchArg) -> Self {
        match m {
            MatchArg::Strict => nmap_lists::MatchMode::Strict,
            MatchArg::Substring => nmap_lists::MatchMode::Substring,
        }
    }
}

#[cfg(feature = "lists")]
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum WriteArg { Append, Overwrite }

#[cfg(feature = "lists")]
impl From<WriteArg> for scanconv_core::WriteMode {
    fn from(w: WriteArg) -> Self {
        match w {
            WriteArg::Append => scanconv_core::WriteMode::Append,
            WriteArg::Overwrite => scanconv_core::WriteMode::Overwrite,
        }
    }
}

mod config;

#[derive(Debug, Parser)]
#[command(name = "scanconv", version, about = "Convert nmap/masscan XML results into lists, URLs and CSV")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./scanconv.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Flatten nmap XML into host/port lists, web URLs and a CSV summary
    #[cfg(feature = "lists")]
    Lists {
        /// Single nmap XML file
        #[arg(short = 'n', long, value_name = "FILE", conflicts_with = "input_dir", required_unless_present = "input_dir")]
        nmap_xml: Option<PathBuf>,
        /// Directory of nmap XML files (non-recursive); unparseable files are skipped
        #[arg(short = 'i', long, value_name = "DIR", conflicts_with = "nmap_xml")]
        input_dir: Option<PathBuf>,
        /// Directory for all output files (default: current directory)
        #[arg(short = 'o', long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
        /// Output file for HOST; default: 'hosts.txt'
        #[arg(long, value_name = "NAME")]
        hosts: Option<String>,
        /// Output file for HOSTNAME; default: 'hostnames.txt'
        #[arg(long, value_name = "NAME")]
        hostnames: Option<String>,
        /// Output file for HOST:PORT; default: 'host_to_port.txt'
        #[arg(long, value_name = "NAME")]
        host_to_port: Option<String>,
        /// Output file for HOSTNAME:PORT; default: 'hostname_to_port.txt'
        #[arg(long, value_name = "NAME")]
        hostname_to_port: Option<String>,
        /// Output file for HOST:PORT of web services; default: 'host_to_port_web.txt'
        #[arg(long, value_name = "NAME")]
        host_to_port_web: Option<String>,
        /// Output file for HOSTNAME:PORT of web services; default: 'hostname_to_port_web.txt'
        #[arg(long, value_name = "NAME")]
        hostname_to_port_web: Option<String>,
        /// Output file for scheme://HOST:PORT; default: 'urls_base.txt'
        #[arg(long, value_name = "NAME")]
        urls_base: Option<String>,
        /// Output file for CSV; default: 'nmap.csv'
        #[arg(long, value_name = "NAME")]
        csv: Option<String>,
        /// How service names are matched against http/https (default: substring)
        #[arg(long, value_enum)]
        match_mode: Option<MatchArg>,
        /// Append to or overwrite existing output files (default: overwrite)
        #[arg(long, value_enum)]
        write_mode: Option<WriteArg>,
        /// Only include ports whose state is open
        #[arg(long, default_value_t = false)]
        only_open: bool,
        /// Summary format on stdout
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Merge every nmap XML file in a directory into one document
    #[cfg(feature = "merge")]
    Merge {
        /// Directory containing the nmap XML files to merge
        #[arg(short = 'i', long, value_name = "DIR")]
        input_dir: PathBuf,
        /// Merged output file; default: './nmap_merged.xml'
        #[arg(short = 'o', long, value_name = "FILE")]
        output_file: Option<PathBuf>,
        /// Summary format on stdout
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Build an nmap follow-up script from masscan XML output
    #[cfg(feature = "pivot")]
    Pivot {
        /// masscan XML output
        #[arg(short = 'm', long, value_name = "FILE")]
        masscan_xml: PathBuf,
        /// nmap output directory for each target scan; default: 'nmap'
        #[arg(short = 'o', long, value_name = "DIR")]
        out_dir: Option<String>,
        /// Script file to write; default: 'start_nmap.sh'
        #[arg(long, value_name = "FILE")]
        script: Option<PathBuf>,
        /// Host->ports list file to write; default: 'host_and_ports.list'
        #[arg(long, value_name = "FILE")]
        list: Option<PathBuf>,
        /// nmap flags for every generated command
        #[arg(long, allow_hyphen_values = true)]
        nmap_args: Option<String>,
        /// Progress echo every N hosts (0 disables)
        #[arg(long)]
        progress_every: Option<usize>,
        /// Summary format on stdout
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose { 0 => "warn", 1 => "info", _ => "debug" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    #[cfg(any(feature = "lists", feature = "merge", feature = "pivot"))]
    let loaded_cfg = config::load_config(cli.config.as_deref()).unwrap_or_default();
    #[cfg(not(any(feature = "lists", feature = "merge", feature = "pivot")))]
    let _loaded_cfg: Option<config::Config> = None;
    match cli.command {
        Commands::Version => {
            println!("scanconv {} (core {})", env!("CARGO_PKG_VERSION"), scanconv_core::version());
        }
        #[cfg(feature = "lists")]
        Commands::Lists {
            nmap_xml, input_dir, mut out_dir, hosts, hostnames, host_to_port, hostname_to_port,
            host_to_port_web, hostname_to_port_web, urls_base, csv, match_mode, write_mode, mut only_open, format,
        } => {
            use nmap_lists::{Aggregator, ListsOptions, OutputNames, ViewKind};
            use scanconv_core::discover_documents;

            let cfg = loaded_cfg.lists.clone().unwrap_or_default();
            if out_dir.is_none() { out_dir = cfg.out_dir.clone(); }
            if !only_open { only_open = cfg.only_open.unwrap_or(false); }
            let match_mode = match_mode.or_else(|| cfg.match_mode.as_deref().and_then(config_value::<MatchArg>));
            let write_mode = write_mode.or_else(|| cfg.write_mode.as_deref().and_then(config_value::<WriteArg>));
            let format = format
                .or_else(|| cfg.format.as_deref().and_then(OutputFormat::from_config))
                .unwrap_or(OutputFormat::Text);
            let opts = ListsOptions {
                match_mode: match_mode.map(Into::into).unwrap_or_default(),
                only_open,
            };
            let mode: scanconv_core::WriteMode = write_mode.map(Into::into).unwrap_or_default();
            let out_dir = out_dir.unwrap_or_else(|| PathBuf::from("."));

            let mut names = OutputNames::default();
            let overrides = [
                (ViewKind::Hosts, hosts, &cfg.hosts),
                (ViewKind::Hostnames, hostnames, &cfg.hostnames),
                (ViewKind::HostToPort, host_to_port, &cfg.host_to_port),
                (ViewKind::HostnameToPort, hostname_to_port, &cfg.hostname_to_port),
                (ViewKind::HostToPortWeb, host_to_port_web, &cfg.host_to_port_web),
                (ViewKind::HostnameToPortWeb, hostname_to_port_web, &cfg.hostname_to_port_web),
                (ViewKind::Urls, urls_base, &cfg.urls_base),
                (ViewKind::Csv, csv, &cfg.csv),
            ];
            for (kind, flag, from_cfg) in overrides {
                if let Some(name) = flag.or_else(|| from_cfg.clone()) {
                    names.set(kind, name);
                }
            }

            let mut agg = Aggregator::new();
            if let Some(file) = nmap_xml {
                nmap_lists::collect_file(&file, &opts, &mut agg)?;
            } else if let Some(dir) = input_dir {
                let paths = discover_documents(&dir)?;
                if paths.is_empty() {
                    return Err(scanconv_core::Error::NoDocuments(dir).into());
                }
                let report = nmap_lists::collect_paths(&paths, &opts, &mut agg);
                if report.documents == 0 {
                    return Err(scanconv_core::Error::NothingParsed(paths.len()).into());
                }
                tracing::info!(documents = report.documents, skipped = report.skipped.len(), records = report.records, "input collected");
            } else {
                return Err(anyhow!("provide --nmap-xml <FILE> or --input-dir <DIR>"));
            }

            let written = agg.write_all(&out_dir, &names, mode)?;
            for w in written {
                match format {
                    OutputFormat::Text => println!("{} written to '{}' ({} lines)", w.kind.label(), w.path.display(), w.lines),
                    OutputFormat::Json => {
                        let obj = serde_json::json!({
                            "view": format!("{:?}", w.kind),
                            "label": w.kind.label(),
                            "path": w.path,
                            "lines": w.lines,
                        });
                        println!("{}", serde_json::to_string(&obj)?);
                    }
                }
            }
        }
        #[cfg(feature = "merge")]
        Commands::Merge { input_dir, output_file, format } => {
            let output_file = output_file
                .or_else(|| loaded_cfg.merge.as_ref().and_then(|m| m.output_file.clone()))
                .unwrap_or_else(|| PathBuf::from("./nmap_merged.xml"));
            if !input_dir.is_dir() {
                return Err(anyhow!("input directory '{}' not found", input_dir.display()));
            }
            let outcome = xml_merge::merge_dir(&input_dir, &output_file)?;
            let files = outcome.merged + outcome.skipped.len();
            match format {
                OutputFormat::Text => println!(
                    "Successfully merged {} of {} Nmap XML files ({} hosts) into {}",
                    outcome.merged, files, outcome.hosts, output_file.display()
                ),
                OutputFormat::Json => {
                    let skipped: Vec<_> = outcome.skipped.iter()
                        .map(|(p, e)| serde_json::json!({ "path": p, "error": e.to_string() }))
                        .collect();
                    let obj = serde_json::json!({
                        "output": output_file,
                        "merged": outcome.merged,
                        "hosts": outcome.hosts,
                        "skipped": skipped,
                    });
                    println!("{}", serde_json::to_string(&obj)?);
                }
            }
        }
        #[cfg(feature = "pivot")]
        Commands::Pivot { masscan_xml, out_dir, script, list, nmap_args, progress_every, format } => {
            let cfg = loaded_cfg.pivot.clone().unwrap_or_default();
            let mut opts = masscan_pivot::PivotOptions::default();
            if let Some(d) = out_dir.or(cfg.out_dir) { opts.out_dir = d; }
            if let Some(a) = nmap_args.or(cfg.nmap_args) { opts.nmap_args = a; }
            if let Some(n) = progress_every.or(cfg.progress_every) { opts.progress_every = n; }
            let script = script.or(cfg.script_file).unwrap_or_else(|| PathBuf::from("start_nmap.sh"));
            let list = list.or(cfg.list_file).unwrap_or_else(|| PathBuf::from("host_and_ports.list"));

            let summary = masscan_pivot::pivot_file(&masscan_xml, &script, &list, &opts)?;
            match format {
                OutputFormat::Text => {
                    println!("Total {} hosts found", summary.hosts);
                    println!("Nmap script written to '{}'", script.display());
                    println!("Host->Ports list written to '{}'", list.display());
                }
                OutputFormat::Json => {
                    let obj = serde_json::json!({
                        "hosts": summary.hosts,
                        "ports": summary.ports,
                        "script": script,
                        "list": list,
                    });
                    println!("{}", serde_json::to_string(&obj)?);
                }
            }
        }
    }
    Ok(())
}

/// Parse a config-file string with the same spellings the CLI accepts.
#[cfg(feature = "lists")]
fn config_value<T: ValueEnum>(s: &str) -> Option<T> {
    match T::from_str(s, true) {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(value = %s, "unrecognised config value ignored");
            None
        }
    }
}
