use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use linex::config::{SizeLimit, ThreadCount};
use linex::loader::Snapshot;
use linex::output;
use linex::utils::progress::{percent_bar, ProgressBar};
use linex::utils::TextEncoding;
use linex::{CancelToken, Config, Document, ExportOptions, ExportSelection, Observer};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "linex")]
#[command(about = "Index and search text files too large for memory")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: ConfigArgs,

    /// Hide the progress bar
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Overrides for the config file
#[derive(Args)]
struct ConfigArgs {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Search threads: a number or `auto`
    #[arg(short = 'j', long, global = true)]
    threads: Option<ThreadCount>,

    /// Keep content up to this size in memory: bytes, `auto` or `off`
    #[arg(long, global = true)]
    memory_limit: Option<SizeLimit>,

    /// Compress content up to this size: bytes, `auto` or `off`
    #[arg(long, global = true)]
    compress_limit: Option<SizeLimit>,

    /// Force the text encoding instead of detecting it
    #[arg(long, global = true)]
    encoding: Option<TextEncoding>,

    /// Longest partial line in bytes
    #[arg(long, global = true)]
    max_partial_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the lines matching a query
    Search {
        file: PathBuf,

        /// Query, e.g. `error AND NOT cs:DEBUG`
        #[arg(required = true, trailing_var_arg = true)]
        query: Vec<String>,

        /// Prefix lines with their line number
        #[arg(short = 'n', long)]
        line_number: bool,

        /// Only print the number of matching partial lines
        #[arg(short, long)]
        count: bool,

        /// Stop after this many lines
        #[arg(short, long)]
        max_count: Option<usize>,

        /// Write the matching lines' raw bytes here instead
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Gzip the output file
        #[arg(long, requires = "output")]
        gzip: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
    /// Show content and storage statistics
    Stats { file: PathBuf },
    /// Copy lines to a file, byte for byte
    Export {
        file: PathBuf,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,

        /// 1-based inclusive line range, e.g. `10-20`
        #[arg(short, long)]
        lines: Option<String>,

        /// Gzip the output
        #[arg(long)]
        gzip: bool,
    },
    /// Print the effective configuration
    Config,
}

/// Reports progress on a terminal bar
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new(quiet: bool, message: &'static str) -> Self {
        let bar = percent_bar(quiet);
        bar.set_message(message);
        Self { bar }
    }

    fn restart(&self, message: &'static str) {
        self.bar.set_position(0);
        self.bar.set_message(message);
    }
}

impl Observer for CliObserver {
    fn on_progress(&self, percent: u8) {
        self.bar.set_position(percent as u64);
    }

    fn on_snapshot(&self, snapshot: Snapshot) {
        tracing::trace!(partials = snapshot.partial_count(), "snapshot");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = effective_config(&cli.options)?;
    let cancel = CancelToken::new();

    match cli.command {
        Commands::Search {
            file,
            query,
            line_number,
            count,
            max_count,
            output: out_file,
            gzip,
            no_color,
        } => {
            let observer = CliObserver::new(cli.quiet, "Loading");
            let mut doc = open(&file, config, &observer, &cancel)?;

            observer.restart("Searching");
            let result = doc.search(&query.join(" "), &observer, &cancel)?;
            observer.bar.finish_and_clear();
            if let Some(e) = result.error {
                return Err(e.context("Search failed"));
            }

            if count {
                println!("{}", result.match_count);
            } else if let Some(path) = out_file {
                let partials = doc.matches().take(max_count.unwrap_or(usize::MAX)).collect();
                export(&doc, &ExportSelection::Partials(partials), &path, gzip, &observer, &cancel)?;
            } else {
                let mut stdout = output::stdout(!no_color);
                output::print_matches(&mut stdout, &doc, line_number, max_count)?;
            }
        }
        Commands::Stats { file } => {
            let observer = CliObserver::new(cli.quiet, "Loading");
            let doc = open(&file, config, &observer, &cancel)?;
            observer.bar.finish_and_clear();
            output::print_stats(&mut output::stdout(true), &doc)?;
        }
        Commands::Export {
            file,
            output: out_file,
            lines,
            gzip,
        } => {
            let observer = CliObserver::new(cli.quiet, "Loading");
            let doc = open(&file, config, &observer, &cancel)?;
            let selection = match lines {
                Some(spec) => {
                    let (first, last) = parse_line_range(&spec)?;
                    let last = last.min(doc.line_count());
                    ExportSelection::Lines((first - 1..last).collect())
                }
                None => ExportSelection::All,
            };
            observer.restart("Exporting");
            export(&doc, &selection, &out_file, gzip, &observer, &cancel)?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Config file values with command line overrides applied
fn effective_config(args: &ConfigArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(threads) = args.threads {
        config.search_threads = threads;
    }
    if let Some(limit) = args.memory_limit {
        config.memory_limit = limit;
    }
    if let Some(limit) = args.compress_limit {
        config.compress_limit = limit;
    }
    if let Some(encoding) = args.encoding {
        config.encoding = Some(encoding);
    }
    if let Some(size) = args.max_partial_size {
        config.max_partial_size = size;
    }
    config.validate()?;
    Ok(config)
}

fn open(path: &Path, config: Config, observer: &CliObserver, cancel: &CancelToken) -> Result<Document> {
    let (doc, result) = Document::open(path, config, observer, cancel)?;
    if let Some(e) = result.error {
        return Err(e.context(format!("Failed to load {}", path.display())));
    }
    Ok(doc)
}

fn export(
    doc: &Document,
    selection: &ExportSelection,
    path: &Path,
    gzip: bool,
    observer: &CliObserver,
    cancel: &CancelToken,
) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    let result = doc.export(selection, &mut out, ExportOptions { gzip }, observer, cancel);
    observer.bar.finish_and_clear();
    if let Some(e) = result.error {
        return Err(e.context(format!("Failed to write {}", path.display())));
    }
    out.flush()?;
    Ok(())
}

/// Parse `a-b` or `a` into a 1-based inclusive range
fn parse_line_range(spec: &str) -> Result<(usize, usize)> {
    let (first, last) = match spec.split_once('-') {
        Some((a, b)) => (a.trim().parse::<usize>()?, b.trim().parse::<usize>()?),
        None => {
            let n = spec.trim().parse::<usize>()?;
            (n, n)
        }
    };
    if first == 0 || last < first {
        bail!("invalid line range '{}'", spec);
    }
    Ok((first, last))
}
