//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use artiscan::core::config::{Config, Profile, ScanOptions, TypeOverride};
use artiscan::core::errors::ScanError;
use artiscan::scanner::item::ContentItem;
use artiscan::scanner::sniff::ContentType;
use artiscan::session::{DEFAULT_QUERY, Diagnostic, ExtractSummary, Session};

/// artiscan - scan forensic artifact bundles and query their decoded content.
#[derive(Debug, Parser)]
#[command(
    name = "artiscan",
    author,
    version,
    about = "Scan sysdiagnose bundles and query plist, SQLite, JSON and text artifacts",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Report unmatched entries and skipped items on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Match filters case-insensitively.
    #[arg(long, global = true)]
    case_insensitive: bool,
    /// Force a content type for matching paths (e.g. `**/*.stub=plist`); repeatable.
    #[arg(long = "cfg", global = true, value_name = "GLOB=TYPE")]
    overrides: Vec<TypeOverride>,
    /// Named override preset (`standard` or `sysdiagnose`).
    #[arg(long, global = true, value_name = "NAME")]
    profile: Option<Profile>,
    /// Treat archives found inside the input as plain files.
    #[arg(long, global = true)]
    no_expand: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List artifacts matching the filters.
    Scan(ScanArgs),
    /// Decode matching artifacts and print query results, one JSON document per line.
    Jq(JqArgs),
    /// Write each decoded artifact below an output directory.
    Extract(ExtractArgs),
}

#[derive(Debug, Clone, Args)]
struct InputArgs {
    /// Directory, archive (.zip, .tar, .tar.gz, .tgz, .tar.xz) or single file to scan.
    #[arg(short, long, value_name = "PATH")]
    input: PathBuf,
    /// Glob filter; repeat for several (e.g. `**/SystemVersion.plist`).
    #[arg(short, long = "filter", value_name = "GLOB", required = true, num_args = 1..)]
    filters: Vec<String>,
}

#[derive(Debug, Clone, Args)]
struct ScanArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Decode each item and report its effective content type.
    #[arg(long)]
    types: bool,
    /// Query validated against the scan; it does not change the listed items.
    #[arg(long, value_name = "QUERY")]
    query: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct JqArgs {
    /// Query applied to each decoded artifact.
    #[arg(value_name = "QUERY", default_value = DEFAULT_QUERY)]
    query: String,
    #[command(flatten)]
    input: InputArgs,
    /// Pretty-print each result.
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Clone, Args)]
struct ExtractArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Destination directory; must be empty or missing unless `--force` is given.
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,
    /// Write into a non-empty destination, replacing files with the same path.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Scan or configuration failure.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }
    init_tracing(cli);

    let options = scan_options(cli)?;
    let result = match &cli.command {
        Command::Scan(args) => run_scan(cli, args, options),
        Command::Jq(args) => run_jq(args, options),
        Command::Extract(args) => run_extract(cli, args, options),
    };
    match result {
        // `artiscan ... | head` closes stdout early; that is not a failure.
        Err(CliError::Io(err)) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn init_tracing(cli: &Cli) {
    let default_directive = if cli.verbose {
        "artiscan=debug"
    } else {
        "artiscan=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    // A global subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!cli.no_color && io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn scan_options(cli: &Cli) -> Result<ScanOptions, CliError> {
    let mut options = Config::load(cli.config.as_deref())?.scan;
    if cli.verbose {
        options.verbose = true;
    }
    if cli.case_insensitive {
        options.case_sensitive = false;
    }
    if cli.no_expand {
        options.expand_archives = false;
    }
    if let Some(profile) = cli.profile {
        options.profile = profile;
    }
    // Flags first so they win over rules from the config file.
    options.overrides.splice(0..0, cli.overrides.iter().cloned());
    Ok(options)
}

fn session(input: &InputArgs, options: ScanOptions) -> Session {
    let verbose = options.verbose;
    let session = Session::new(&input.input)
        .filter(&input.filters)
        .options(options);
    if verbose {
        session.with_observer(|diagnostic| eprintln!("{}", format_diagnostic(diagnostic)))
    } else {
        session
    }
}

fn format_diagnostic(diagnostic: &Diagnostic) -> String {
    match diagnostic {
        Diagnostic::Skipped { .. } => format!("{} {diagnostic}", "warn".yellow()),
        Diagnostic::Unmatched { .. } | Diagnostic::NotRegular { .. } => {
            format!("{} {diagnostic}", "note".dimmed())
        }
    }
}

fn run_scan(cli: &Cli, args: &ScanArgs, options: ScanOptions) -> Result<(), CliError> {
    let mut session = session(&args.input, options);
    if let Some(query) = &args.query {
        session = session.query(query);
    }
    let mut scan = session.scan()?;
    let mode = output_mode(cli);
    let mut stdout = io::stdout().lock();

    for mut item in scan.by_ref() {
        let (content_type, error) = if args.types {
            match item.content_type() {
                Ok(ct) => (ct, None),
                Err(err) => (item.sniffed_type(), Some(err.to_string())),
            }
        } else {
            (item.sniffed_type(), None)
        };
        match mode {
            OutputMode::Human => {
                writeln!(stdout, "{}", format_item_line(&item, content_type, error.as_deref()))?;
            }
            OutputMode::Json => {
                let mut payload = json!({
                    "path": item.path(),
                    "type": content_type,
                    "len": item.len(),
                });
                if let Some(error) = error {
                    payload["error"] = JsonValue::String(error);
                }
                serde_json::to_writer(&mut stdout, &payload)?;
                writeln!(stdout)?;
            }
        }
    }
    stdout.flush()?;

    let stats = scan.finish()?;
    if mode == OutputMode::Human && cli.verbose {
        eprintln!(
            "{} visited {}, matched {}, skipped {}",
            "done".green(),
            stats.visited,
            stats.matched,
            stats.skipped
        );
    }
    Ok(())
}

fn format_item_line(item: &ContentItem, content_type: ContentType, error: Option<&str>) -> String {
    let label = format!("{:<8}", content_type.as_str());
    let label = match content_type {
        ContentType::Unknown => label.as_str().dimmed(),
        _ => label.as_str().cyan(),
    };
    let mut line = format!("{label} {:>10}  {}", format_bytes(item.len()), item.path());
    if let Some(error) = error {
        line.push_str(&format!("  {}", error.red()));
    }
    line
}

fn run_jq(args: &JqArgs, options: ScanOptions) -> Result<(), CliError> {
    let mut results = session(&args.input, options).jq(&args.query)?;
    let mut stdout = io::stdout().lock();

    for value in results.by_ref() {
        if args.pretty {
            serde_json::to_writer_pretty(&mut stdout, &value)?;
        } else {
            serde_json::to_writer(&mut stdout, &value)?;
        }
        writeln!(stdout)?;
    }
    stdout.flush()?;

    results.finish()?;
    Ok(())
}

fn run_extract(cli: &Cli, args: &ExtractArgs, options: ScanOptions) -> Result<(), CliError> {
    let summary = session(&args.input, options).extract(&args.output, args.force)?;
    let mut stdout = io::stdout().lock();
    match output_mode(cli) {
        OutputMode::Human => writeln!(stdout, "{}", format_extract_summary(&summary, &args.output))?,
        OutputMode::Json => {
            let payload = json!({
                "output": args.output.display().to_string(),
                "written": summary.written,
                "bytes": summary.bytes,
                "skipped": summary.stats.skipped,
            });
            serde_json::to_writer(&mut stdout, &payload)?;
            writeln!(stdout)?;
        }
    }
    stdout.flush()?;
    Ok(())
}

fn format_extract_summary(summary: &ExtractSummary, output: &std::path::Path) -> String {
    let mut line = format!(
        "{} {} items ({}) to {}",
        "wrote".green(),
        summary.written,
        format_bytes(summary.bytes),
        output.display()
    );
    if summary.stats.skipped > 0 {
        let skipped = format!("{} skipped", summary.stats.skipped);
        line.push_str(&format!(", {}", skipped.as_str().yellow()));
    }
    line
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("ARTISCAN_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
