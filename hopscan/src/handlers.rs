use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use hopscan_core::{AuditOptions, AuditSummary, Variant, execute_audit};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Log to stderr, filtered by RUST_LOG (default: warn). Stdout carries only
/// report records.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed (tests); keep the existing one
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Open the CSV input, falling back to stdin
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input file {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

/// Create the report output, falling back to stdout
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

/// Audit the hostnames in `input` (or stdin) and write the report to
/// `output` (or stdout).
pub async fn audit_files(
    input: Option<&Path>,
    output: Option<&Path>,
    options: AuditOptions,
) -> Result<AuditSummary> {
    let reader = open_input(input)?;
    let writer = open_output(output)?;

    let summary = execute_audit(options, reader, writer)
        .await
        .context("Audit aborted")?;
    Ok(summary)
}

fn audit_options(args: &ArgMatches, quiet: bool) -> Result<AuditOptions> {
    let variant_name = args
        .get_one::<String>("variant")
        .map(String::as_str)
        .unwrap_or("full");
    let variant = Variant::from_str(variant_name)
        .with_context(|| format!("Unknown variant '{}'", variant_name))?;
    let timeout = *args.get_one::<u64>("timeout").unwrap_or(&1);
    let threads = *args.get_one::<usize>("threads").unwrap_or(&1);

    Ok(AuditOptions {
        timeout: Duration::from_secs(timeout),
        variant,
        threads,
        show_progress: !quiet,
    })
}

pub async fn handle_audit(args: &ArgMatches, quiet: bool) -> Result<()> {
    init_tracing();

    let input = args.get_one::<String>("input").map(|p| expand_path(p));
    let output = args.get_one::<String>("output").map(|p| expand_path(p));
    let options = audit_options(args, quiet)?;
    debug!(
        "input={:?} output={:?} variant={:?} timeout={:?} threads={}",
        input, output, options.variant, options.timeout, options.threads
    );

    if !quiet {
        eprintln!(
            "{} Auditing hostnames from {} ({:?} variant, timeout {}s, {} concurrent)",
            "→".blue(),
            input
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "stdin".to_string())
                .bright_white(),
            options.variant,
            options.timeout.as_secs(),
            options.threads.max(1)
        );
    }

    let summary = audit_files(input.as_deref(), output.as_deref(), options).await?;

    if !quiet {
        eprintln!(
            "{} Audit complete! {} host(s), {} unreachable",
            "✓".green().bold(),
            summary.hosts,
            summary.unreachable
        );
    }
    Ok(())
}
