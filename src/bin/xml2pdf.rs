//! CLI binary for xml2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, converts one submission and writes the signed PDF.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use xml2pdf::cli::{init_tracing, PipelineArgs};
use xml2pdf::convert::default_output_path;
use xml2pdf::{convert, convert_to_file, PipelineProgressCallback, ProgressCallback, Stage};

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One spinner line that follows the current stage and prints a tick per
/// finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, source: &str) {
        self.bar.set_prefix("Converting");
        self.bar.set_message(source.to_string());
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<12} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        self.bar.println(format!("  {} {:<12} {}", red("✗"), stage.to_string(), red(error)));
        self.bar.finish_and_clear();
    }

    fn on_conversion_complete(&self, pages: usize, bytes: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages, {} bytes signed",
            green("✔"),
            bold(&pages.to_string()),
            bytes
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Test mode (sandbox certificate), PDF next to the input
  xml2pdf request.xml

  # Explicit output, storage root with archive and error record
  xml2pdf request.xml -o signed.pdf --storage-dir /mnt

  # Production signing through csptest
  TEST_MODE=false SIGNER_NAME="Иванов И.И." SIGNER_PASSWORD=... xml2pdf request.xml

  # Write the PDF to stdout
  xml2pdf https://example.com/request.xml --stdout > signed.pdf

ENVIRONMENT VARIABLES:
  TEST_MODE          true (default) uses the sandbox signer and name "ТЕСТ"
  SIGNER_NAME        Stamp name and csptest certificate store
  SIGNER_PASSWORD    Key passphrase (sent to csptest on stdin)
  STORAGE_DIR        input_data/, output_data/, file_errors.json, app.log
  RUST_LOG           Log filter, e.g. xml2pdf=debug
"#;

/// Convert XML submissions into stamped, signed PDF documents.
#[derive(Parser, Debug)]
#[command(
    name = "xml2pdf",
    version,
    about = "Convert XML submissions into stamped, signed PDF documents",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local XML file path or HTTP/HTTPS URL.
    input: String,

    /// Write the PDF here. Default: input path with a .pdf extension.
    #[arg(short, long, env = "XML2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Write the PDF to stdout instead of a file.
    #[arg(long, conflicts_with = "output")]
    stdout: bool,

    /// Print conversion statistics as JSON on stdout.
    #[arg(long, conflicts_with = "stdout")]
    json: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Disable the progress spinner.
    #[arg(long, env = "XML2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "XML2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "XML2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.stdout && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    init_tracing(filter, cli.pipeline.log_path().as_deref());

    // ── Build config ─────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = cli
        .pipeline
        .to_config(progress)
        .context("Invalid configuration")?;

    // ── Run conversion ───────────────────────────────────────────────────
    if cli.stdout {
        let output = convert(&cli.input, &config)
            .await
            .context("Conversion failed")?;
        io::stdout()
            .lock()
            .write_all(&output.pdf)
            .context("Failed to write to stdout")?;
        return Ok(());
    }

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));
    let output = convert_to_file(&cli.input, &output_path, &config)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json =
            serde_json::to_string_pretty(&output.stats).context("Failed to serialise stats")?;
        println!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages  {}ms  →  {}",
            green("✔"),
            output.stats.page_count,
            output.stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        if let Some(ref id) = output.unique_id {
            eprintln!("   {}", dim(&format!("UniqueID {id}")));
        }
    }

    Ok(())
}
