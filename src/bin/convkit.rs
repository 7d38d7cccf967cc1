//! CLI binary for convkit.
//!
//! A thin shim over the library crate: maps subcommand flags to option
//! structs, runs one conversion, prints diagnostics on stdout and exits
//! 0 on success or 1 on any failure.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use convkit::{
    convert, AttemptObserver, AttemptStatus, ConversionReport, ConversionRequest, ConvertContext,
    DateFormat, ImageOptions, MarkdownOptions, Observer, Orient, Outcome,
    PngCompression, ProcessLimits, RasterOptions, StrategyError, TabularOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a spinner naming the strategy being tried, plus one
/// stdout line per failed strategy.
struct CliObserver {
    bar: ProgressBar,
    verbose: bool,
}

impl CliObserver {
    fn new(verbose: bool) -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.set_message("checking input…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar, verbose })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl AttemptObserver for CliObserver {
    fn on_strategy_start(&self, strategy: &str, index: usize, total: usize) {
        self.bar
            .set_message(format!("{strategy} ({}/{total})", index + 1));
        if self.verbose {
            self.bar.suspend(|| {
                println!("{} Trying {}", cyan("◆"), bold(strategy));
            });
        }
    }

    fn on_strategy_failed(&self, strategy: &str, error: &StrategyError) {
        let line = error.to_string();
        let msg = match line.char_indices().nth(200) {
            Some((cut, _)) => format!("{}\u{2026}", &line[..cut]),
            None => line,
        };
        self.bar.suspend(|| {
            println!("  {} {}  {}", red("✗"), strategy, dim(&msg));
        });
    }

    fn on_success(&self, _report: &ConversionReport) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Re-encode a PNG as JPEG, downscaled to 2048 px on the long edge
  convkit image --quality 80 --max-dimension 2048 photo.png photo.jpg

  # Lossless WebP (image-rs first, cwebp as fallback)
  convkit image --lossless shot.png shot.webp

  # Third page of a PDF at 200 DPI
  convkit pdf-to-image --page 3 --dpi 200 report.pdf page3.png

  # Word document to PDF (LibreOffice, then Pandoc)
  convkit document letter.docx letter.pdf

  # CSV to pretty JSON with ISO dates
  convkit csv-to-json --indent 2 --date-format iso sales.csv sales.json

  # Markdown to a self-contained HTML page
  convkit markdown --embed-images README.md README.html

EXIT STATUS:
  0  the output was written and verified
  1  any failure: bad arguments, missing or empty input, every strategy failed

EXTERNAL TOOLS (optional, used as strategies when present):
  cwebp          lossy WebP encoding
  gs             PDF rendering when pdfium cannot be loaded
  soffice        office document conversion
  pandoc         document and Markdown fallback

ENVIRONMENT VARIABLES:
  CONVKIT_*          every flag has a CONVKIT_<FLAG> override
  PDFIUM_LIB_PATH    path to libpdfium, or a directory containing it
  RUST_LOG           tracing filter for library logs on stderr
"#;

/// Convert files between formats with verified, fallback-aware backends.
#[derive(Parser, Debug)]
#[command(
    name = "convkit",
    version,
    about = "Convert images, PDFs, office documents, tables and Markdown between formats",
    long_about = "Convert one input file into one output file. Each converter tries its \
backends in a fixed order, verifies the output by re-reading it, and only then moves it \
into place. The output format is taken from the output file extension.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Time limit for each external process, in seconds.
    #[arg(long, global = true, env = "CONVKIT_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Enable DEBUG-level tracing logs and per-strategy progress lines.
    #[arg(short, long, global = true, env = "CONVKIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CONVKIT_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a raster image to another image format, EPS or PDF.
    Image(ImageArgs),
    /// Render one PDF page to PNG, JPEG or WebP.
    PdfToImage(PdfToImageArgs),
    /// Convert an office document (LibreOffice, then Pandoc).
    Document(Paths),
    /// Convert delimited text to JSON.
    CsvToJson(CsvToJsonArgs),
    /// Convert a JSON table to delimited text.
    JsonToCsv(JsonToCsvArgs),
    /// Render Markdown to a standalone HTML page.
    Markdown(MarkdownArgs),
}

#[derive(Args, Debug)]
struct Paths {
    /// Input file.
    input: PathBuf,
    /// Output file; its extension selects the target format.
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ImageArgs {
    #[command(flatten)]
    paths: Paths,

    /// Encoder quality (clamped to 1–100).
    #[arg(long, env = "CONVKIT_QUALITY", default_value_t = 85, allow_negative_numbers = true)]
    quality: i64,

    /// Prefer lossless encoding where the format supports it.
    #[arg(long, env = "CONVKIT_LOSSLESS")]
    lossless: bool,

    /// Downscale so the long edge is at most this many pixels (0 disables).
    #[arg(long, env = "CONVKIT_MAX_DIMENSION", default_value_t = 4096)]
    max_dimension: u32,

    /// Spend extra effort shrinking the output (default).
    #[arg(long, env = "CONVKIT_OPTIMIZE", overrides_with = "no_optimize")]
    optimize: bool,

    /// Skip the PNG filter search and alpha stripping.
    #[arg(long, env = "CONVKIT_NO_OPTIMIZE", overrides_with = "optimize")]
    no_optimize: bool,

    /// PNG compression: fast, default, best or 0–9.
    #[arg(long, env = "CONVKIT_COMPRESSION")]
    compression: Option<String>,
}

#[derive(Args, Debug)]
struct PdfToImageArgs {
    #[command(flatten)]
    paths: Paths,

    /// 1-based page number.
    #[arg(long, env = "CONVKIT_PAGE", default_value_t = 1)]
    page: usize,

    /// Render density (clamped to 72–600).
    #[arg(long, env = "CONVKIT_DPI", default_value_t = 150)]
    dpi: u32,

    /// Encoder quality for JPEG output (clamped to 1–100).
    #[arg(long, env = "CONVKIT_QUALITY", default_value_t = 85, allow_negative_numbers = true)]
    quality: i64,

    /// Long-edge limit in pixels (0 disables).
    #[arg(long, env = "CONVKIT_MAX_DIMENSION", default_value_t = 4096)]
    max_dimension: u32,
}

#[derive(Args, Debug)]
struct CsvToJsonArgs {
    #[command(flatten)]
    paths: Paths,

    /// JSON layout.
    #[arg(long, env = "CONVKIT_ORIENT", value_enum, default_value = "records")]
    orient: OrientArg,

    /// Spaces per indent level (0 or absent: compact).
    #[arg(long, env = "CONVKIT_INDENT")]
    indent: Option<usize>,

    /// Reformat detected date columns.
    #[arg(long, env = "CONVKIT_DATE_FORMAT", value_enum)]
    date_format: Option<DateFormatArg>,

    /// Field delimiter (`\t` or `tab` for tabs).
    #[arg(long, env = "CONVKIT_DELIMITER", default_value = ",")]
    delimiter: String,
}

#[derive(Args, Debug)]
struct JsonToCsvArgs {
    #[command(flatten)]
    paths: Paths,

    /// Write a header row.
    #[arg(
        long,
        env = "CONVKIT_INCLUDE_HEADERS",
        action = ArgAction::Set,
        default_value_t = true,
        value_name = "true|false"
    )]
    include_headers: bool,

    /// Field delimiter (`\t` or `tab` for tabs).
    #[arg(long, env = "CONVKIT_DELIMITER", default_value = ",")]
    delimiter: String,
}

#[derive(Args, Debug)]
struct MarkdownArgs {
    #[command(flatten)]
    paths: Paths,

    /// Document title (default: first heading, then the file name).
    #[arg(long, env = "CONVKIT_TITLE")]
    title: Option<String>,

    /// Inline local images as base64 data URIs.
    #[arg(long, env = "CONVKIT_EMBED_IMAGES")]
    embed_images: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OrientArg {
    Records,
    Columns,
    Index,
    Split,
    Values,
}

impl From<OrientArg> for Orient {
    fn from(v: OrientArg) -> Self {
        match v {
            OrientArg::Records => Orient::Records,
            OrientArg::Columns => Orient::Columns,
            OrientArg::Index => Orient::Index,
            OrientArg::Split => Orient::Split,
            OrientArg::Values => Orient::Values,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DateFormatArg {
    Iso,
    Epoch,
}

impl From<DateFormatArg> for DateFormat {
    fn from(v: DateFormatArg) -> Self {
        match v {
            DateFormatArg::Iso => DateFormat::Iso,
            DateFormatArg::Epoch => DateFormat::Epoch,
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version are the only "errors" clap prints to stdout.
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let outcome = match run(&cli) {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("{} {:#}", red("✘"), e);
            return ExitCode::FAILURE;
        }
    };

    match &outcome {
        Outcome::Success(report) => {
            if !cli.quiet {
                print_report(report, cli.verbose);
            }
            ExitCode::SUCCESS
        }
        failure => {
            println!("{} {}", red("✘"), failure.diagnostic());
            ExitCode::FAILURE
        }
    }
}

/// Build the request, run it on a current-thread runtime and fold the
/// result into an [`Outcome`].
fn run(cli: &Cli) -> Result<Outcome> {
    let (paths, request) = build_request(&cli.command)?;

    let mut ctx = ConvertContext::new(ProcessLimits::new(cli.timeout));
    let observer = (!cli.quiet).then(|| CliObserver::new(cli.verbose));
    if let Some(ref obs) = observer {
        ctx = ctx.with_observer(obs.clone() as Observer);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let result = runtime.block_on(convert(&paths.input, &paths.output, &request, &ctx));

    if let Some(obs) = observer {
        obs.finish();
    }
    Ok(Outcome::from(result))
}

/// Map subcommand args to a [`ConversionRequest`].
fn build_request(command: &Command) -> Result<(&Paths, ConversionRequest)> {
    let built = match command {
        Command::Image(a) => {
            let mut builder = ImageOptions::builder()
                .quality(a.quality)
                .lossless(a.lossless)
                .max_dimension(a.max_dimension)
                .optimize(a.optimize || !a.no_optimize);
            if let Some(ref name) = a.compression {
                builder = builder.compression(PngCompression::parse_lenient(name));
            }
            let options = builder.build().context("Invalid image options")?;
            (&a.paths, ConversionRequest::Image(options))
        }
        Command::PdfToImage(a) => {
            let image = ImageOptions::builder()
                .quality(a.quality)
                .max_dimension(a.max_dimension)
                .build()
                .context("Invalid image options")?;
            let options = RasterOptions::new(a.page, a.dpi, image)?;
            (&a.paths, ConversionRequest::PdfToImage(options))
        }
        Command::Document(paths) => (paths, ConversionRequest::Document),
        Command::CsvToJson(a) => {
            let options = TabularOptions {
                orient: a.orient.into(),
                indent: a.indent,
                date_format: a.date_format.map(DateFormat::from),
                delimiter: TabularOptions::parse_delimiter(&a.delimiter)?,
                ..TabularOptions::default()
            };
            (&a.paths, ConversionRequest::CsvToJson(options))
        }
        Command::JsonToCsv(a) => {
            let options = TabularOptions {
                delimiter: TabularOptions::parse_delimiter(&a.delimiter)?,
                include_headers: a.include_headers,
                ..TabularOptions::default()
            };
            (&a.paths, ConversionRequest::JsonToCsv(options))
        }
        Command::Markdown(a) => {
            let options = MarkdownOptions {
                title: a.title.clone(),
                embed_images: a.embed_images,
            };
            (&a.paths, ConversionRequest::Markdown(options))
        }
    };
    Ok(built)
}

/// Summary lines for a successful conversion.
fn print_report(report: &ConversionReport, verbose: bool) {
    println!(
        "{}  {}  →  {}  via {}",
        green("✔"),
        report.source.display(),
        bold(&report.destination.display().to_string()),
        cyan(&report.strategy),
    );
    println!(
        "   {} → {} bytes ({:.1}%)  {}ms",
        dim(&report.original_size.to_string()),
        dim(&report.produced_size.to_string()),
        report.size_ratio_percent(),
        report.duration_ms,
    );

    let fallbacks = report
        .trail
        .iter()
        .filter(|r| matches!(r.status, AttemptStatus::SoftFailure(_)))
        .count();
    if verbose || fallbacks > 0 {
        for record in &report.trail {
            println!("   {}", dim(&record.describe()));
        }
    }
}
