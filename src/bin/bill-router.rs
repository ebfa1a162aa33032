//! CLI binary for bill-router.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs the batch and prints results.

use anyhow::{Context, Result};
use bill_router::{
    compose_to_file, inspect, process_batch, refilter_batch, split_to_dir, BatchOutput,
    BatchProgressCallback, BatchStats, OverlayColor, PipelineConfig, ProgressCallback,
    SheetLayout, StampCorner,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar over pages plus one log line per
/// skipped page and per written document. Pages may complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            skipped: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading {total_pages} bill pages…"))
        ));
    }

    fn on_page_extracted(&self, _page_num: usize, _total_pages: usize) {
        self.bar.inc(1);
    }

    fn on_page_skipped(&self, page_num: usize, total_pages: usize, reason: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        let msg = if reason.chars().count() > 80 {
            format!("{}\u{2026}", reason.chars().take(79).collect::<String>())
        } else {
            reason.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>4}/{:<4}  {}",
            red("✗"),
            page_num,
            total_pages,
            dim(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_document_written(&self, label: &str, page_count: usize) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            bold(label),
            dim(&format!("{page_count} pages"))
        ));
    }

    fn on_batch_complete(&self, stats: &BatchStats) {
        self.bar.finish_and_clear();
        let skipped = self.skipped.load(Ordering::SeqCst);
        eprintln!(
            "{} {} bills from {} pages  ({} skipped, {} stops)",
            if skipped == 0 { green("✔") } else { cyan("⚠") },
            bold(&stats.extracted_records.to_string()),
            stats.source_pages,
            skipped,
            stats.distinct_locations,
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract, repair serials and route; print the batch as JSON
  bill-router extract ward-12.pdf > ward-12.json

  # Only one colony, map markers only
  bill-router extract ward-12.pdf --colony "ram nagar" --map-points

  # Reordered, stamped PDF, three bills per A4 sheet
  bill-router arrange ward-12.pdf -o ward-12.route.pdf --layout three

  # Re-use a saved batch instead of extracting again
  bill-router arrange ward-12.pdf --records ward-12.json -o ward-12.route.pdf

  # One PDF per field worker
  bill-router split ward-12.pdf --employees 4 --out-dir bundles/

  # Page count only
  bill-router inspect ward-12.pdf

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  BILL_ROUTER_*           Every flag can be set from the environment
  RUST_LOG                Overrides the log filter
"#;

/// Route printed bills: extract, repair serials, order and stamp.
#[derive(Parser, Debug)]
#[command(
    name = "bill-router",
    version,
    about = "Extract bill records from a PDF and order them into a walking route",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "BILL_ROUTER_PASSWORD")]
    password: Option<String>,

    /// Number of pages extracted concurrently.
    #[arg(short, long, global = true, env = "BILL_ROUTER_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Abort the run after this many seconds.
    #[arg(long, global = true, env = "BILL_ROUTER_TIMEOUT")]
    timeout: Option<u64>,

    /// Disable progress bar.
    #[arg(long, global = true, env = "BILL_ROUTER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BILL_ROUTER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BILL_ROUTER_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, resolve and route; print the batch as JSON.
    Extract {
        /// Source PDF.
        input: PathBuf,

        #[command(flatten)]
        batch: BatchArgs,

        /// Write JSON here instead of stdout.
        #[arg(short, long, env = "BILL_ROUTER_OUTPUT")]
        output: Option<PathBuf>,

        /// Emit only geo-located records as map markers.
        #[arg(long)]
        map_points: bool,
    },

    /// Write a reordered, stamped copy of the source.
    Arrange {
        /// Source PDF.
        input: PathBuf,

        /// Output PDF.
        #[arg(short, long, env = "BILL_ROUTER_OUTPUT")]
        output: PathBuf,

        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        stamp: StampArgs,

        /// Bills per output sheet.
        #[arg(long, env = "BILL_ROUTER_LAYOUT", value_enum, default_value = "single")]
        layout: LayoutArg,
    },

    /// Split the route evenly across field workers, one PDF each.
    Split {
        /// Source PDF.
        input: PathBuf,

        /// Directory for the per-worker PDFs.
        #[arg(long, env = "BILL_ROUTER_OUT_DIR")]
        out_dir: PathBuf,

        /// Number of workers (1–100).
        #[arg(short, long, env = "BILL_ROUTER_EMPLOYEES", default_value_t = 1,
              value_parser = clap::value_parser!(u32).range(1..=100))]
        employees: u32,

        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        stamp: StampArgs,
    },

    /// Print the page count.
    Inspect {
        /// Source PDF.
        input: PathBuf,
    },
}

impl Command {
    /// True when the command runs extraction (not inspect, not a saved batch).
    fn extracts(&self) -> bool {
        match self {
            Command::Extract { batch, .. }
            | Command::Arrange { batch, .. }
            | Command::Split { batch, .. } => batch.records.is_none(),
            Command::Inspect { .. } => false,
        }
    }
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Keep only records whose colony contains this text (case-insensitive).
    #[arg(long, env = "BILL_ROUTER_COLONY")]
    colony: Option<String>,

    /// Batch name; defaults to the file stem.
    #[arg(long, env = "BILL_ROUTER_BATCH_NAME")]
    name: Option<String>,

    /// Use records from a saved `extract` run instead of extracting again.
    #[arg(long, env = "BILL_ROUTER_RECORDS")]
    records: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StampArgs {
    /// Serial font size in points (8–200).
    #[arg(long, env = "BILL_ROUTER_FONT_SIZE", default_value_t = 48,
          value_parser = clap::value_parser!(u32).range(8..=200))]
    font_size: u32,

    /// Serial colour.
    #[arg(long, env = "BILL_ROUTER_COLOR", value_enum, default_value = "red")]
    color: ColorArg,

    /// Corner used when the page has no serial label to anchor to.
    #[arg(long, env = "BILL_ROUTER_CORNER", value_enum, default_value = "top-right")]
    corner: CornerArg,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ColorArg {
    Red,
    Blue,
    Green,
    Black,
    Orange,
}

impl From<ColorArg> for OverlayColor {
    fn from(v: ColorArg) -> Self {
        match v {
            ColorArg::Red => OverlayColor::Red,
            ColorArg::Blue => OverlayColor::Blue,
            ColorArg::Green => OverlayColor::Green,
            ColorArg::Black => OverlayColor::Black,
            ColorArg::Orange => OverlayColor::Orange,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CornerArg {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl From<CornerArg> for StampCorner {
    fn from(v: CornerArg) -> Self {
        match v {
            CornerArg::TopLeft => StampCorner::TopLeft,
            CornerArg::TopRight => StampCorner::TopRight,
            CornerArg::BottomLeft => StampCorner::BottomLeft,
            CornerArg::BottomRight => StampCorner::BottomRight,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    Single,
    Two,
    Three,
}

impl From<LayoutArg> for SheetLayout {
    fn from(v: LayoutArg) -> Self {
        match v {
            LayoutArg::Single => SheetLayout::Single,
            LayoutArg::Two => SheetLayout::Two,
            LayoutArg::Three => SheetLayout::Three,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && cli.command.extracts();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    with_timeout(cli.timeout, run(&cli, progress_cb)).await
}

async fn with_timeout(secs: Option<u64>, fut: impl Future<Output = Result<()>>) -> Result<()> {
    match secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .with_context(|| format!("Timed out after {secs}s"))?,
        None => fut.await,
    }
}

async fn run(cli: &Cli, progress: Option<ProgressCallback>) -> Result<()> {
    match &cli.command {
        Command::Inspect { input } => {
            let pages = inspect(input, cli.password.as_deref())
                .await
                .context("Failed to inspect PDF")?;
            println!("File:   {}", input.display());
            println!("Pages:  {}", pages);
        }

        Command::Extract {
            input,
            batch,
            output,
            map_points,
        } => {
            let config = build_config(cli, batch, None, progress)?;
            let out = load_batch(input, batch, &config).await?;
            let json = if *map_points {
                serde_json::to_string_pretty(&out.map_points())
            } else {
                serde_json::to_string_pretty(&out)
            }
            .context("Failed to serialise output")?;
            match output {
                Some(path) => {
                    tokio::fs::write(path, json)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    if !cli.quiet {
                        eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
                    }
                }
                None => println!("{json}"),
            }
            if !cli.quiet && (cli.no_progress || batch.records.is_some()) {
                print_summary(&out.stats);
            }
        }

        Command::Arrange {
            input,
            output,
            batch,
            stamp,
            layout,
        } => {
            let config = build_config(cli, batch, Some((stamp, (*layout).into(), 1)), progress)?;
            let out = load_batch(input, batch, &config).await?;
            let document = compose_to_file(input, &out.records, output, &config)
                .await
                .context("Failed to compose output PDF")?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} bills on {} pages  →  {}",
                    if document.skipped.is_empty() { green("✔") } else { cyan("⚠") },
                    document.record_count,
                    document.page_count,
                    bold(&output.display().to_string()),
                );
                for skip in &document.skipped {
                    eprintln!("   {}", dim(&skip.to_string()));
                }
            }
        }

        Command::Split {
            input,
            out_dir,
            employees,
            batch,
            stamp,
        } => {
            let config = build_config(
                cli,
                batch,
                Some((stamp, SheetLayout::Single, *employees as usize)),
                progress,
            )?;
            let out = load_batch(input, batch, &config).await?;
            let split = split_to_dir(input, &out.records, out_dir, &config)
                .await
                .context("Failed to write employee bundles")?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} bills  →  {} bundles of up to {}",
                    green("✔"),
                    split.total_records,
                    split.bundles.len(),
                    split.records_per_employee,
                );
                for bundle in &split.bundles {
                    eprintln!(
                        "   #{:<3} {:>5}–{:<5} serials {}",
                        bundle.employee_number,
                        bundle.start_position,
                        bundle.end_position,
                        bundle.serial_range(),
                    );
                }
                if split.out_of_range_pages > 0 {
                    eprintln!(
                        "   {} {} records pointed past the end of the source",
                        red("✗"),
                        split.out_of_range_pages
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_summary(stats: &BatchStats) {
    eprintln!(
        "{} bills from {} pages in {}ms",
        stats.extracted_records, stats.source_pages, stats.total_duration_ms
    );
    eprintln!(
        "  serials: {} printed, {} nearest, {} fallback",
        stats.printed_serials, stats.resolved_via_nearest, stats.resolved_via_fallback
    );
    eprintln!(
        "  route:   {} routed over {} stops, {} without coordinates",
        stats.routed, stats.distinct_locations, stats.unrouted
    );
}

/// Run the batch, or load one saved by a previous `extract` and apply
/// `--colony` to it.
async fn load_batch(input: &Path, batch: &BatchArgs, config: &PipelineConfig) -> Result<BatchOutput> {
    match &batch.records {
        Some(path) => {
            let raw = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read records from {}", path.display()))?;
            let saved: BatchOutput = serde_json::from_slice(&raw)
                .with_context(|| format!("{} is not a saved batch", path.display()))?;
            Ok(refilter_batch(saved, config.colony.as_deref()))
        }
        None => process_batch(input, config)
            .await
            .context("Batch processing failed"),
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(
    cli: &Cli,
    batch: &BatchArgs,
    compose: Option<(&StampArgs, SheetLayout, usize)>,
    progress: Option<ProgressCallback>,
) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder().concurrency(cli.concurrency);
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref colony) = batch.colony {
        builder = builder.colony(colony.clone());
    }
    if let Some(ref name) = batch.name {
        builder = builder.batch_name(name.clone());
    }
    if let Some((stamp, layout, employees)) = compose {
        builder = builder
            .font_size(stamp.font_size)
            .color(stamp.color.into())
            .corner(stamp.corner.into())
            .sheet_layout(layout)
            .employee_count(employees);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}
