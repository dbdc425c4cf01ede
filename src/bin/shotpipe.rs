//! CLI binary for shotpipe.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use shotpipe::{
    inspect_document, optimize_paths, run_batch, run_batch_to_report, BatchProgressCallback, BatchReport, JobManifest,
    JobOutcome, PipelineConfig, ProgressCallback,
};
use std::io;
use std::path::PathBuf;
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one ✓/✗ line per job.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us the job count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Checking office suite and pdfium…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} jobs  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Capturing");
        self.bar.reset_eta();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_jobs: usize) {
        self.activate_bar(total_jobs);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_jobs} jobs…"))
        ));
    }

    fn on_job_start(&self, _index: usize, _total: usize, label: &str) {
        self.bar.set_message(label.to_string());
    }

    fn on_job_complete(&self, index: usize, total: usize, outcome: &JobOutcome) {
        let detail = match outcome.optimized {
            Some(ref r) => {
                let size = format!("{:>4} KB q{}", r.bytes / 1024, r.quality);
                if r.within_budget {
                    dim(&size)
                } else {
                    yellow(&format!("{size} over budget"))
                }
            }
            None => dim("captured"),
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<32} {}  {}",
            green("✓"),
            index + 1,
            total,
            outcome.label,
            detail,
            dim(&format!("{:.1}s", outcome.duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_job_error(&self, index: usize, total: usize, label: &str, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<32} {}",
            red("✗"),
            index + 1,
            total,
            label,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total_jobs: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Capture every job in a manifest (PNG + size-bounded WebP)
  shotpipe capture screenshots.json

  # Larger budget, keep a max-compression PNG next to each WebP
  shotpipe capture --target-kb 300 --png-copy screenshots.json

  # Captures only, no WebP
  shotpipe capture --no-optimize screenshots.json

  # Fail the run (non-zero exit) if any job failed, JSON report on stdout
  shotpipe capture --strict --json screenshots.json > report.json

  # Re-optimise an existing screenshot directory into the site
  shotpipe optimize shots/ -o public/images/projects/audit-tools

  # Which sheets / slides can a manifest refer to?
  shotpipe inspect "Financial Model.xlsx"

MANIFEST:
  {
    "document_dir": "../Audit_Tools",
    "output_dir":   "public/images/projects/audit-tools",
    "jobs": [
      { "label": "Risk Matrix", "document": "Risk.xlsx",
        "view": { "sheet": "Risk Assessment" }, "output": "risk.png" },
      { "document": "Deck.pptx", "view": { "slide": 1 }, "output": "deck.png" },
      { "document": "Report.pdf", "view": { "page": 3 }, "output": "report.png" }
    ]
  }

ENVIRONMENT VARIABLES:
  SOFFICE_PATH            Path to the LibreOffice soffice binary
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  SHOTPIPE_*              Every flag, e.g. SHOTPIPE_TARGET_KB=150
  RUST_LOG                Override the log filter
"#;

/// Capture office-document views and optimise them into web-ready WebP.
#[derive(Parser, Debug)]
#[command(
    name = "shotpipe",
    version,
    about = "Capture office-document views and optimise them into size-bounded WebP",
    long_about = "Export spreadsheet sheets, presentation slides and PDF pages headlessly \
through LibreOffice and pdfium, then encode each capture as WebP at decreasing quality \
until it fits the size budget (default: 1920 px wide, 200 KB).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    shared: SharedArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every job in a JSON manifest.
    Capture {
        /// Job manifest.
        manifest: PathBuf,

        /// Also write the JSON report to this file.
        #[arg(long, env = "SHOTPIPE_REPORT")]
        report: Option<PathBuf>,
    },

    /// Optimise existing images (directories contribute their *.png).
    Optimize {
        /// Image files or directories.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Write WebP files here instead of next to each source.
        #[arg(short, long, env = "SHOTPIPE_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
    },

    /// List the sheets, slides or pages of a document.
    Inspect {
        document: PathBuf,
    },
}

#[derive(Args, Debug)]
struct SharedArgs {
    /// Maximum output width in pixels.
    #[arg(long, global = true, env = "SHOTPIPE_MAX_WIDTH", default_value_t = 1920)]
    max_width: u32,

    /// Output size ceiling in KB (1 KB = 1024 bytes).
    #[arg(long, global = true, env = "SHOTPIPE_TARGET_KB", default_value_t = 200)]
    target_kb: u64,

    /// Starting WebP quality.
    #[arg(long, global = true, env = "SHOTPIPE_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Lowest WebP quality the size loop may reach.
    #[arg(long, global = true, env = "SHOTPIPE_MIN_QUALITY", default_value_t = 55,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    min_quality: u8,

    /// Quality decrement per attempt.
    #[arg(long, global = true, env = "SHOTPIPE_QUALITY_STEP", default_value_t = 5,
          value_parser = clap::value_parser!(u8).range(1..=50))]
    quality_step: u8,

    /// Width pdfium renders exported pages at.
    #[arg(long, global = true, env = "SHOTPIPE_RENDER_WIDTH", default_value_t = 2560)]
    render_width: u32,

    /// Seconds to wait for one office export.
    #[arg(long, global = true, env = "SHOTPIPE_EXPORT_TIMEOUT", default_value_t = 120)]
    export_timeout: u64,

    /// Also write a max-compression PNG next to each WebP.
    #[arg(long, global = true, env = "SHOTPIPE_PNG_COPY")]
    png_copy: bool,

    /// Capture only; skip the WebP stage.
    #[arg(long, global = true, env = "SHOTPIPE_NO_OPTIMIZE")]
    no_optimize: bool,

    /// Explicit LibreOffice soffice binary.
    #[arg(long, global = true, env = "SHOTPIPE_SOFFICE")]
    soffice: Option<PathBuf>,

    /// Print the JSON report instead of a summary.
    #[arg(long, global = true, env = "SHOTPIPE_JSON")]
    json: bool,

    /// Exit non-zero if any job failed.
    #[arg(long, global = true, env = "SHOTPIPE_STRICT")]
    strict: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "SHOTPIPE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "SHOTPIPE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "SHOTPIPE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let args = &cli.shared;

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let batch_command = !matches!(cli.command, Command::Inspect { .. });
    let show_progress = batch_command && !args.quiet && !args.no_progress && !args.json;
    let filter = if args.verbose {
        "debug"
    } else if args.quiet || show_progress {
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, progress_cb)?;

    match cli.command {
        Command::Inspect { ref document } => {
            let info = inspect_document(document, &config)
                .await
                .with_context(|| format!("Failed to inspect {}", document.display()))?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&info).context("Failed to serialise document info")?
                );
            } else {
                println!("File:    {}", info.path.display());
                println!("Format:  {:?} ({:?})", info.format, info.kind);
                if !info.sheets.is_empty() {
                    println!("Sheets:");
                    for (i, name) in info.sheets.iter().enumerate() {
                        println!("  {:>3}  {}", i + 1, name);
                    }
                }
                if let Some(n) = info.slides {
                    if info.hidden_slides.is_empty() {
                        println!("Slides:  {n}");
                    } else {
                        let hidden: Vec<String> = info.hidden_slides.iter().map(|s| s.to_string()).collect();
                        println!("Slides:  {n} (hidden: {})", hidden.join(", "));
                    }
                }
                if let Some(n) = info.pages {
                    println!("Pages:   {n}");
                }
            }
            Ok(())
        }

        Command::Capture {
            ref manifest,
            ref report,
        } => {
            let jobs = JobManifest::load(manifest)
                .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;
            let batch = match report {
                Some(path) => run_batch_to_report(&jobs, path, &config).await,
                None => run_batch(&jobs, &config).await,
            }
            .context("Capture failed")?;
            finish(&batch, args)
        }

        Command::Optimize {
            ref inputs,
            ref output_dir,
        } => {
            let batch = optimize_paths(inputs, output_dir.as_deref(), &config)
                .await
                .context("Optimize failed")?;
            finish(&batch, args)
        }
    }
}

/// Print the report or summary, then apply `--strict`.
fn finish(report: &BatchReport, args: &SharedArgs) -> Result<()> {
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialise report")?
        );
    } else if !args.quiet {
        print_summary(report);
    }

    if args.strict {
        report.clone().into_result().context("Strict mode")?;
    }
    Ok(())
}

fn print_summary(report: &BatchReport) {
    let stats = &report.stats;
    let mark = if stats.failed == 0 {
        green("✔")
    } else if stats.succeeded == 0 {
        red("✘")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{} {}/{} jobs succeeded  {}",
        mark,
        bold(&stats.succeeded.to_string()),
        stats.total,
        dim(&format!("{}ms", stats.total_duration_ms)),
    );

    let saved: u64 = report
        .jobs
        .iter()
        .filter_map(|j| j.optimized.as_ref())
        .filter_map(|r| r.source_bytes.map(|src| src.saturating_sub(r.bytes)))
        .sum();
    if saved > 0 {
        eprintln!("   {} saved against the PNG sources", dim(&format!("{} KB", saved / 1024)));
    }
    if stats.over_budget > 0 {
        eprintln!(
            "   {}",
            yellow(&format!("{} outputs still exceed the size target at the quality floor", stats.over_budget))
        );
    }
    for (kind, count) in &stats.failures_by_kind {
        eprintln!("   {} {}", red(&format!("{count:>3}")), kind);
    }
    for failed in report.failures() {
        if let Some(ref e) = failed.error {
            eprintln!("   {} {}: {}", red("✗"), failed.label, dim(&e.to_string()));
        }
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(args: &SharedArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_width(args.max_width)
        .target_kb(args.target_kb)
        .initial_quality(args.quality)
        .min_quality(args.min_quality)
        .quality_step(args.quality_step)
        .render_width(args.render_width)
        .export_timeout_secs(args.export_timeout)
        .png_copy(args.png_copy)
        .optimize(!args.no_optimize);

    if let Some(ref soffice) = args.soffice {
        builder = builder.soffice_path(soffice);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
