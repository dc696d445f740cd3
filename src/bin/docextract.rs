//! CLI binary for edgequake-docextract.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docextract::pipeline::input::load_input;
use edgequake_docextract::pipeline::split::split_pages;
use edgequake_docextract::{
    write_results, DocumentType, ExtractionConfig, ExtractionProgressCallback, Extractor,
    InstructionRegistry, PdfiumRasterizer, ProgressCallback, QualityScorer,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar plus a log line per page. Pages arrive in
/// order, so a single start timestamp is enough.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Loading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting fields from {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page: usize, _total_pages: usize) {
        if let Ok(mut t) = self.page_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: usize, total_pages: usize, field_count: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page,
            total_pages,
            dim(&format!("{field_count:>3} fields")),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: usize, total_pages: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page,
            total_pages,
            red(&msg),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        if success_count == total_pages {
            eprintln!(
                "{} {} page(s) extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} extraction aborted after {}/{} page(s)",
                red("✘"),
                bold(&success_count.to_string()),
                total_pages
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Identity card photo, results to stdout
  docextract --type ic mykad.jpg

  # Multi-page company form, results to a file
  docextract --type ssm_form_d form_d.pdf -o form_d.json

  # Download and extract
  docextract --type utility_bill https://example.com/bill.pdf

  # Blur/glare only (no API key needed)
  docextract --type passport --quality-only passport.png

  # Custom instruction and model
  docextract --type passport --instruction-file passport.txt --model gpt-4.1 scan.jpg

DOCUMENT TYPES:
  ic, passport, cash_deposit, bank_transfer, ssm_form_d, utility_bill

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory); default: system library
"#;

/// Extract structured fields from scanned documents using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "docextract",
    version,
    about = "Extract structured fields from scanned documents using Vision LLMs",
    long_about = "Extract fields from identity cards, passports, bank slips, company forms and \
utility bills (JPEG, PNG or PDF; local file or URL). Each page is scored for blur and glare \
and sent to a vision model; the result is a JSON list with one entry per page.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL (.jpg, .jpeg, .png, .pdf).
    input: String,

    /// Document type: ic, passport, cash_deposit, bank_transfer, ssm_form_d, utility_bill.
    #[arg(short = 't', long = "type", env = "DOCEXTRACT_TYPE", value_parser = parse_doc_type)]
    doc_type: DocumentType,

    /// Write JSON results to this file instead of stdout.
    #[arg(short, long, env = "DOCEXTRACT_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// PDF rendering DPI (72–600).
    #[arg(long, env = "DOCEXTRACT_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Max LLM output tokens per page.
    #[arg(long, env = "DOCEXTRACT_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCEXTRACT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Replace the built-in instruction for the chosen type with this file's text.
    #[arg(long, env = "DOCEXTRACT_INSTRUCTION_FILE")]
    instruction_file: Option<PathBuf>,

    /// Only score blur and glare per page; do not call the model.
    #[arg(long)]
    quality_only: bool,

    /// Maximum input size in bytes.
    #[arg(long, env = "DOCEXTRACT_MAX_FILE_SIZE", default_value_t = 10 * 1024 * 1024)]
    max_file_size: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCEXTRACT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "DOCEXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCEXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCEXTRACT_QUIET")]
    quiet: bool,
}

fn parse_doc_type(s: &str) -> Result<DocumentType, String> {
    s.parse::<DocumentType>().map_err(|e| e.to_string())
}

/// One line of `--quality-only` output.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QualityRow {
    page: Option<usize>,
    blur_intensity: u8,
    glare_intensity: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.quality_only;
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
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let loaded = load_input(&cli.input, &config)
        .await
        .with_context(|| format!("Failed to load {}", cli.input))?;

    // ── Quality-only mode ────────────────────────────────────────────────
    if cli.quality_only {
        let rasterizer = PdfiumRasterizer::new(config.max_rendered_pixels);
        let pages = split_pages(&loaded.bytes, &rasterizer, config.dpi)
            .await
            .context("Failed to split document")?;
        let scores = QualityScorer::new(config.quality.clone()).score_pages(&pages);
        let rows: Vec<QualityRow> = pages
            .iter()
            .zip(scores)
            .map(|(p, s)| QualityRow {
                page: p.page,
                blur_intensity: s.blur,
                glare_intensity: s.glare,
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("Failed to serialise scores")?
        );
        return Ok(());
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let extractor = Extractor::new(config).context("Failed to set up extraction oracle")?;
    let output = extractor
        .run(&loaded.bytes, cli.doc_type)
        .await
        .context("Extraction failed")?;

    if let Some(ref path) = cli.output {
        write_results(&output.results, path).context("Failed to write results")?;
    } else {
        let json =
            serde_json::to_string_pretty(&output.results).context("Failed to serialise output")?;
        println!("{json}");
    }

    if !cli.quiet {
        let target = cli
            .output
            .as_ref()
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{}  {} page(s)  {}ms  {}{}",
            green("✔"),
            output.stats.page_count,
            output.stats.total_duration_ms,
            dim(&format!("oracle {}ms", output.stats.oracle_duration_ms)),
            target,
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut instructions = InstructionRegistry::default();
    if let Some(ref path) = cli.instruction_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        instructions = instructions.with_instruction(cli.doc_type, text);
    }

    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .instructions(instructions)
        .max_file_size(cli.max_file_size)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
