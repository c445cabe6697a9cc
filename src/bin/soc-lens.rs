//! CLI binary for soc-lens.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnalysisConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use soc_lens::analyze::write_atomic;
use soc_lens::pipeline::serialize::serialize_tables;
use soc_lens::{
    analyze, analyze_document, read_tables, AnalysisConfig, AnalysisProgressCallback,
    ProgressCallback, StructuredRecord, TableDetectionConfig,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a percentage bar plus one log line per
/// skipped chunk.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix("Analyzing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_progress(&self, percent: u8, message: &str) {
        self.bar.set_position(percent as u64);
        self.bar.set_message(message.to_string());
    }

    fn on_chunk_error(&self, chunk: usize, total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}",
            red("✗"),
            chunk,
            total,
            red(&msg)
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a SOC 2 report (JSON to stdout)
  soc-lens soc2-type2.pdf

  # Write the record to a file
  soc-lens soc2-type2.pdf -o findings.json

  # Show the tables detected in the PDF (no model call, no API key)
  soc-lens --tables-only soc2-type2.pdf

  # Analyze already-extracted text
  soc-lens --text report.txt

  # Local model through an OpenAI-compatible server
  soc-lens --endpoint http://localhost:11434/v1/chat/completions \
           --model llama3.1:8b --local-model report.pdf

  # Named provider
  soc-lens --provider anthropic --model claude-sonnet-4-20250514 report.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  SOC_LENS_API_KEY        Bearer key for --endpoint (falls back to OPENAI_API_KEY)
  PDFIUM_LIB_PATH         Directory containing libpdfium
"#;

/// Extract tables and structured findings from SOC assurance reports.
#[derive(Parser, Debug)]
#[command(
    name = "soc-lens",
    version,
    about = "Extract tables and structured findings from SOC 1 / SOC 2 reports using LLMs",
    long_about = "Reconstructs tables from the PDF text layer, sends the page-marked text to a \
language model and recovers a structured record (executive summary, control failures, \
exclusions, carve-outs) even when the model's JSON is malformed or truncated. Supports OpenAI, \
Anthropic, Google Gemini, Ollama and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF report to analyze.
    #[arg(required_unless_present = "text")]
    input: Option<PathBuf>,

    /// Analyze this plain-text file instead of a PDF.
    #[arg(long, conflicts_with_all = ["input", "tables_only"])]
    text: Option<PathBuf>,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "SOC_LENS_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514, llama3.1:8b).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, lmstudio, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// OpenAI-compatible chat-completions URL.
    #[arg(long, env = "SOC_LENS_ENDPOINT")]
    endpoint: Option<String>,

    /// The model is a local, lower-reliability model: enable aggressive JSON repair.
    #[arg(long, env = "SOC_LENS_LOCAL_MODEL")]
    local_model: bool,

    /// Input budget per model call, in approximate tokens.
    #[arg(long, env = "SOC_LENS_TOKEN_BUDGET", default_value_t = 12_000)]
    token_budget: usize,

    /// Max LLM output tokens per call.
    #[arg(long, env = "SOC_LENS_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "SOC_LENS_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per call on transient failures.
    #[arg(long, env = "SOC_LENS_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call timeout in seconds.
    #[arg(long, env = "SOC_LENS_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "SOC_LENS_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "SOC_LENS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Baseline tolerance for grouping text into rows, in PDF points.
    #[arg(long, default_value_t = 3.0)]
    row_tolerance: f32,

    /// Print detected tables only; no model call.
    #[arg(long)]
    tables_only: bool,

    /// Print compact instead of pretty JSON.
    #[arg(long)]
    compact: bool,

    /// Disable progress bar.
    #[arg(long, env = "SOC_LENS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SOC_LENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SOC_LENS_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.tables_only;
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

    let progress_cb = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress_cb.clone().map(|cb| cb as ProgressCallback),
    )
    .await?;

    // ── Tables-only mode ─────────────────────────────────────────────────
    if cli.tables_only {
        let input = cli.input.as_ref().context("A PDF input is required")?;
        let tables = read_tables(input, &config)
            .await
            .context("Failed to read tables")?;
        let rendered = if tables.is_empty() {
            "No tables detected.\n".to_string()
        } else {
            serialize_tables(&tables)
        };
        return emit(&cli, rendered).await;
    }

    // ── Run analysis ─────────────────────────────────────────────────────
    let start = Instant::now();
    let result = match (&cli.text, &cli.input) {
        (Some(text_path), _) => {
            let text = tokio::fs::read_to_string(text_path)
                .await
                .with_context(|| format!("Failed to read {:?}", text_path))?;
            analyze(&text, &config).await
        }
        (None, Some(input)) => analyze_document(input, &config)
            .await
            .map(|analysis| analysis.record),
        (None, None) => anyhow::bail!("A PDF input or --text FILE is required"),
    };
    if let Some(cb) = &progress_cb {
        cb.finish();
    }
    let record = result.context("Analysis failed")?;

    let json = if cli.compact {
        serde_json::to_string(&record)
    } else {
        serde_json::to_string_pretty(&record)
    }
    .context("Failed to serialise record")?;
    emit(&cli, json + "\n").await?;

    if !cli.quiet {
        print_summary(&record, start.elapsed());
    }
    Ok(())
}

/// Write to `--output` atomically, or to stdout.
async fn emit(cli: &Cli, contents: String) -> Result<()> {
    match &cli.output {
        Some(path) => {
            write_atomic(path, contents.as_bytes())
                .await
                .context("Failed to write output")?;
            if !cli.quiet {
                eprintln!("{}  {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(contents.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

fn print_summary(record: &StructuredRecord, elapsed: Duration) {
    let summary = &record.executive_summary;
    let marker = if record.control_failures.is_empty() {
        green("✔")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{} {}  {}  opinion: {:?}",
        marker,
        bold(&summary.service_organization),
        summary.report_type,
        summary.opinion
    );
    eprintln!(
        "   {} control failures  /  {} exclusions  /  {} carve-outs",
        record.control_failures.len(),
        record.exclusions.len(),
        record.carve_outs.len()
    );
    eprintln!(
        "   {}",
        dim(&format!(
            "parse: {:?}  chunks: {}/{} analyzed  {:.1}s",
            record.parse_method,
            record.source.chunks_analyzed,
            record.source.chunks_total,
            elapsed.as_secs_f64()
        ))
    );
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = AnalysisConfig::builder()
        .token_budget(cli.token_budget)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .local_model(cli.local_model)
        .tables(TableDetectionConfig {
            row_tolerance: cli.row_tolerance,
            ..TableDetectionConfig::default()
        });

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref endpoint) = cli.endpoint {
        builder = builder.endpoint(endpoint);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
