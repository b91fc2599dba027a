//! CLI binary for edgequake-textproc.
//!
//! A thin shim over the library crate that maps CLI flags onto
//! `ProcessorConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use edgequake_textproc::convert::{read_document, MARKUP_EXTENSIONS, SUPPORTED_EXTENSIONS};
use edgequake_textproc::{
    AnalysisResult, AnalysisTask, Backend, BatchCoordinator, BatchOutcome, BatchProgressCallback,
    BatchResult, DocumentConverter, MarkupConverter, ProcessorConfig, ProgressCallback,
    TextFormat, TextProcessor,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Read};
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

/// Terminal progress for batches: one bar plus a log line per finished item.
/// Items finish out of order when concurrency > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Analysing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .map(|mut m| m.remove(&index))
            .ok()
            .flatten()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total} documents…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize, source: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(source.to_string());
    }

    fn on_item_complete(&self, index: usize, total: usize, source: &str) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            source,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, source: &str, error: &str) {
        let secs = self.elapsed_secs(index);
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            source,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let failed = total.saturating_sub(succeeded);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} documents processed successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents processed  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarise a Markdown file with the local model runner
  textproc summarize report.md

  # Five key points from stdin
  cat notes.txt | textproc key-points -

  # Custom analysis with a larger budget
  textproc analyze contract.html -i "List every deadline with its date" --max-tokens 1500

  # Batch over many files, JSON output
  textproc batch docs/*.md --task key-points --json > points.json

  # Use a hosted provider through edgequake-llm
  textproc --provider anthropic --model claude-sonnet-4-20250514 summarize paper.md

ENVIRONMENT VARIABLES:
  MODEL_RUNNER_URL           OpenAI-compatible base URL (default http://localhost:8080/v1)
  TEXTPROC_MODEL             Model ID (default docker.io/granite-4.0-nano:350M-BF16)
  OPENAI_API_KEY             API key; unset means the endpoint needs none
  EDGEQUAKE_LLM_PROVIDER     Use an edgequake-llm provider (openai, anthropic, gemini, ollama)
  TEXTPROC_MAX_TOKENS        Default summary length in tokens (500)
  TEXTPROC_TEMPERATURE       Default temperature (0.7)
  TEXTPROC_NUM_POINTS        Default number of key points (5)
  TEXTPROC_MAX_INPUT_CHARS   Document characters sent per call (32000)
  TEXTPROC_MAX_RETRIES       Retries after the first attempt (2)
  TEXTPROC_CONCURRENCY       Parallel calls in batch mode (4)
  TEXTPROC_TIMEOUT_SECS      Per-call timeout (60)
  RUST_LOG                   Log filter, overrides -v / -q
"#;

/// Summarise, extract key points from, and analyse documents with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "textproc",
    version,
    about = "Summarise, extract key points from, and analyse documents with an LLM",
    long_about = "Summarise, extract key points from, and run custom analyses over text \
documents using a local OpenAI-compatible model runner or any edgequake-llm provider.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Model ID (overrides TEXTPROC_MODEL).
    #[arg(long, global = true)]
    model: Option<String>,

    /// edgequake-llm provider name instead of the OpenAI-compatible endpoint.
    #[arg(long, global = true)]
    provider: Option<String>,

    /// OpenAI-compatible base URL (overrides MODEL_RUNNER_URL).
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Retries after the first attempt.
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Per-call timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Document characters sent per call; longer input is truncated.
    #[arg(long, global = true)]
    max_input_chars: Option<usize>,

    /// Path to a text file containing a custom summarisation system prompt.
    #[arg(long, global = true, env = "TEXTPROC_SUMMARY_PROMPT")]
    summary_prompt: Option<PathBuf>,

    /// Output structured JSON instead of plain text.
    #[arg(long, global = true, env = "TEXTPROC_JSON")]
    json: bool,

    /// Disable the batch progress bar.
    #[arg(long, global = true, env = "TEXTPROC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TEXTPROC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except results and errors.
    #[arg(short, long, global = true, env = "TEXTPROC_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarise a document.
    Summarize {
        #[command(flatten)]
        input: InputArgs,
        /// Summary length bound in tokens.
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Sampling temperature (0.0–2.0).
        #[arg(long)]
        temperature: Option<f32>,
    },
    /// Extract distinct key points.
    KeyPoints {
        #[command(flatten)]
        input: InputArgs,
        /// Number of points.
        #[arg(short, long)]
        num_points: Option<u32>,
        /// Completion budget in tokens.
        #[arg(long)]
        max_tokens: Option<u32>,
    },
    /// Run a free-form instruction against a document.
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        /// What to do with the document.
        #[arg(short, long)]
        instruction: String,
        /// Completion budget in tokens.
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Sampling temperature (0.0–2.0).
        #[arg(long)]
        temperature: Option<f32>,
    },
    /// Run one task over many documents.
    Batch {
        /// Document files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Task to run on every document.
        #[arg(long, value_enum, default_value = "summarize")]
        task: TaskArg,
        /// Instruction for `--task analyze`.
        #[arg(short, long)]
        instruction: Option<String>,
        /// Number of key points for `--task key-points`.
        #[arg(short, long)]
        num_points: Option<u32>,
        /// Token budget per document.
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Sampling temperature for summaries and analyses (0.0–2.0).
        #[arg(long)]
        temperature: Option<f32>,
        /// Parallel calls (overrides TEXTPROC_CONCURRENCY).
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// Ask the converter to OCR scanned documents.
        #[arg(long)]
        ocr: bool,
    },
    /// List supported document formats.
    Formats,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Document path, or `-` for stdin.
    input: String,
    /// Ask the converter to OCR scanned documents.
    #[arg(long)]
    ocr: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TaskArg {
    Summarize,
    KeyPoints,
    Analyze,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the user-facing feedback during batches, so
    // library INFO logs are suppressed while it is shown.
    let show_progress = !cli.quiet
        && !cli.no_progress
        && !cli.json
        && matches!(cli.command, Command::Batch { .. });
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

    if let Command::Formats = cli.command {
        print_formats(cli.json)?;
        return Ok(());
    }

    let config = build_config(&cli).await?;
    let processor = TextProcessor::from_config(config).context("Failed to set up the model backend")?;

    match &cli.command {
        Command::Summarize {
            input,
            max_tokens,
            temperature,
        } => {
            let text = load_input(input, processor.config()).await?;
            let result = processor.summarize(&text, *max_tokens, *temperature).await;
            print_result(&result, cli.json, cli.quiet)
        }
        Command::KeyPoints {
            input,
            num_points,
            max_tokens,
        } => {
            let text = load_input(input, processor.config()).await?;
            let task = AnalysisTask::KeyPoints {
                num_points: *num_points,
                max_tokens: *max_tokens,
            };
            let result = processor.analyze_text(&text, &task).await;
            print_result(&result, cli.json, cli.quiet)
        }
        Command::Analyze {
            input,
            instruction,
            max_tokens,
            temperature,
        } => {
            let text = load_input(input, processor.config()).await?;
            let task = AnalysisTask::CustomAnalysis {
                instruction: instruction.clone(),
                max_tokens: *max_tokens,
                temperature: *temperature,
            };
            let result = processor.analyze_text(&text, &task).await;
            print_result(&result, cli.json, cli.quiet)
        }
        Command::Batch {
            files,
            task,
            instruction,
            num_points,
            max_tokens,
            temperature,
            concurrency,
            ocr,
        } => {
            let task = match task {
                TaskArg::Summarize => AnalysisTask::Summarize {
                    max_tokens: *max_tokens,
                    temperature: *temperature,
                },
                TaskArg::KeyPoints => AnalysisTask::KeyPoints {
                    num_points: *num_points,
                    max_tokens: *max_tokens,
                },
                TaskArg::Analyze => AnalysisTask::CustomAnalysis {
                    instruction: instruction
                        .clone()
                        .context("--instruction is required with --task analyze")?,
                    max_tokens: *max_tokens,
                    temperature: *temperature,
                },
            };

            let converter = MarkupConverter::from_config(processor.config());
            let mut coordinator = BatchCoordinator::new(processor);
            if let Some(n) = concurrency {
                coordinator = coordinator.with_concurrency(*n);
            }
            if show_progress {
                let cb = CliProgressCallback::new();
                coordinator = coordinator.with_progress(cb as ProgressCallback);
            }

            let batch = coordinator
                .process_files(&converter, files.clone(), *ocr, &task, None)
                .await;
            print_batch(&batch, cli.json, cli.quiet || show_progress)
        }
        Command::Formats => Ok(()),
    }
}

/// Map CLI args onto the environment-resolved `ProcessorConfig`.
async fn build_config(cli: &Cli) -> Result<ProcessorConfig> {
    let mut builder = ProcessorConfig::from_env()
        .context("Invalid environment configuration")?
        .into_builder();

    if let Some(ref provider) = cli.provider {
        builder = builder.backend(Backend::Provider(provider.to_lowercase()));
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.clone());
    }
    if let Some(n) = cli.max_retries {
        builder = builder.max_retries(n);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if let Some(n) = cli.max_input_chars {
        builder = builder.max_input_chars(n);
    }
    if let Some(ref path) = cli.summary_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read summary prompt from {:?}", path))?;
        builder = builder.summary_system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Read the document text from stdin or a file, converting markup.
async fn load_input(args: &InputArgs, config: &ProcessorConfig) -> Result<String> {
    if args.input == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }

    let path = PathBuf::from(&args.input);
    let doc = read_document(&path, config.max_document_bytes)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let converted = MarkupConverter::from_config(config)
        .convert(&doc.name, &doc.bytes, args.ocr)
        .await
        .with_context(|| format!("Failed to convert {}", path.display()))?;
    Ok(converted.text)
}

fn print_result(result: &AnalysisResult, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).context("Failed to serialise result")?
        );
    } else if let Some(points) = result.key_points() {
        for (i, point) in points.iter().enumerate() {
            println!("{}. {}", i + 1, point);
        }
    } else if let Some(text) = result.text() {
        println!("{text}");
    }

    if let Some(ref error) = result.error {
        anyhow::bail!("{error}");
    }

    if !quiet && !json {
        let m = &result.metadata;
        eprintln!(
            "{}",
            dim(&format!(
                "{}  {} tokens in / {} out  {} attempt(s)  {}ms{}",
                m.model,
                m.tokens_used.prompt,
                m.tokens_used.completion,
                m.attempts,
                m.duration_ms,
                if m.truncated { "  (input truncated)" } else { "" },
            ))
        );
    }
    Ok(())
}

fn print_batch(batch: &BatchResult, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(batch).context("Failed to serialise batch result")?
        );
        return Ok(());
    }

    for item in batch.iter() {
        println!("{}", bold(&format!("## {}", item.source)));
        match &item.outcome {
            BatchOutcome::Analyzed { result } if result.success => {
                if let Some(points) = result.key_points() {
                    for (i, point) in points.iter().enumerate() {
                        println!("{}. {}", i + 1, point);
                    }
                } else if let Some(text) = result.text() {
                    println!("{text}");
                }
            }
            _ => println!("{}", red(&item.error().unwrap_or_default())),
        }
        println!();
    }

    if !quiet {
        eprintln!(
            "Processed {}/{} documents",
            batch.succeeded(),
            batch.len()
        );
    }
    Ok(())
}

fn print_formats(json: bool) -> Result<()> {
    if json {
        let v = serde_json::json!({
            "supported_extensions": SUPPORTED_EXTENSIONS,
            "built_in": MARKUP_EXTENSIONS,
            "output_formats": [TextFormat::Markdown, TextFormat::Json, TextFormat::Yaml],
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&v).context("Failed to serialise formats")?
        );
    } else {
        println!("Accepted extensions:  {}", SUPPORTED_EXTENSIONS.join(", "));
        println!("Converted built-in:   {}", MARKUP_EXTENSIONS.join(", "));
        println!("Conversion outputs:   markdown, json, yaml");
    }
    Ok(())
}
