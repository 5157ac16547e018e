//! CLI binary for statement-separator.
//!
//! A thin shim over the library crate that maps CLI flags to `Config`,
//! runs the requested command, and translates outcomes to exit codes:
//!
//! | code | meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | general error |
//! | 2 | invalid arguments (clap) |
//! | 3 | input not found |
//! | 4 | permission denied |
//! | 5 | processing failed (at least one document quarantined) |
//! | 6 | provider error (strict mode rejected fallback) |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use statement_separator::{
    batch_process, quarantine, BatchOptions, Config, ProviderKind, RunOutcome, RunReport,
    Strictness, WorkflowDriver,
};
use std::io;
use std::path::PathBuf;
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

const AFTER_HELP: &str = r#"EXAMPLES:
  # Split one combined PDF into per-statement files
  stmtsep process statements.pdf -o ./separated

  # See the planned boundaries and filenames without writing anything
  stmtsep process statements.pdf --dry-run

  # Batch over a directory, four documents at a time
  stmtsep batch ./inbox -o ./separated --workers 4

  # Model-assisted detection via an OpenAI-compatible endpoint
  STMTSEP_API_KEY=sk-... stmtsep process statements.pdf --provider remote

  # Local model via Ollama, nothing leaves the machine
  stmtsep process statements.pdf --provider local --model llama3.1

  # Inspect and prune the quarantine directory
  stmtsep quarantine-status
  stmtsep quarantine-clean --older-than-days 30

OUTPUT NAMING:
  {bank}-{account_last4}-{closing_date}.pdf
  e.g. westpac-2819-2015-05-21.pdf, unknown-0000-unknown-date.pdf
  Name collisions get a numeric suffix: westpac-2819-2015-05-21-2.pdf

ENVIRONMENT VARIABLES:
  STMTSEP_PROVIDER      Provider kind: remote, local, none
  STMTSEP_MODEL         Model identifier
  STMTSEP_ENDPOINT      Provider endpoint base URL
  STMTSEP_API_KEY       API key for the remote provider
  STMTSEP_OUTPUT_DIR    Default output directory
  STMTSEP_QUARANTINE    Default quarantine directory
"#;

/// Split multi-statement bank PDFs into per-statement files.
#[derive(Parser, Debug)]
#[command(
    name = "stmtsep",
    version,
    about = "Split multi-statement bank PDFs into per-statement files",
    long_about = "Split PDF files that concatenate several independent bank statements into one \
PDF per statement, with deterministic names carrying the issuing bank, account last-four, and \
statement closing date. Boundary detection is model-assisted when a provider is configured and \
falls back to deterministic text analysis otherwise.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Provider kind: remote, local, none.
    #[arg(long, global = true, env = "STMTSEP_PROVIDER", default_value = "none")]
    provider: String,

    /// Model identifier (e.g. gpt-4.1-nano, llama3.1).
    #[arg(long, global = true, env = "STMTSEP_MODEL")]
    model: Option<String>,

    /// Provider endpoint base URL.
    #[arg(long, global = true, env = "STMTSEP_ENDPOINT")]
    endpoint: Option<String>,

    /// API key for the remote provider.
    #[arg(long, global = true, env = "STMTSEP_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Requests allowed per trailing 60-second window.
    #[arg(long, global = true, default_value_t = 50)]
    requests_per_minute: usize,

    /// Burst-token pool size.
    #[arg(long, global = true, default_value_t = 10)]
    burst_limit: usize,

    /// Attempts per provider call before declaring exhaustion.
    #[arg(long, global = true, default_value_t = 3)]
    max_attempts: u32,

    /// Documents processed concurrently in batch mode.
    #[arg(long, global = true, default_value_t = 1)]
    workers: usize,

    /// Ingestion strictness: strict, normal, lenient.
    #[arg(long, global = true, default_value = "normal")]
    strictness: String,

    /// Quarantine directory for failed inputs.
    #[arg(long, global = true, env = "STMTSEP_QUARANTINE", default_value = "./quarantine")]
    quarantine_dir: PathBuf,

    /// Move successful inputs here.
    #[arg(long, global = true)]
    processed_dir: Option<PathBuf>,

    /// Print summaries as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split one PDF into per-statement files.
    Process {
        /// Input PDF path.
        input: PathBuf,

        /// Output directory for the per-statement files.
        #[arg(short, long, env = "STMTSEP_OUTPUT_DIR", default_value = "./separated")]
        output_dir: PathBuf,

        /// Detect and report without writing any files.
        #[arg(long)]
        dry_run: bool,
    },

    /// Process every matching PDF in a directory.
    Batch {
        /// Input directory scanned for PDFs (non-recursive).
        input_dir: PathBuf,

        /// Output directory for the per-statement files.
        #[arg(short, long, env = "STMTSEP_OUTPUT_DIR", default_value = "./separated")]
        output_dir: PathBuf,

        /// Only filenames containing this substring.
        #[arg(long)]
        pattern: Option<String>,

        /// Skip filenames containing any of these substrings.
        #[arg(long)]
        exclude: Vec<String>,

        /// Process at most this many files.
        #[arg(long)]
        max_files: Option<usize>,

        /// Detect and report without writing any files.
        #[arg(long)]
        dry_run: bool,
    },

    /// Summarise the quarantine directory.
    QuarantineStatus,

    /// Delete quarantined files older than a cutoff.
    QuarantineClean {
        /// Age cutoff in days.
        #[arg(long, default_value_t = 30)]
        older_than_days: u64,

        /// Report what would be deleted without deleting.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let code = run(cli).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Command::Process {
            input,
            output_dir,
            dry_run,
        } => {
            let config = build_config(&cli, output_dir.clone(), None)?;
            let driver = WorkflowDriver::new(config);

            let bar = spinner(&cli, &format!("Processing {}", input.display()));
            let report = driver.process_opts(input, *dry_run, None).await;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }

            print_report(&cli, &report);
            Ok(exit_code_for(&[report]))
        }

        Command::Batch {
            input_dir,
            output_dir,
            pattern,
            exclude,
            max_files,
            dry_run,
        } => {
            if !input_dir.is_dir() {
                eprintln!("{} input directory not found: {}", red("✗"), input_dir.display());
                return Ok(3);
            }
            let config = build_config(&cli, output_dir.clone(), Some(input_dir.clone()))?;
            let driver = WorkflowDriver::new(config);
            let options = BatchOptions {
                pattern: pattern.clone(),
                exclude: exclude.clone(),
                max_files: *max_files,
                dry_run: *dry_run,
            };

            let bar = spinner(&cli, &format!("Batch over {}", input_dir.display()));
            let summary = batch_process(&driver, &options).await;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }

            for report in &summary.reports {
                print_report(&cli, report);
            }
            if !cli.quiet {
                let icon = if summary.quarantined == 0 { green("✔") } else { cyan("⚠") };
                eprintln!(
                    "{icon} {}/{} documents succeeded  {}  {} statement(s)  {}ms",
                    bold(&summary.succeeded.to_string()),
                    summary.total,
                    dim(&format!("{:.0}% success", summary.success_rate() * 100.0)),
                    summary.statements_written,
                    summary.elapsed_ms,
                );
            }
            Ok(exit_code_for(&summary.reports))
        }

        Command::QuarantineStatus => {
            let report_dir = cli.quarantine_dir.join("reports");
            let status = quarantine::status(&cli.quarantine_dir, &report_dir)
                .context("failed to read quarantine directory")?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Quarantined files: {}", status.quarantined_files);
                println!("Reports:           {}", status.reports.len());
                for (category, count) in &status.by_category {
                    println!("  {:<24} {}", category, count);
                }
            }
            Ok(0)
        }

        Command::QuarantineClean {
            older_than_days,
            dry_run,
        } => {
            let report_dir = cli.quarantine_dir.join("reports");
            let removed =
                quarantine::clean(&cli.quarantine_dir, &report_dir, *older_than_days, *dry_run)
                    .context("quarantine clean failed")?;

            if !cli.quiet {
                let verb = if *dry_run { "would remove" } else { "removed" };
                println!("{} {} file(s)", verb, removed.len());
                for path in &removed {
                    println!("  {}", path.display());
                }
            }
            Ok(0)
        }
    }
}

/// Map CLI flags to the library `Config`.
fn build_config(cli: &Cli, output_dir: PathBuf, input_dir: Option<PathBuf>) -> Result<Config> {
    let provider_kind = match cli.provider.to_lowercase().as_str() {
        "remote" => ProviderKind::Remote,
        "local" => ProviderKind::Local,
        "none" => ProviderKind::None,
        other => anyhow::bail!("unknown provider kind '{}': use remote, local, or none", other),
    };
    let strictness = match cli.strictness.to_lowercase().as_str() {
        "strict" => Strictness::Strict,
        "normal" => Strictness::Normal,
        "lenient" => Strictness::Lenient,
        other => anyhow::bail!("unknown strictness '{}': use strict, normal, or lenient", other),
    };

    let mut builder = Config::builder()
        .provider_kind(provider_kind)
        .requests_per_minute(cli.requests_per_minute)
        .burst_limit(cli.burst_limit)
        .max_attempts(cli.max_attempts)
        .workers(cli.workers)
        .strictness(strictness)
        .output_dir(output_dir)
        .quarantine_dir(cli.quarantine_dir.clone());

    if let Some(dir) = input_dir {
        builder = builder.input_dir(dir);
    }
    if let Some(model) = &cli.model {
        builder = builder.model_name(model.clone());
    }
    if let Some(endpoint) = &cli.endpoint {
        builder = builder.endpoint(endpoint.clone());
    }
    if let Some(key) = &cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(dir) = &cli.processed_dir {
        builder = builder.processed_input_dir(dir.clone());
    }

    builder.build().context("invalid configuration")
}

fn spinner(cli: &Cli, message: &str) -> Option<ProgressBar> {
    if cli.quiet || cli.json {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    Some(bar)
}

fn print_report(cli: &Cli, report: &RunReport) {
    if cli.quiet {
        return;
    }
    match &report.outcome {
        RunOutcome::Success { outputs, dry_run } => {
            let suffix = if *dry_run { dim(" (dry run)") } else { String::new() };
            eprintln!(
                "{} {}  →  {} statement(s){}",
                green("✓"),
                report.input_path.display(),
                bold(&report.statements.to_string()),
                suffix,
            );
            for output in outputs {
                eprintln!("    {}", output.display());
            }
        }
        RunOutcome::Quarantined {
            stage,
            category,
            detail,
            quarantine_path,
        } => {
            eprintln!(
                "{} {}  {} at stage {}",
                red("✗"),
                report.input_path.display(),
                red(category),
                stage,
            );
            eprintln!("    {}", dim(detail));
            if let Some(path) = quarantine_path {
                eprintln!("    quarantined at {}", path.display());
            }
        }
    }
    for warning in &report.warnings {
        eprintln!("    {} {}", cyan("⚠"), dim(warning));
    }
}

/// Translate run outcomes to the documented exit codes.
fn exit_code_for(reports: &[RunReport]) -> i32 {
    let mut code = 0;
    for report in reports {
        if let RunOutcome::Quarantined { category, detail, .. } = &report.outcome {
            let this = match category.as_str() {
                "FileMissing" => 3,
                "ProviderExhausted" => 6,
                "FilesystemError" if detail.to_lowercase().contains("permission denied") => 4,
                _ => 5,
            };
            // The most specific non-success code wins; ties favour the
            // first failure seen.
            if code == 0 {
                code = this;
            } else if code == 5 && this != 5 {
                code = this;
            }
        }
    }
    code
}
