//! Batch processing: many documents, bounded concurrency, one summary.
//!
//! The batch driver is parallel at the *document* level and sequential
//! within a document — workers are independent async tasks that share
//! nothing but the rate limiter inside the [`WorkflowDriver`]. A
//! quarantined document never stops the batch; it lands in the summary's
//! failure count and the run moves on.
//!
//! Discovery is deliberately flat: only files directly inside the input
//! directory are considered, so `processed/` and `quarantine/`
//! subdirectories can live under the input directory without being
//! re-ingested forever.

use crate::workflow::{RunReport, WorkflowDriver};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Options for one batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Case-insensitive substring a filename must contain. `None` matches
    /// every `.pdf`.
    pub pattern: Option<String>,
    /// Case-insensitive substrings that exclude a filename.
    pub exclude: Vec<String>,
    /// Stop discovering after this many files.
    pub max_files: Option<usize>,
    pub dry_run: bool,
}

/// Counts and per-document reports for a finished batch.
#[derive(Debug)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub quarantined: usize,
    pub statements_written: usize,
    pub elapsed_ms: u64,
    pub reports: Vec<RunReport>,
}

impl BatchSummary {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.total as f64
    }
}

/// Discover matching PDFs in the driver's input directory and process
/// them with the configured worker count.
pub async fn batch_process(driver: &WorkflowDriver, options: &BatchOptions) -> BatchSummary {
    let start = Instant::now();
    let files = discover(driver, options);
    let workers = driver.config().workers.max(1);
    info!(
        "batch: {} file(s) discovered, {} worker(s)",
        files.len(),
        workers
    );

    let reports: Vec<RunReport> = stream::iter(files)
        .map(|path| async move { driver.process_opts(&path, options.dry_run, None).await })
        .buffer_unordered(workers)
        .collect()
        .await;

    let succeeded = reports.iter().filter(|r| r.is_success()).count();
    let statements_written = reports.iter().map(|r| r.statements).sum();
    let summary = BatchSummary {
        total: reports.len(),
        succeeded,
        quarantined: reports.len() - succeeded,
        statements_written,
        elapsed_ms: start.elapsed().as_millis() as u64,
        reports,
    };

    info!(
        "batch complete: {}/{} succeeded ({:.0}%), {} statement(s), {}ms",
        summary.succeeded,
        summary.total,
        summary.success_rate() * 100.0,
        summary.statements_written,
        summary.elapsed_ms
    );
    debug!("rate limiter after batch: {:?}", driver.limiter().stats());
    summary
}

/// Enumerate `.pdf` files directly inside the input directory, filtered
/// and capped per the options, in deterministic name order.
fn discover(driver: &WorkflowDriver, options: &BatchOptions) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(&driver.config().input_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let included = options
                .pattern
                .as_ref()
                .map(|p| name.contains(&p.to_lowercase()))
                .unwrap_or(true);
            let excluded = options
                .exclude
                .iter()
                .any(|e| name.contains(&e.to_lowercase()));
            included && !excluded
        })
        .collect();

    files.sort();
    if let Some(max) = options.max_files {
        files.truncate(max);
    }
    files
}
