//! End-to-end workflow tests over a synthetic PDF backend and a scripted
//! model provider.
//!
//! Nothing here touches a PDF parser or the network: the backend serves
//! page text from an in-memory registry (writing real placeholder files so
//! filesystem checks stay honest), and the provider replays a scripted
//! sequence of responses. That keeps every scenario deterministic and
//! fast while still driving the real driver, detection engine, validator,
//! and quarantine machinery.

use async_trait::async_trait;
use parking_lot::Mutex;
use statement_separator::error::{ProviderError, SeparatorError};
use statement_separator::pdf::{PdfBackend, PdfInfo};
use statement_separator::provider::{
    BoundaryCandidate, MetadataCandidate, ModelProvider, ProviderInfo,
};
use statement_separator::sink::{DocumentSink, RemoteId, SinkError, UploadMetadata};
use statement_separator::workflow::{RunOutcome, WorkflowDriver};
use statement_separator::{Config, ProviderKind, Strictness};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

// ── Synthetic PDF backend ────────────────────────────────────────────────────

const BYTES_PER_PAGE: usize = 1500;

#[derive(Clone)]
struct FakeDoc {
    pages: Vec<String>,
    encrypted: bool,
}

/// Serves page text from a registry; writes real files so existence and
/// size checks observe actual filesystem state.
#[derive(Default)]
struct FakeBackend {
    docs: Mutex<HashMap<PathBuf, FakeDoc>>,
    /// Indices (0-based) of outputs whose write is silently skipped, to
    /// provoke validation failures.
    skip_writes: Mutex<Vec<usize>>,
    writes: AtomicU32,
}

impl FakeBackend {
    fn register(&self, path: &Path, pages: Vec<String>) {
        self.register_with(path, pages, false);
    }

    fn register_with(&self, path: &Path, pages: Vec<String>, encrypted: bool) {
        let padded = "x".repeat(BYTES_PER_PAGE * pages.len().max(1));
        std::fs::write(path, padded).unwrap();
        self.docs
            .lock()
            .insert(path.to_path_buf(), FakeDoc { pages, encrypted });
    }
}

impl PdfBackend for FakeBackend {
    fn inspect(&self, path: &Path) -> Result<PdfInfo, SeparatorError> {
        let docs = self.docs.lock();
        let doc = docs.get(path).ok_or_else(|| SeparatorError::PdfUnreadable {
            path: path.to_path_buf(),
            detail: "not registered with the fake backend".into(),
        })?;
        Ok(PdfInfo {
            page_count: doc.pages.len(),
            encrypted: doc.encrypted,
            byte_size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        })
    }

    fn page_texts(&self, path: &Path) -> Result<Vec<String>, SeparatorError> {
        let docs = self.docs.lock();
        docs.get(path)
            .map(|d| d.pages.clone())
            .ok_or_else(|| SeparatorError::PdfUnreadable {
                path: path.to_path_buf(),
                detail: "not registered with the fake backend".into(),
            })
    }

    fn save_page_range(
        &self,
        src: &Path,
        start_page: usize,
        end_page: usize,
        dest: &Path,
    ) -> Result<(), SeparatorError> {
        let pages: Vec<String> = {
            let docs = self.docs.lock();
            let doc = docs.get(src).ok_or_else(|| SeparatorError::PdfUnreadable {
                path: src.to_path_buf(),
                detail: "not registered with the fake backend".into(),
            })?;
            doc.pages[start_page - 1..end_page].to_vec()
        };

        let index = self.writes.fetch_add(1, Ordering::SeqCst) as usize;
        if self.skip_writes.lock().contains(&index) {
            // Simulate a backend bug: the file appears but carries no
            // bytes, which the output validator must catch.
            std::fs::write(dest, b"").map_err(|e| SeparatorError::FilesystemError {
                path: dest.to_path_buf(),
                source: e,
            })?;
            return Ok(());
        }

        let padded = "x".repeat(BYTES_PER_PAGE * pages.len());
        std::fs::write(dest, padded).map_err(|e| SeparatorError::FilesystemError {
            path: dest.to_path_buf(),
            source: e,
        })?;
        self.docs.lock().insert(
            dest.to_path_buf(),
            FakeDoc {
                pages,
                encrypted: false,
            },
        );
        Ok(())
    }
}

// ── Scripted provider ────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedProvider {
    boundary_script: Mutex<VecDeque<Result<Vec<BoundaryCandidate>, ProviderError>>>,
    metadata_script: Mutex<VecDeque<Result<MetadataCandidate, ProviderError>>>,
    boundary_calls: AtomicU32,
}

impl ScriptedProvider {
    fn with_boundaries(script: Vec<Result<Vec<BoundaryCandidate>, ProviderError>>) -> Self {
        Self {
            boundary_script: Mutex::new(script.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn analyze_boundaries(
        &self,
        _text: &str,
        _total_pages: usize,
    ) -> Result<Vec<BoundaryCandidate>, ProviderError> {
        self.boundary_calls.fetch_add(1, Ordering::SeqCst);
        self.boundary_script
            .lock()
            .pop_front()
            .unwrap_or(Err(ProviderError::Unavailable {
                provider: "scripted".into(),
            }))
    }

    async fn extract_metadata(
        &self,
        _text: &str,
        _start_page: usize,
        _end_page: usize,
    ) -> Result<MetadataCandidate, ProviderError> {
        self.metadata_script
            .lock()
            .pop_front()
            .unwrap_or(Err(ProviderError::Unavailable {
                provider: "scripted".into(),
            }))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            identifier: "remote",
            model: "scripted".into(),
            endpoint: "test".into(),
        }
    }
}

/// Provider used when a scenario should run purely on content detection.
struct NoProvider;

#[async_trait]
impl ModelProvider for NoProvider {
    async fn analyze_boundaries(
        &self,
        _text: &str,
        _total_pages: usize,
    ) -> Result<Vec<BoundaryCandidate>, ProviderError> {
        Err(ProviderError::Unavailable { provider: "none".into() })
    }

    async fn extract_metadata(
        &self,
        _text: &str,
        _start_page: usize,
        _end_page: usize,
    ) -> Result<MetadataCandidate, ProviderError> {
        Err(ProviderError::Unavailable { provider: "none".into() })
    }

    fn is_available(&self) -> bool {
        false
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            identifier: "none",
            model: String::new(),
            endpoint: String::new(),
        }
    }
}

// ── Recording sink ───────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink {
    uploads: Mutex<Vec<PathBuf>>,
    fail_uploads: Mutex<u32>,
}

#[async_trait]
impl DocumentSink for RecordingSink {
    async fn upload(&self, file: &Path, _metadata: &UploadMetadata) -> Result<RemoteId, SinkError> {
        let mut failures = self.fail_uploads.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(SinkError::ServerError {
                status: 503,
                message: "warming up".into(),
            });
        }
        let mut uploads = self.uploads.lock();
        uploads.push(file.to_path_buf());
        Ok(uploads.len() as RemoteId)
    }

    async fn create_tag_if_missing(&self, _name: &str) -> Result<u64, SinkError> {
        Ok(1)
    }

    async fn create_correspondent_if_missing(&self, _name: &str) -> Result<u64, SinkError> {
        Ok(1)
    }

    async fn create_document_type_if_missing(&self, _name: &str) -> Result<u64, SinkError> {
        Ok(1)
    }

    async fn resolve_storage_path(&self, _path: &str) -> Result<u64, SinkError> {
        Ok(1)
    }

    async fn apply_tags(
        &self,
        _remote_id: RemoteId,
        _tag_ids: &[u64],
        _wait_secs: u64,
    ) -> Result<(), SinkError> {
        Ok(())
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    backend: Arc<FakeBackend>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        Self {
            _dir: dir,
            root,
            backend: Arc::new(FakeBackend::default()),
        }
    }

    fn config(&self) -> Config {
        Config::builder()
            .input_dir(&self.root)
            .output_dir(self.root.join("out"))
            .quarantine_dir(self.root.join("quarantine"))
            .backoff_min(0.02)
            .build()
            .unwrap()
    }

    fn input(&self, name: &str, pages: Vec<String>) -> PathBuf {
        let path = self.root.join(name);
        self.backend.register(&path, pages);
        path
    }

    fn driver_with(
        &self,
        config: Config,
        provider: Arc<dyn ModelProvider>,
        sink: Option<Arc<dyn DocumentSink>>,
    ) -> WorkflowDriver {
        WorkflowDriver::with_components(config, self.backend.clone(), provider, sink)
    }

    fn driver(&self, provider: Arc<dyn ModelProvider>) -> WorkflowDriver {
        self.driver_with(self.config(), provider, None)
    }
}

fn candidate(start: usize, end: usize, account: Option<&str>) -> BoundaryCandidate {
    BoundaryCandidate {
        start_page: start,
        end_page: end,
        account_number: account.map(str::to_string),
        period: None,
        confidence: Some(0.9),
        reasoning: None,
    }
}

fn output_names(outcome: &RunOutcome) -> Vec<String> {
    match outcome {
        RunOutcome::Success { outputs, .. } => outputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect(),
        RunOutcome::Quarantined { category, detail, .. } => {
            panic!("expected success, got quarantine: {} ({})", category, detail)
        }
    }
}

fn statement_page(lines: &[&str]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    // Realistic pages carry transaction noise; it also keeps every page
    // above the validator's missing-content floor.
    text.push_str(&"EFTPOS PURCHASE  14 May 2015  -23.50  1,204.15\n".repeat(8));
    text
}

// ── S1: single statement, no provider ────────────────────────────────────────

#[tokio::test]
async fn s1_single_statement_defaults_to_whole_document() {
    let fx = Fixture::new();
    let pages = vec![
        statement_page(&["Account Number: 0623 1045 8901 9012"]),
        statement_page(&["transactions continue"]),
        statement_page(&["closing balance 1,204.15"]),
    ];
    let input = fx.input("single.pdf", pages);
    let driver = fx.driver(Arc::new(NoProvider));

    let report = driver.process(&input).await;

    let names = output_names(&report.outcome);
    assert_eq!(names, vec!["unknown-9012-unknown-date.pdf"]);
    assert_eq!(report.statements, 1);

    // The output exists and covers all three pages.
    let out_path = fx.root.join("out/unknown-9012-unknown-date.pdf");
    assert!(out_path.exists());
    assert_eq!(fx.backend.page_texts(&out_path).unwrap().len(), 3);
}

// ── S2: three statements via page markers, adjacency preserved ───────────────

#[tokio::test]
async fn s2_page_markers_split_into_adjacent_boundaries() {
    let fx = Fixture::new();
    // Six equal-length pages; "Page 1 of N" markers open pages 1, 3, 4.
    let pages = vec![
        statement_page(&[
            "Page 1 of 2",
            "Westpac Banking Corporation",
            "Account Number: 1111 2222 3333 4444",
            "Statement Period: 1 Apr 2015 to 30 Apr 2015",
        ]),
        statement_page(&["Page 2 of 2", "westpac transactions"]),
        statement_page(&[
            "Page 1 of 1",
            "ANZ statement",
            "Account Number: 5555 6666 7777 8888",
            "Statement Period: 1 May 2015 to 21 May 2015",
        ]),
        statement_page(&[
            "Page 1 of 3",
            "Citibank statement",
            "Account Number: 9999 0000 1111 2222",
            "Statement Period: 1 Jun 2015 to 30 Jun 2015",
        ]),
        statement_page(&["Page 2 of 3", "citibank transactions"]),
        statement_page(&["Page 3 of 3", "citibank closing balance"]),
    ];
    let input = fx.input("three.pdf", pages);
    let driver = fx.driver(Arc::new(NoProvider));

    let report = driver.process(&input).await;

    let names = output_names(&report.outcome);
    assert_eq!(
        names,
        vec![
            "westpac-4444-2015-04-30.pdf",
            "anz-8888-2015-05-21.pdf",
            "citibank-2222-2015-06-30.pdf",
        ]
    );

    // Page counts 2 + 1 + 3 account for the whole document.
    let total: usize = names
        .iter()
        .map(|n| fx.backend.page_texts(&fx.root.join("out").join(n)).unwrap().len())
        .sum();
    assert_eq!(total, 6);
}

// ── S3: overlapping same-account candidates merge ────────────────────────────

#[tokio::test]
async fn s3_same_account_overlap_merges_into_one_output() {
    let fx = Fixture::new();
    let pages: Vec<String> = (1..=7)
        .map(|i| statement_page(&[&format!("Westpac statement page {}", i)]))
        .collect();
    let input = fx.input("overlap.pdf", pages);

    let provider = Arc::new(ScriptedProvider::with_boundaries(vec![Ok(vec![
        candidate(1, 5, Some("0623 1045 8901 9012")),
        candidate(3, 7, Some("0623 1045 8901 9012")),
    ])]));
    let driver = fx.driver(provider);

    let report = driver.process(&input).await;

    let names = output_names(&report.outcome);
    assert_eq!(names.len(), 1, "merged overlap must yield a single output");
    let out = fx.root.join("out").join(&names[0]);
    assert_eq!(fx.backend.page_texts(&out).unwrap().len(), 7);
}

// ── S4: phantom statements rejected, fallback engages ────────────────────────

#[tokio::test]
async fn s4_phantom_response_is_rejected_and_default_applies() {
    let fx = Fixture::new();
    let pages: Vec<String> = (1..=3)
        .map(|i| statement_page(&[&format!("plain content page {}", i)]))
        .collect();
    let input = fx.input("phantom.pdf", pages);

    // Five claimed statements in a three-page document.
    let provider = Arc::new(ScriptedProvider::with_boundaries(vec![Ok((1..=5)
        .map(|i| candidate(i.min(3), 3, None))
        .collect())]));
    let calls = Arc::clone(&provider);
    let driver = fx.driver(provider);

    let report = driver.process(&input).await;

    assert_eq!(calls.boundary_calls.load(Ordering::SeqCst), 1);
    let names = output_names(&report.outcome);
    assert_eq!(names.len(), 1);
    let out = fx.root.join("out").join(&names[0]);
    assert_eq!(fx.backend.page_texts(&out).unwrap().len(), 3);
}

// ── S5: transient rate limiting is retried to success ────────────────────────

#[tokio::test]
async fn s5_rate_limited_provider_succeeds_on_third_attempt() {
    let fx = Fixture::new();
    let pages: Vec<String> = (1..=4)
        .map(|i| statement_page(&[&format!("statement content page {}", i)]))
        .collect();
    let input = fx.input("retry.pdf", pages);

    let provider = Arc::new(ScriptedProvider::with_boundaries(vec![
        Err(ProviderError::RateLimited { detail: "429".into() }),
        Err(ProviderError::RateLimited { detail: "429".into() }),
        Ok(vec![candidate(1, 2, None), candidate(3, 4, None)]),
    ]));
    let calls = Arc::clone(&provider);
    let driver = fx.driver(provider);

    let start = Instant::now();
    let report = driver.process(&input).await;
    let elapsed = start.elapsed();

    assert_eq!(calls.boundary_calls.load(Ordering::SeqCst), 3);
    // Two backoff sleeps at base 0.02 s with minimum jitter 0.1 each.
    assert!(elapsed.as_secs_f64() >= 0.02 * 0.1);
    assert_eq!(output_names(&report.outcome).len(), 2);
}

// ── S6: validation failure quarantines with a report ─────────────────────────

#[tokio::test]
async fn s6_missing_output_quarantines_at_validate() {
    let fx = Fixture::new();
    let pages = vec![
        statement_page(&["Page 1 of 1", "Account Number: 1111 2222 3333 4444"]),
        statement_page(&["Page 1 of 1", "Account Number: 5555 6666 7777 8888"]),
    ];
    // Two one-page statements; skip the second write to fake a generator bug.
    fx.backend.skip_writes.lock().push(1);
    let input = fx.input("broken.pdf", pages);
    let driver = fx.driver(Arc::new(NoProvider));

    let report = driver.process(&input).await;

    match &report.outcome {
        RunOutcome::Quarantined { stage, category, quarantine_path, .. } => {
            assert_eq!(*stage, "validate");
            assert_eq!(category, "ValidationFailed");
            let moved = quarantine_path.as_ref().expect("input moved to quarantine");
            assert!(moved.exists());
            assert!(!input.exists());
        }
        other => panic!("expected quarantine, got {:?}", other),
    }

    // The sibling JSON report names the failing stage.
    let reports_dir = fx.root.join("quarantine/reports");
    let report_files: Vec<_> = std::fs::read_dir(&reports_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(report_files.len(), 1);
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_files[0]).unwrap()).unwrap();
    assert_eq!(parsed["stage_at_failure"], "validate");
    assert_eq!(parsed["reason_category"], "ValidationFailed");
    assert!(parsed["recovery_hints"].as_array().is_some());
}

// ── Fragments: low-confidence boundaries are excluded from generation ────────

#[tokio::test]
async fn fragments_are_filtered_and_page_sum_adjusts() {
    let fx = Fixture::new();
    let pages: Vec<String> = (1..=4)
        .map(|i| statement_page(&[&format!("statement content page {}", i)]))
        .collect();
    let input = fx.input("fragment.pdf", pages);

    let provider = Arc::new(ScriptedProvider::with_boundaries(vec![Ok(vec![
        BoundaryCandidate {
            confidence: Some(0.9),
            ..candidate(1, 3, None)
        },
        BoundaryCandidate {
            confidence: Some(0.1),
            ..candidate(4, 4, None)
        },
    ])]));
    let driver = fx.driver(provider);

    let report = driver.process(&input).await;

    // Only the confident boundary generates; validation passes because
    // the fragment's page is excluded from the expected sum.
    assert_eq!(output_names(&report.outcome).len(), 1);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("fragment filtered")));
}

// ── Ingestion failures ───────────────────────────────────────────────────────

#[tokio::test]
async fn encrypted_inputs_quarantine_at_ingest() {
    let fx = Fixture::new();
    let path = fx.root.join("locked.pdf");
    fx.backend
        .register_with(&path, vec![statement_page(&["secret"])], true);
    let driver = fx.driver(Arc::new(NoProvider));

    let report = driver.process(&path).await;

    match &report.outcome {
        RunOutcome::Quarantined { stage, category, .. } => {
            assert_eq!(*stage, "ingest");
            assert_eq!(category, "Encrypted");
        }
        other => panic!("expected quarantine, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_and_misnamed_inputs_fail_fast() {
    let fx = Fixture::new();
    let driver = fx.driver(Arc::new(NoProvider));

    let report = driver.process(&fx.root.join("absent.pdf")).await;
    match &report.outcome {
        RunOutcome::Quarantined { category, .. } => assert_eq!(category, "FileMissing"),
        other => panic!("expected quarantine, got {:?}", other),
    }

    let txt = fx.root.join("notes.txt");
    std::fs::write(&txt, b"hello").unwrap();
    let report = driver.process(&txt).await;
    match &report.outcome {
        RunOutcome::Quarantined { category, .. } => assert_eq!(category, "ExtensionDisallowed"),
        other => panic!("expected quarantine, got {:?}", other),
    }
}

// ── Determinism: provider-free runs are byte-identical ───────────────────────

#[tokio::test]
async fn deterministic_fallback_names_are_stable_across_runs() {
    let pages = vec![
        statement_page(&[
            "Page 1 of 1",
            "Westpac Banking Corporation",
            "Account Number: 1111 2222 3333 4444",
            "Statement Period: 1 Apr 2015 to 30 Apr 2015",
        ]),
        statement_page(&[
            "Page 1 of 1",
            "ANZ statement",
            "Account Number: 5555 6666 7777 8888",
            "Statement Period: 1 May 2015 to 21 May 2015",
        ]),
    ];

    let mut runs = Vec::new();
    for _ in 0..2 {
        let fx = Fixture::new();
        let input = fx.input("same.pdf", pages.clone());
        let driver = fx.driver(Arc::new(NoProvider));
        let report = driver.process(&input).await;
        runs.push(output_names(&report.outcome));
    }
    assert_eq!(runs[0], runs[1]);
}

// ── Collisions: identical metadata gets numeric suffixes ─────────────────────

#[tokio::test]
async fn colliding_names_get_numeric_suffixes() {
    let fx = Fixture::new();
    // Two statements with identical (sentinel) metadata.
    let pages = vec![
        statement_page(&["Page 1 of 1", "first statement"]),
        statement_page(&["Page 1 of 1", "second statement"]),
    ];
    let input = fx.input("twins.pdf", pages);
    let driver = fx.driver(Arc::new(NoProvider));

    let report = driver.process(&input).await;
    let names = output_names(&report.outcome);
    assert_eq!(
        names,
        vec![
            "unknown-0000-unknown-date.pdf",
            "unknown-0000-unknown-date-2.pdf",
        ]
    );
}

// ── Dry run: nothing written, plan reported ──────────────────────────────────

#[tokio::test]
async fn dry_run_writes_nothing() {
    let fx = Fixture::new();
    let pages = vec![statement_page(&["Account Number: 0623 1045 8901 9012"])];
    let input = fx.input("dry.pdf", pages);
    let driver = fx.driver(Arc::new(NoProvider));

    let report = driver.process_opts(&input, true, None).await;

    match &report.outcome {
        RunOutcome::Success { outputs, dry_run } => {
            assert!(dry_run);
            assert_eq!(outputs.len(), 1);
            assert!(!outputs[0].exists(), "dry run must not write outputs");
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert!(!fx.root.join("out").exists());
    assert!(input.exists(), "dry run must leave the input untouched");
}

// ── Sink: delivery after a transient failure, outage stays local ─────────────

#[tokio::test]
async fn sink_transient_failure_is_retried_at_stage_level() {
    let fx = Fixture::new();
    let pages = vec![statement_page(&["Account Number: 0623 1045 8901 9012"])];
    let input = fx.input("sinkretry.pdf", pages);

    let sink = Arc::new(RecordingSink::default());
    *sink.fail_uploads.lock() = 1;
    let driver = fx.driver_with(fx.config(), Arc::new(NoProvider), Some(sink.clone()));

    let report = driver.process(&input).await;

    assert!(report.is_success());
    assert_eq!(sink.uploads.lock().len(), 1);
}

#[tokio::test]
async fn processed_inputs_move_aside_on_success() {
    let fx = Fixture::new();
    let config = Config::builder()
        .input_dir(&fx.root)
        .output_dir(fx.root.join("out"))
        .quarantine_dir(fx.root.join("quarantine"))
        .processed_input_dir(fx.root.join("processed"))
        .build()
        .unwrap();
    let pages = vec![statement_page(&["Account Number: 0623 1045 8901 9012"])];
    let input = fx.input("done.pdf", pages);
    let driver = fx.driver_with(config, Arc::new(NoProvider), None);

    let report = driver.process(&input).await;

    assert!(report.is_success());
    assert!(!input.exists());
    assert!(fx.root.join("processed/done.pdf").exists());
}

// ── Strict mode: provider exhaustion becomes fatal ───────────────────────────

#[tokio::test]
async fn strict_mode_quarantines_on_provider_exhaustion() {
    let fx = Fixture::new();
    let config = Config::builder()
        .input_dir(&fx.root)
        .output_dir(fx.root.join("out"))
        .quarantine_dir(fx.root.join("quarantine"))
        .strictness(Strictness::Strict)
        .backoff_min(0.01)
        .max_attempts(2)
        .stage_retries(0)
        .build()
        .unwrap();
    let pages = vec![statement_page(&["Account Number: 0623 1045 8901 9012"])];
    let input = fx.input("strict.pdf", pages);

    let provider = Arc::new(ScriptedProvider::with_boundaries(vec![
        Err(ProviderError::RateLimited { detail: "429".into() }),
        Err(ProviderError::RateLimited { detail: "429".into() }),
    ]));
    let driver = fx.driver_with(config, provider, None);

    let report = driver.process(&input).await;

    match &report.outcome {
        RunOutcome::Quarantined { stage, category, .. } => {
            assert_eq!(*stage, "detect");
            assert_eq!(category, "ProviderExhausted");
        }
        other => panic!("expected quarantine, got {:?}", other),
    }
}

// ── Non-strict mode: exhaustion falls back to content detection ──────────────

#[tokio::test]
async fn normal_mode_falls_back_when_provider_is_exhausted() {
    let fx = Fixture::new();
    let config = Config::builder()
        .input_dir(&fx.root)
        .output_dir(fx.root.join("out"))
        .quarantine_dir(fx.root.join("quarantine"))
        .backoff_min(0.01)
        .max_attempts(2)
        .build()
        .unwrap();
    let pages = vec![
        statement_page(&["Page 1 of 1", "Account Number: 1111 2222 3333 4444"]),
        statement_page(&["Page 1 of 1", "Account Number: 5555 6666 7777 8888"]),
    ];
    let input = fx.input("fallback.pdf", pages);

    let provider = Arc::new(ScriptedProvider::with_boundaries(vec![
        Err(ProviderError::RateLimited { detail: "429".into() }),
        Err(ProviderError::RateLimited { detail: "429".into() }),
    ]));
    let driver = fx.driver_with(config, provider, None);

    let report = driver.process(&input).await;

    // Content detection still splits the document into two statements.
    assert_eq!(output_names(&report.outcome).len(), 2);
}

// ── Config validation: remote provider requires credentials ──────────────────

#[test]
fn invalid_config_is_rejected_at_startup() {
    let err = Config::builder()
        .provider_kind(ProviderKind::Remote)
        .build()
        .unwrap_err();
    assert_eq!(err.category(), "InvalidConfig");
}
