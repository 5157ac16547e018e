//! Workflow driver: eight stages, two terminals, one owner.
//!
//! The driver walks a [`WorkflowState`] through
//! `ingest → analyze → detect → extract → generate → organize → validate
//! → sink`, advancing linearly on success. Failures carry a tag the
//! driver switches on: transient failures re-enter the same stage until
//! `retries_remaining` runs out (then reclassify as fatal), fatal
//! failures quarantine the input with a structured report.
//!
//! The driver owns the state exclusively for the whole run. Stages are
//! plain `async fn`s over `&mut WorkflowState` — no callbacks, no events,
//! no partially-applied stages. What each stage reads and writes is
//! documented on the state fields themselves.

pub mod state;

pub use state::{RecordedError, SinkResult, Stage, WorkflowState};

use crate::analysis;
use crate::config::Config;
use crate::detect::{DetectionCache, DetectionEngine};
use crate::document;
use crate::error::SeparatorError;
use crate::extract::MetadataExtractor;
use crate::naming;
use crate::output_check::{self, GeneratedOutput};
use crate::pdf::{self, LopdfBackend, PdfBackend};
use crate::provider::{self, ModelProvider};
use crate::quarantine;
use crate::resilience::{BackoffPolicy, RateLimiter};
use crate::sink::{self, DocumentSink, RemoteId};
use crate::statement::Boundary;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a document run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Success {
        outputs: Vec<PathBuf>,
        dry_run: bool,
    },
    Quarantined {
        stage: &'static str,
        category: String,
        detail: String,
        quarantine_path: Option<PathBuf>,
    },
}

/// Result of one document run, returned to the batch driver and the CLI.
#[derive(Debug)]
pub struct RunReport {
    pub input_path: PathBuf,
    pub outcome: RunOutcome,
    pub warnings: Vec<String>,
    pub statements: usize,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Success { .. })
    }
}

/// Stage failures, tagged for the driver's retry-or-quarantine switch.
enum StageFailure {
    /// Worth re-entering the stage: network trouble, sink 5xx,
    /// rate-limit exhaustion.
    Transient(SeparatorError),
    /// Quarantine now.
    Fatal(SeparatorError),
}

/// The workflow driver. One instance serves many documents; all
/// per-document state lives in the [`WorkflowState`] each run owns.
pub struct WorkflowDriver {
    config: Arc<Config>,
    backend: Arc<dyn PdfBackend>,
    provider: Arc<dyn ModelProvider>,
    limiter: Arc<RateLimiter>,
    engine: DetectionEngine,
    extractor: MetadataExtractor,
    sink: Option<Arc<dyn DocumentSink>>,
}

impl WorkflowDriver {
    /// Build a driver with the production backend and the provider named
    /// by the config.
    pub fn new(config: Config) -> Self {
        let backend: Arc<dyn PdfBackend> = Arc::new(LopdfBackend::new());
        let provider = provider::from_config(&config);
        Self::with_components(config, backend, provider, None)
    }

    /// Build a driver from explicit components. This is the seam the test
    /// suite uses: synthetic backends, scripted providers, recording
    /// sinks.
    pub fn with_components(
        config: Config,
        backend: Arc<dyn PdfBackend>,
        provider: Arc<dyn ModelProvider>,
        sink: Option<Arc<dyn DocumentSink>>,
    ) -> Self {
        let config = Arc::new(config);
        let limiter = Arc::new(RateLimiter::new(
            config.requests_per_minute,
            config.burst_limit,
        ));
        let cache = Arc::new(DetectionCache::default());
        let engine = DetectionEngine::new(
            Arc::clone(&provider),
            Arc::clone(&limiter),
            &config,
            Some(cache),
        );
        let extractor = MetadataExtractor::new(
            Arc::clone(&provider),
            Arc::clone(&limiter),
            BackoffPolicy {
                base_secs: config.backoff_min,
                max_secs: config.backoff_max,
                multiplier: config.backoff_multiplier,
                max_attempts: config.max_attempts,
            },
            config.text_analysis_char_cap,
        );
        Self {
            config,
            backend,
            provider,
            limiter,
            engine,
            extractor,
            sink,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Process one document end to end.
    pub async fn process(&self, input: &Path) -> RunReport {
        self.process_opts(input, false, None).await
    }

    /// Process one document, optionally as a dry run (stops short of
    /// writing anything) and optionally tied to a sink-side origin
    /// document that receives error tags on quarantine.
    pub async fn process_opts(
        &self,
        input: &Path,
        dry_run: bool,
        origin: Option<RemoteId>,
    ) -> RunReport {
        let mut state = WorkflowState::new(
            input.to_path_buf(),
            self.config.output_dir.clone(),
            self.config.quarantine_dir.clone(),
            self.config.stage_retries,
        );
        let sink_enabled = self.sink.is_some() && !dry_run;
        info!("processing {} (dry_run={})", input.display(), dry_run);

        while !state.stage.is_terminal() {
            match self.run_stage(&mut state, dry_run).await {
                Ok(()) => {
                    debug!("stage {} complete", state.stage.name());
                    state.stage = state.stage.next(sink_enabled);
                }
                Err(StageFailure::Transient(err)) if state.retries_remaining > 0 => {
                    state.retries_remaining -= 1;
                    warn!(
                        "stage {} failed transiently ({}); {} retries left",
                        state.stage.name(),
                        err,
                        state.retries_remaining
                    );
                    state.record_error(state.stage, err.category(), err.to_string());
                }
                Err(StageFailure::Transient(err)) | Err(StageFailure::Fatal(err)) => {
                    return self.quarantine(state, err, dry_run, origin).await;
                }
            }
        }

        self.finish_success(state, dry_run, origin).await
    }

    async fn run_stage(
        &self,
        state: &mut WorkflowState,
        dry_run: bool,
    ) -> Result<(), StageFailure> {
        match state.stage {
            Stage::Ingest => self.stage_ingest(state).await,
            Stage::Analyze => self.stage_analyze(state).await,
            Stage::Detect => self.stage_detect(state).await,
            Stage::Extract => self.stage_extract(state).await,
            Stage::Generate => self.stage_generate(state, dry_run).await,
            Stage::Organize => self.stage_organize(state, dry_run),
            Stage::Validate => self.stage_validate(state, dry_run).await,
            Stage::Sink => self.stage_sink(state).await,
            Stage::Success | Stage::Quarantine => Ok(()),
        }
    }

    // ── Stages ────────────────────────────────────────────────────────────

    async fn stage_ingest(&self, state: &mut WorkflowState) -> Result<(), StageFailure> {
        let (document, warnings) = document::ingest(&self.backend, &state.input_path, &self.config)
            .await
            .map_err(StageFailure::Fatal)?;
        state.warnings.extend(warnings);
        state.document = Some(document);
        Ok(())
    }

    /// Never fails: with no provider the analysis text stays empty and
    /// detection runs purely on content.
    async fn stage_analyze(&self, state: &mut WorkflowState) -> Result<(), StageFailure> {
        if self.provider.is_available() {
            let document = state.document.as_ref().expect("ingest ran");
            state.analysis_text = analysis::prepare_analysis_text(
                &document.page_texts,
                self.config.text_analysis_char_cap,
            );
            state.provider_identity = Some(self.provider.info());
            debug!(
                "analysis text prepared: {} chars for provider '{}'",
                state.analysis_text.len(),
                self.provider.info().identifier
            );
        }
        Ok(())
    }

    async fn stage_detect(&self, state: &mut WorkflowState) -> Result<(), StageFailure> {
        let document = state.document.as_ref().expect("ingest ran");
        let set = self
            .engine
            .detect(document, &state.analysis_text)
            .await
            // Only strict-mode provider exhaustion lands here; worth a
            // stage retry before giving up.
            .map_err(StageFailure::Transient)?;

        for boundary in &set.boundaries {
            if boundary.page_count() > self.config.max_pages_per_statement {
                state.warnings.push(format!(
                    "boundary {}..{} spans {} pages (limit {})",
                    boundary.start_page,
                    boundary.end_page,
                    boundary.page_count(),
                    self.config.max_pages_per_statement
                ));
            } else if boundary.page_count() < self.config.min_pages_per_statement {
                state.warnings.push(format!(
                    "boundary {}..{} spans {} pages (minimum {})",
                    boundary.start_page,
                    boundary.end_page,
                    boundary.page_count(),
                    self.config.min_pages_per_statement
                ));
            }
        }

        info!(
            "detected {} statement(s) via {:?}",
            set.len(),
            set.detection_method
        );
        state.boundaries = Some(set);
        Ok(())
    }

    async fn stage_extract(&self, state: &mut WorkflowState) -> Result<(), StageFailure> {
        let document = state.document.as_ref().expect("ingest ran").clone();
        let set = state.boundaries.as_ref().expect("detect ran").clone();

        let (accepted, fragments) = partition_fragments(
            set.boundaries,
            self.config.fragment_confidence_threshold,
            self.config.enable_fragment_filtering,
        );
        for fragment in &fragments {
            state.warnings.push(format!(
                "fragment filtered: pages {}..{} (confidence {:.2})",
                fragment.start_page, fragment.end_page, fragment.confidence
            ));
        }

        let fragment_pages: usize = fragments.iter().map(Boundary::page_count).sum();
        state.expected_pages =
            output_check::expected_page_budget(document.total_pages, fragment_pages);

        let mut metadata = Vec::with_capacity(accepted.len());
        for boundary in &accepted {
            metadata.push(self.extractor.extract(&document, boundary).await);
        }
        for (boundary, meta) in accepted.iter().zip(&metadata) {
            if meta.is_all_sentinel() {
                state.warnings.push(format!(
                    "no metadata extracted for pages {}..{}",
                    boundary.start_page, boundary.end_page
                ));
            }
        }

        state.accepted = accepted;
        state.fragments = fragments;
        state.per_boundary_metadata = metadata;
        Ok(())
    }

    async fn stage_generate(
        &self,
        state: &mut WorkflowState,
        dry_run: bool,
    ) -> Result<(), StageFailure> {
        let document = state.document.as_ref().expect("ingest ran");
        let input_stem = state
            .input_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());

        if !dry_run {
            std::fs::create_dir_all(&state.output_dir).map_err(|e| {
                StageFailure::Fatal(SeparatorError::FilesystemError {
                    path: state.output_dir.clone(),
                    source: e,
                })
            })?;
        }

        for (i, boundary) in state.accepted.iter().enumerate() {
            let part_path = state
                .output_dir
                .join(format!("{}.part{}.pdf", input_stem, i + 1));
            if !dry_run {
                pdf::save_page_range(
                    &self.backend,
                    &document.path,
                    boundary.start_page,
                    boundary.end_page,
                    &part_path,
                )
                .await
                .map_err(StageFailure::Fatal)?;
            }
            state.generated_files.push(GeneratedOutput {
                boundary: boundary.clone(),
                path: part_path,
            });
        }

        info!(
            "generated {} file(s){}",
            state.generated_files.len(),
            if dry_run { " (dry run, not written)" } else { "" }
        );
        Ok(())
    }

    fn stage_organize(&self, state: &mut WorkflowState, dry_run: bool) -> Result<(), StageFailure> {
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        for (i, output) in state.generated_files.iter_mut().enumerate() {
            let metadata = &state.per_boundary_metadata[i];
            let name = naming::enforce_length(
                &naming::canonical_filename(metadata),
                self.config.max_filename_length,
            );

            let dest = if dry_run {
                // Nothing exists on disk yet; avoid planning two outputs
                // onto the same name.
                let mut candidate = state.output_dir.join(&name);
                let stem = name.strip_suffix(".pdf").unwrap_or(&name).to_string();
                let mut n = 2;
                while claimed.contains(&candidate) {
                    candidate = state.output_dir.join(format!("{}-{}.pdf", stem, n));
                    n += 1;
                }
                candidate
            } else {
                naming::collision_free_path(&state.output_dir, &name)
            };

            if !dry_run {
                std::fs::rename(&output.path, &dest).map_err(|e| {
                    StageFailure::Fatal(SeparatorError::FilesystemError {
                        path: dest.clone(),
                        source: e,
                    })
                })?;
            }
            debug!("organized {} → {}", output.path.display(), dest.display());
            claimed.insert(dest.clone());
            output.path = dest;
        }
        Ok(())
    }

    async fn stage_validate(
        &self,
        state: &mut WorkflowState,
        dry_run: bool,
    ) -> Result<(), StageFailure> {
        if dry_run {
            state
                .validation_results
                .push("dry run: validation skipped".to_string());
            return Ok(());
        }

        let document = state.document.as_ref().expect("ingest ran");
        let passed = output_check::validate_outputs(
            &self.backend,
            document,
            &state.generated_files,
            state.expected_pages,
        )
        .await
        .map_err(StageFailure::Fatal)?;
        state.validation_results = passed;
        Ok(())
    }

    async fn stage_sink(&self, state: &mut WorkflowState) -> Result<(), StageFailure> {
        let sink = self.sink.as_ref().expect("sink stage requires a sink");
        let delivered: HashSet<PathBuf> = state
            .sink_results
            .iter()
            .filter(|r| r.outcome.is_ok())
            .map(|r| r.path.clone())
            .collect();

        for (output, metadata) in state
            .generated_files
            .iter()
            .zip(&state.per_boundary_metadata)
        {
            if delivered.contains(&output.path) {
                continue;
            }

            let result = sink::deliver(
                sink,
                &output.path,
                metadata,
                &self.config.sink_tags,
                self.config.sink_correspondent.as_deref(),
                self.config.sink_tag_wait_secs,
            )
            .await;

            match result {
                Ok(remote_id) => {
                    state.sink_results.push(SinkResult {
                        path: output.path.clone(),
                        outcome: Ok(remote_id),
                    });
                }
                Err(e) if e.is_transient() => {
                    // Re-enter the stage; already-delivered files are
                    // skipped on the next pass.
                    return Err(StageFailure::Transient(SeparatorError::SinkExhausted {
                        attempts: 1,
                        last_error: e.to_string(),
                    }));
                }
                Err(sink::SinkError::Outage { detail }) => {
                    if self.config.sink_mandatory {
                        return Err(StageFailure::Fatal(SeparatorError::SinkExhausted {
                            attempts: 1,
                            last_error: detail,
                        }));
                    }
                    warn!("sink outage ({}); run remains successful locally", detail);
                    state
                        .warnings
                        .push(format!("sink outage: {}; outputs kept locally", detail));
                    return Ok(());
                }
                Err(e) => {
                    // Individual-document rejection: record and move on.
                    warn!("sink rejected {}: {}", output.path.display(), e);
                    state.sink_results.push(SinkResult {
                        path: output.path.clone(),
                        outcome: Err(e.to_string()),
                    });
                }
            }
        }
        Ok(())
    }

    // ── Terminals ─────────────────────────────────────────────────────────

    async fn finish_success(
        &self,
        mut state: WorkflowState,
        dry_run: bool,
        origin: Option<RemoteId>,
    ) -> RunReport {
        if !dry_run {
            if let Some(processed_dir) = &self.config.processed_input_dir {
                if let Err(e) = move_to_processed(&state.input_path, processed_dir) {
                    warn!("could not move processed input: {}", e);
                    state
                        .warnings
                        .push(format!("processed-input move failed: {}", e));
                }
            }

            if let (Some(sink), Some(origin_id)) = (&self.sink, origin) {
                self.tag_origin(sink, origin_id, &self.config.sink_tags).await;
            }
        }

        state.stage = Stage::Success;
        info!(
            "{}: success with {} statement(s)",
            state.input_path.display(),
            state.generated_files.len()
        );
        RunReport {
            input_path: state.input_path.clone(),
            statements: state.generated_files.len(),
            warnings: state.warnings.clone(),
            outcome: RunOutcome::Success {
                outputs: state.output_paths(),
                dry_run,
            },
        }
    }

    async fn quarantine(
        &self,
        mut state: WorkflowState,
        error: SeparatorError,
        dry_run: bool,
        origin: Option<RemoteId>,
    ) -> RunReport {
        let stage = state.stage;
        state.record_error(stage, error.category(), error.to_string());

        let quarantine_path = if dry_run {
            None
        } else {
            match quarantine::quarantine_document(&state.input_path, stage.name(), &error, &self.config)
            {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("quarantine move itself failed: {}", e);
                    None
                }
            }
        };

        if !dry_run && error.severity() >= self.config.sink_error_min_severity {
            if let (Some(sink), Some(origin_id)) = (&self.sink, origin) {
                self.tag_origin(sink, origin_id, &self.config.sink_error_tags).await;
            }
        }

        state.stage = Stage::Quarantine;
        RunReport {
            input_path: state.input_path.clone(),
            statements: 0,
            warnings: state.warnings.clone(),
            outcome: RunOutcome::Quarantined {
                stage: stage.name(),
                category: error.category().to_string(),
                detail: error.to_string(),
                quarantine_path,
            },
        }
    }

    /// Best-effort tagging of the sink-side origin document; failures are
    /// logged, never escalated.
    async fn tag_origin(&self, sink: &Arc<dyn DocumentSink>, origin: RemoteId, tags: &[String]) {
        let mut tag_ids = Vec::with_capacity(tags.len());
        for tag in tags {
            match sink.create_tag_if_missing(tag).await {
                Ok(id) => tag_ids.push(id),
                Err(e) => {
                    warn!("could not ensure tag '{}': {}", tag, e);
                    return;
                }
            }
        }
        if let Err(e) = sink
            .apply_tags(origin, &tag_ids, self.config.sink_tag_wait_secs)
            .await
        {
            warn!("could not tag origin document {}: {}", origin, e);
        }
    }
}

/// Split boundaries into accepted statements and filtered fragments.
fn partition_fragments(
    boundaries: Vec<Boundary>,
    threshold: f64,
    enabled: bool,
) -> (Vec<Boundary>, Vec<Boundary>) {
    if !enabled {
        return (boundaries, Vec::new());
    }
    boundaries
        .into_iter()
        .partition(|b| b.confidence >= threshold)
}

fn move_to_processed(input: &Path, processed_dir: &Path) -> Result<(), SeparatorError> {
    std::fs::create_dir_all(processed_dir).map_err(|e| SeparatorError::FilesystemError {
        path: processed_dir.to_path_buf(),
        source: e,
    })?;
    let dest = processed_dir.join(
        input
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "input.pdf".into()),
    );
    quarantine::move_file(input, &dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::DetectionSource;

    fn boundary(confidence: f64) -> Boundary {
        let mut b = Boundary::new(1, 2, DetectionSource::Content);
        b.confidence = confidence;
        b
    }

    #[test]
    fn fragment_partition_respects_threshold() {
        let (accepted, fragments) =
            partition_fragments(vec![boundary(0.9), boundary(0.1)], 0.3, true);
        assert_eq!(accepted.len(), 1);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].confidence, 0.1);
    }

    #[test]
    fn fragment_partition_can_be_disabled() {
        let (accepted, fragments) =
            partition_fragments(vec![boundary(0.9), boundary(0.1)], 0.3, false);
        assert_eq!(accepted.len(), 2);
        assert!(fragments.is_empty());
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let (accepted, fragments) = partition_fragments(vec![boundary(0.3)], 0.3, true);
        assert_eq!(accepted.len(), 1);
        assert!(fragments.is_empty());
    }
}
