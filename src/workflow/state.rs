//! Workflow state: the full mutable record for one document run.
//!
//! [`WorkflowState`] is owned exclusively by the driver for the lifetime
//! of a run; stages mutate only the fields they produce. [`Stage`] is the
//! explicit state machine — linear advance on success, `Quarantine`
//! reachable from anywhere on a fatal error, `sink` skipped entirely when
//! no sink is configured.

use crate::document::Document;
use crate::output_check::GeneratedOutput;
use crate::provider::ProviderInfo;
use crate::statement::{Boundary, BoundarySet, StatementMetadata};
use serde::Serialize;
use std::path::PathBuf;

/// The ten workflow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ingest,
    Analyze,
    Detect,
    Extract,
    Generate,
    Organize,
    Validate,
    Sink,
    Success,
    Quarantine,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Analyze => "analyze",
            Stage::Detect => "detect",
            Stage::Extract => "extract",
            Stage::Generate => "generate",
            Stage::Organize => "organize",
            Stage::Validate => "validate",
            Stage::Sink => "sink",
            Stage::Success => "success",
            Stage::Quarantine => "quarantine",
        }
    }

    /// Linear advance on success. `validate` jumps straight to `success`
    /// when no sink is configured.
    pub fn next(&self, sink_enabled: bool) -> Stage {
        match self {
            Stage::Ingest => Stage::Analyze,
            Stage::Analyze => Stage::Detect,
            Stage::Detect => Stage::Extract,
            Stage::Extract => Stage::Generate,
            Stage::Generate => Stage::Organize,
            Stage::Organize => Stage::Validate,
            Stage::Validate => {
                if sink_enabled {
                    Stage::Sink
                } else {
                    Stage::Success
                }
            }
            Stage::Sink => Stage::Success,
            Stage::Success => Stage::Success,
            Stage::Quarantine => Stage::Quarantine,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Success | Stage::Quarantine)
    }
}

/// A structured error recorded on the state as stages fail.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedError {
    pub stage: &'static str,
    pub category: String,
    pub detail: String,
}

/// Outcome of delivering one output to the sink.
#[derive(Debug, Clone)]
pub struct SinkResult {
    pub path: PathBuf,
    pub outcome: Result<u64, String>,
}

/// The full mutable record for one document run.
#[derive(Debug)]
pub struct WorkflowState {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    pub stage: Stage,

    /// Populated by `ingest`.
    pub document: Option<Document>,

    /// Populated by `analyze`; empty when no provider is configured.
    pub analysis_text: String,
    pub provider_identity: Option<ProviderInfo>,

    /// Populated by `detect`.
    pub boundaries: Option<BoundarySet>,

    /// Boundaries accepted for generation and their filtered-fragment
    /// complement; populated by `extract`.
    pub accepted: Vec<Boundary>,
    pub fragments: Vec<Boundary>,
    /// Page budget for validation, precomputed before generation.
    pub expected_pages: usize,

    /// One metadata record per accepted boundary; populated by `extract`.
    pub per_boundary_metadata: Vec<StatementMetadata>,

    /// Populated by `generate`, renamed in place by `organize`.
    pub generated_files: Vec<GeneratedOutput>,

    /// Populated by `validate`.
    pub validation_results: Vec<String>,

    /// Populated by `sink`.
    pub sink_results: Vec<SinkResult>,

    pub errors: Vec<RecordedError>,
    pub warnings: Vec<String>,
    pub retries_remaining: u32,
}

impl WorkflowState {
    pub fn new(
        input_path: PathBuf,
        output_dir: PathBuf,
        quarantine_dir: PathBuf,
        retries: u32,
    ) -> Self {
        Self {
            input_path,
            output_dir,
            quarantine_dir,
            stage: Stage::Ingest,
            document: None,
            analysis_text: String::new(),
            provider_identity: None,
            boundaries: None,
            accepted: Vec::new(),
            fragments: Vec::new(),
            expected_pages: 0,
            per_boundary_metadata: Vec::new(),
            generated_files: Vec::new(),
            validation_results: Vec::new(),
            sink_results: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            retries_remaining: retries,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.document.as_ref().map(|d| d.total_pages).unwrap_or(0)
    }

    pub fn fingerprint(&self) -> &str {
        self.document
            .as_ref()
            .map(|d| d.fingerprint.as_str())
            .unwrap_or("")
    }

    pub fn record_error(&mut self, stage: Stage, category: &str, detail: String) {
        self.errors.push(RecordedError {
            stage: stage.name(),
            category: category.to_string(),
            detail,
        });
    }

    /// Paths of the organized outputs.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.generated_files.iter().map(|g| g.path.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_linearly() {
        let order = [
            Stage::Ingest,
            Stage::Analyze,
            Stage::Detect,
            Stage::Extract,
            Stage::Generate,
            Stage::Organize,
            Stage::Validate,
        ];
        for w in order.windows(2) {
            assert_eq!(w[0].next(true), w[1]);
        }
    }

    #[test]
    fn validate_skips_sink_when_disabled() {
        assert_eq!(Stage::Validate.next(false), Stage::Success);
        assert_eq!(Stage::Validate.next(true), Stage::Sink);
        assert_eq!(Stage::Sink.next(true), Stage::Success);
    }

    #[test]
    fn terminal_stages_absorb() {
        assert!(Stage::Success.is_terminal());
        assert!(Stage::Quarantine.is_terminal());
        assert_eq!(Stage::Success.next(true), Stage::Success);
        assert!(!Stage::Validate.is_terminal());
    }
}
