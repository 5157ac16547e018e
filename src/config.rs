//! Configuration types for statement separation.
//!
//! All behaviour is controlled through one flat [`Config`], built via its
//! [`ConfigBuilder`]. Keeping every knob in one struct makes it trivial to
//! share configs across workers, serialise them for logging, and snapshot
//! the relevant subset into quarantine reports.
//!
//! # Design choice: builder over constructor
//! A thirty-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::SeparatorError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which model provider backs boundary analysis and metadata extraction.
///
/// A single process-wide choice; there is no implicit multiplexing between
/// providers. `None` disables model assistance entirely and the engine runs
/// on the deterministic detectors alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Remote hosted model behind an OpenAI-compatible chat endpoint.
    Remote,
    /// Locally hosted model behind an Ollama-style endpoint.
    Local,
    /// No model; deterministic detection only. (default)
    #[default]
    None,
}

/// How hard ingestion validation pushes back on marginal inputs.
///
/// `Lenient` degrades low-text-content and age-exceeded findings to
/// warnings; `Strict` promotes them to fatal errors. `Normal` sits between:
/// warnings, plus a strict provider requirement when one is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Strict,
    #[default]
    Normal,
    Lenient,
}

/// Failure severity levels for sink error tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    #[default]
    High,
    Critical,
}

/// Complete configuration for a separation run.
///
/// Built via [`Config::builder()`] or [`Config::default()`].
///
/// # Example
/// ```rust
/// use statement_separator::Config;
///
/// let config = Config::builder()
///     .output_dir("./out")
///     .requests_per_minute(30)
///     .workers(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ── Provider ──────────────────────────────────────────────────────────
    /// Which provider kind backs model-assisted analysis. Default: `None`.
    pub provider_kind: ProviderKind,
    /// Model identifier passed to the provider (e.g. "gpt-4.1-nano", "llama3.1").
    pub model_name: Option<String>,
    /// Provider endpoint base URL. Defaults per kind when unset.
    pub endpoint: Option<String>,
    /// API key for the remote provider. Never serialized or logged.
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    /// Per-call provider timeout in seconds. Default: 30.
    pub provider_timeout_secs: u64,

    // ── Rate limiting & backoff ───────────────────────────────────────────
    /// Requests allowed in any trailing 60-second window. Default: 50.
    pub requests_per_minute: usize,
    /// Burst-token pool size. Default: 10.
    pub burst_limit: usize,
    /// Backoff base delay in seconds. Default: 1.0.
    pub backoff_min: f64,
    /// Backoff ceiling in seconds. Default: 60.0.
    pub backoff_max: f64,
    /// Backoff growth factor per attempt. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Attempts per provider call before declaring exhaustion. Default: 3.
    pub max_attempts: u32,

    // ── Limits ────────────────────────────────────────────────────────────
    /// Maximum input size in megabytes. Default: 100.
    pub max_file_size_mb: u64,
    /// Maximum pages per input document. Default: 500.
    pub max_total_pages: usize,
    /// Maximum pages any single detected statement may span. Default: 50.
    pub max_pages_per_statement: usize,
    /// Minimum pages per statement. Default: 1.
    pub min_pages_per_statement: usize,
    /// Maximum generated filename length in bytes. Default: 240.
    pub max_filename_length: usize,
    /// Reject (strict) or warn about (lenient) inputs older than this.
    /// `None` disables the age check. Default: `None`.
    pub max_file_age_days: Option<u64>,

    // ── Detection ─────────────────────────────────────────────────────────
    /// Boundaries below this confidence are fragments: excluded from
    /// generation and from the validator's expected page sum. Default: 0.3.
    pub fragment_confidence_threshold: f64,
    /// Whether fragment filtering is applied at all. Default: true.
    pub enable_fragment_filtering: bool,
    /// Hard cap on the analysis text handed to a provider. Default: 15000.
    pub text_analysis_char_cap: usize,

    // ── Paths ─────────────────────────────────────────────────────────────
    /// Directory scanned by batch processing.
    pub input_dir: PathBuf,
    /// Directory receiving the per-statement outputs.
    pub output_dir: PathBuf,
    /// Successful inputs are moved here when set.
    pub processed_input_dir: Option<PathBuf>,
    /// Failed inputs are moved here.
    pub quarantine_dir: PathBuf,
    /// Error reports directory. Defaults to `{quarantine_dir}/reports`.
    pub error_report_dir: Option<PathBuf>,
    /// Inputs must resolve under one of these roots. Empty = any path.
    pub allowed_input_roots: Vec<PathBuf>,
    /// Outputs must resolve under one of these roots. Empty = any path.
    pub allowed_output_roots: Vec<PathBuf>,

    // ── Validation ────────────────────────────────────────────────────────
    /// Ingestion strictness. Default: `Normal`.
    pub strictness: Strictness,
    /// Whether documents must carry extractable text at all. Default: true.
    pub require_text_content: bool,
    /// Minimum fraction of pages with non-empty text. Default: 0.1.
    pub min_text_content_ratio: f64,

    // ── Concurrency ───────────────────────────────────────────────────────
    /// Documents processed concurrently in batch mode. Default: 1.
    pub workers: usize,
    /// Transient-error retries per stage before reclassifying as fatal.
    /// Default: 2.
    pub stage_retries: u32,

    // ── Sink ──────────────────────────────────────────────────────────────
    /// Tags applied to every uploaded output.
    pub sink_tags: Vec<String>,
    /// Correspondent recorded on uploads, when the sink models one.
    pub sink_correspondent: Option<String>,
    /// Document type recorded on uploads.
    pub sink_document_type: String,
    /// Storage path recorded on uploads, when the sink models one.
    pub sink_storage_path: Option<String>,
    /// Tags applied to the *input* document when its run is quarantined
    /// and the failure severity reaches `sink_error_min_severity`.
    pub sink_error_tags: Vec<String>,
    /// Minimum failure severity that triggers error tagging.
    pub sink_error_min_severity: ErrorSeverity,
    /// Seconds to wait before applying tags to an uploaded document,
    /// because sink indexing is eventually consistent. Range 0–60.
    /// Default: 5.
    pub sink_tag_wait_secs: u64,
    /// Sink query timeout in seconds. Range 1–300. Default: 30.
    pub sink_query_timeout_secs: u64,
    /// When true, a sink outage fails the run instead of degrading to a
    /// local-only success. Default: false.
    pub sink_mandatory: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider_kind: ProviderKind::None,
            model_name: None,
            endpoint: None,
            api_key: None,
            provider_timeout_secs: 30,
            requests_per_minute: 50,
            burst_limit: 10,
            backoff_min: 1.0,
            backoff_max: 60.0,
            backoff_multiplier: 2.0,
            max_attempts: 3,
            max_file_size_mb: 100,
            max_total_pages: 500,
            max_pages_per_statement: 50,
            min_pages_per_statement: 1,
            max_filename_length: 240,
            max_file_age_days: None,
            fragment_confidence_threshold: 0.3,
            enable_fragment_filtering: true,
            text_analysis_char_cap: 15_000,
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("./separated"),
            processed_input_dir: None,
            quarantine_dir: PathBuf::from("./quarantine"),
            error_report_dir: None,
            allowed_input_roots: Vec::new(),
            allowed_output_roots: Vec::new(),
            strictness: Strictness::Normal,
            require_text_content: true,
            min_text_content_ratio: 0.1,
            workers: 1,
            stage_retries: 2,
            sink_tags: vec!["bank-statement".to_string()],
            sink_correspondent: None,
            sink_document_type: "bank-statement".to_string(),
            sink_storage_path: None,
            sink_error_tags: vec!["separation-failed".to_string()],
            sink_error_min_severity: ErrorSeverity::High,
            sink_tag_wait_secs: 5,
            sink_query_timeout_secs: 30,
            sink_mandatory: false,
        }
    }
}

impl Config {
    /// Create a new builder for `Config`.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            config: Self::default(),
        }
    }

    /// Effective error-report directory.
    pub fn report_dir(&self) -> PathBuf {
        self.error_report_dir
            .clone()
            .unwrap_or_else(|| self.quarantine_dir.join("reports"))
    }

    /// Subset of tuneables written into quarantine reports. The API key is
    /// excluded even from debug output.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "provider_kind": self.provider_kind,
            "model_name": self.model_name,
            "requests_per_minute": self.requests_per_minute,
            "burst_limit": self.burst_limit,
            "max_attempts": self.max_attempts,
            "max_file_size_mb": self.max_file_size_mb,
            "max_total_pages": self.max_total_pages,
            "fragment_confidence_threshold": self.fragment_confidence_threshold,
            "strictness": self.strictness,
            "workers": self.workers,
        })
    }
}

/// Builder for [`Config`].
#[derive(Debug)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn provider_kind(mut self, kind: ProviderKind) -> Self {
        self.config.provider_kind = kind;
        self
    }

    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.config.model_name = Some(name.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn provider_timeout_secs(mut self, secs: u64) -> Self {
        self.config.provider_timeout_secs = secs.max(1);
        self
    }

    pub fn requests_per_minute(mut self, n: usize) -> Self {
        self.config.requests_per_minute = n.max(1);
        self
    }

    pub fn burst_limit(mut self, n: usize) -> Self {
        self.config.burst_limit = n.max(1);
        self
    }

    pub fn backoff_min(mut self, secs: f64) -> Self {
        self.config.backoff_min = secs.max(0.0);
        self
    }

    pub fn backoff_max(mut self, secs: f64) -> Self {
        self.config.backoff_max = secs;
        self
    }

    pub fn backoff_multiplier(mut self, m: f64) -> Self {
        self.config.backoff_multiplier = m.max(1.0);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_mb = mb.max(1);
        self
    }

    pub fn max_total_pages(mut self, n: usize) -> Self {
        self.config.max_total_pages = n.max(1);
        self
    }

    pub fn max_pages_per_statement(mut self, n: usize) -> Self {
        self.config.max_pages_per_statement = n.max(1);
        self
    }

    pub fn min_pages_per_statement(mut self, n: usize) -> Self {
        self.config.min_pages_per_statement = n.max(1);
        self
    }

    pub fn max_filename_length(mut self, n: usize) -> Self {
        self.config.max_filename_length = n.clamp(32, 255);
        self
    }

    pub fn max_file_age_days(mut self, days: u64) -> Self {
        self.config.max_file_age_days = Some(days);
        self
    }

    pub fn fragment_confidence_threshold(mut self, t: f64) -> Self {
        self.config.fragment_confidence_threshold = t.clamp(0.0, 1.0);
        self
    }

    pub fn enable_fragment_filtering(mut self, v: bool) -> Self {
        self.config.enable_fragment_filtering = v;
        self
    }

    pub fn text_analysis_char_cap(mut self, n: usize) -> Self {
        self.config.text_analysis_char_cap = n.max(1_000);
        self
    }

    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn processed_input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.processed_input_dir = Some(dir.into());
        self
    }

    pub fn quarantine_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.quarantine_dir = dir.into();
        self
    }

    pub fn error_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.error_report_dir = Some(dir.into());
        self
    }

    pub fn allowed_input_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.config.allowed_input_roots = roots;
        self
    }

    pub fn allowed_output_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.config.allowed_output_roots = roots;
        self
    }

    pub fn strictness(mut self, s: Strictness) -> Self {
        self.config.strictness = s;
        self
    }

    pub fn require_text_content(mut self, v: bool) -> Self {
        self.config.require_text_content = v;
        self
    }

    pub fn min_text_content_ratio(mut self, r: f64) -> Self {
        self.config.min_text_content_ratio = r.clamp(0.0, 1.0);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn stage_retries(mut self, n: u32) -> Self {
        self.config.stage_retries = n;
        self
    }

    pub fn sink_tags(mut self, tags: Vec<String>) -> Self {
        self.config.sink_tags = tags;
        self
    }

    pub fn sink_correspondent(mut self, name: impl Into<String>) -> Self {
        self.config.sink_correspondent = Some(name.into());
        self
    }

    pub fn sink_document_type(mut self, name: impl Into<String>) -> Self {
        self.config.sink_document_type = name.into();
        self
    }

    pub fn sink_storage_path(mut self, path: impl Into<String>) -> Self {
        self.config.sink_storage_path = Some(path.into());
        self
    }

    pub fn sink_error_tags(mut self, tags: Vec<String>) -> Self {
        self.config.sink_error_tags = tags;
        self
    }

    pub fn sink_error_min_severity(mut self, severity: ErrorSeverity) -> Self {
        self.config.sink_error_min_severity = severity;
        self
    }

    pub fn sink_tag_wait_secs(mut self, secs: u64) -> Self {
        self.config.sink_tag_wait_secs = secs.min(60);
        self
    }

    pub fn sink_query_timeout_secs(mut self, secs: u64) -> Self {
        self.config.sink_query_timeout_secs = secs.clamp(1, 300);
        self
    }

    pub fn sink_mandatory(mut self, v: bool) -> Self {
        self.config.sink_mandatory = v;
        self
    }

    /// Build the configuration, validating cross-field constraints.
    pub fn build(self) -> Result<Config, SeparatorError> {
        let c = &self.config;
        if c.min_pages_per_statement > c.max_pages_per_statement {
            return Err(SeparatorError::InvalidConfig(format!(
                "min_pages_per_statement ({}) exceeds max_pages_per_statement ({})",
                c.min_pages_per_statement, c.max_pages_per_statement
            )));
        }
        if c.backoff_min > c.backoff_max {
            return Err(SeparatorError::InvalidConfig(format!(
                "backoff_min ({}) exceeds backoff_max ({})",
                c.backoff_min, c.backoff_max
            )));
        }
        if c.provider_kind == ProviderKind::Remote
            && c.api_key.as_deref().map_or(true, str::is_empty)
            && c.endpoint.is_none()
        {
            return Err(SeparatorError::InvalidConfig(
                "remote provider requires an api_key or an explicit endpoint".into(),
            ));
        }
        Ok(self.config)
    }
}
