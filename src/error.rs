//! Error types for the statement-separator library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`SeparatorError`] — **Fatal**: the document cannot be processed at all
//!   (missing file, encrypted PDF, generation failure). The workflow driver
//!   answers a fatal error by quarantining the input.
//!
//! * [`ProviderError`] — **Analysis-level**: a model provider call failed.
//!   Transient variants (rate limit, timeout) are retried by the resilience
//!   layer; everything else causes a downshift to the next detection
//!   strategy. Provider errors never quarantine a document on their own —
//!   the deterministic detectors always produce *something*.
//!
//! * [`ValidationFailure`] — the specific check that failed during output
//!   validation, carried inside [`SeparatorError::ValidationFailed`] so
//!   quarantine reports can name the exact discrepancy.
//!
//! The separation lets the driver be a plain match over tags: transient →
//! retry, analysis → fallback, fatal → quarantine.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors that terminate a document run in quarantine.
#[derive(Debug, Error)]
pub enum SeparatorError {
    // ── Input errors ──────────────────────────────────────────────────────

    /// Input file was not found at the given path.
    #[error("input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileMissing { path: PathBuf },

    /// Input does not carry the `.pdf` extension.
    #[error("extension not allowed for '{path}': only .pdf inputs are accepted")]
    ExtensionDisallowed { path: PathBuf },

    /// Input resolves outside the configured allowed roots.
    #[error("path '{path}' is outside the allowed input roots")]
    PathOutsideAllowedRoots { path: PathBuf },

    /// Input exceeds the configured size ceiling.
    #[error("file '{path}' is {size_mb:.1} MB, above the {limit_mb} MB limit")]
    SizeExceeded {
        path: PathBuf,
        size_mb: f64,
        limit_mb: u64,
    },

    /// Input has more pages than the configured ceiling.
    #[error("document has {pages} pages, above the {limit} page limit")]
    PageCountExceeded { pages: usize, limit: usize },

    /// PDF requires a password; encrypted inputs are rejected outright.
    #[error("PDF '{path}' is encrypted.\nDecrypt it with an external tool (e.g. qpdf --decrypt) and retry.")]
    Encrypted { path: PathBuf },

    /// PDF header/xref is corrupt or the backend could not open it.
    #[error("PDF '{path}' is unreadable: {detail}")]
    PdfUnreadable { path: PathBuf, detail: String },

    /// Strict mode: the document carries too little extractable text.
    #[error("document '{path}' has too little text content ({ratio:.0}% of pages non-empty)")]
    LowTextContent { path: PathBuf, ratio: f64 },

    /// Strict mode: the input file is older than the configured maximum age.
    #[error("file '{path}' is {age_days} days old, above the {limit_days} day limit")]
    AgeExceeded {
        path: PathBuf,
        age_days: u64,
        limit_days: u64,
    },

    // ── Exhaustion errors ─────────────────────────────────────────────────

    /// A provider kept failing transiently until the retry budget ran out.
    #[error("model provider exhausted after {attempts} attempts: {last_error}")]
    ProviderExhausted { attempts: u32, last_error: String },

    /// The document sink kept failing transiently until retries ran out.
    #[error("document sink exhausted after {attempts} attempts: {last_error}")]
    SinkExhausted { attempts: u32, last_error: String },

    // ── Generation errors ─────────────────────────────────────────────────

    /// The PDF backend failed to emit a per-statement file.
    #[error("failed to generate '{path}': {detail}")]
    PdfGenerationFailed { path: PathBuf, detail: String },

    /// Filesystem operation failed during generate/organize/quarantine.
    #[error("filesystem error at '{path}': {source}")]
    FilesystemError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Validation errors ─────────────────────────────────────────────────

    /// An output validation check failed after generation.
    #[error("output validation failed: {0}")]
    ValidationFailed(ValidationFailure),

    // ── Config errors ─────────────────────────────────────────────────────

    /// Builder validation failed; raised at startup only.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────

    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SeparatorError {
    /// Stable category token used in quarantine reports and sink error tags.
    pub fn category(&self) -> &'static str {
        match self {
            Self::FileMissing { .. } => "FileMissing",
            Self::ExtensionDisallowed { .. } => "ExtensionDisallowed",
            Self::PathOutsideAllowedRoots { .. } => "PathOutsideAllowedRoots",
            Self::SizeExceeded { .. } => "SizeExceeded",
            Self::PageCountExceeded { .. } => "PageCountExceeded",
            Self::Encrypted { .. } => "Encrypted",
            Self::PdfUnreadable { .. } => "PdfUnreadable",
            Self::LowTextContent { .. } => "LowTextContent",
            Self::AgeExceeded { .. } => "AgeExceeded",
            Self::ProviderExhausted { .. } => "ProviderExhausted",
            Self::SinkExhausted { .. } => "SinkExhausted",
            Self::PdfGenerationFailed { .. } => "PdfGenerationFailed",
            Self::FilesystemError { .. } => "FilesystemError",
            Self::ValidationFailed(_) => "ValidationFailed",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::Internal(_) => "Internal",
        }
    }

    /// Failure severity for sink error tagging: how loudly a human should
    /// be told about this document.
    pub fn severity(&self) -> crate::config::ErrorSeverity {
        use crate::config::ErrorSeverity::*;
        match self {
            Self::Encrypted { .. } | Self::PdfUnreadable { .. } | Self::PdfGenerationFailed { .. } => {
                Critical
            }
            Self::ValidationFailed(_)
            | Self::ProviderExhausted { .. }
            | Self::SizeExceeded { .. }
            | Self::PageCountExceeded { .. }
            | Self::FilesystemError { .. }
            | Self::Internal(_) => High,
            Self::FileMissing { .. }
            | Self::ExtensionDisallowed { .. }
            | Self::PathOutsideAllowedRoots { .. }
            | Self::LowTextContent { .. }
            | Self::SinkExhausted { .. } => Medium,
            Self::AgeExceeded { .. } | Self::InvalidConfig(_) => Low,
        }
    }

    /// Actionable recovery hints written into the quarantine report.
    pub fn recovery_hints(&self) -> Vec<String> {
        let hints: &[&str] = match self {
            Self::FileMissing { .. } => &["verify the input path", "re-queue the document"],
            Self::ExtensionDisallowed { .. } => &["only .pdf inputs are processed"],
            Self::PathOutsideAllowedRoots { .. } => {
                &["move the file under an allowed input root", "extend allowed_input_roots"]
            }
            Self::SizeExceeded { .. } => {
                &["split the input with an external tool", "raise max_file_size_mb"]
            }
            Self::PageCountExceeded { .. } => {
                &["split the input with an external tool", "raise max_total_pages"]
            }
            Self::Encrypted { .. } => {
                &["decrypt with an external tool", "request an unlocked source document"]
            }
            Self::PdfUnreadable { .. } => {
                &["repair the PDF (qpdf)", "re-export from the originating system"]
            }
            Self::LowTextContent { .. } => {
                &["the PDF may be image-only; OCR it first", "lower strictness to lenient"]
            }
            Self::AgeExceeded { .. } => &["raise max_file_age_days", "re-request a fresh export"],
            Self::ProviderExhausted { .. } => {
                &["check provider endpoint and credentials", "lower requests_per_minute", "retry later"]
            }
            Self::SinkExhausted { .. } => &["check sink availability", "retry later"],
            Self::PdfGenerationFailed { .. } => {
                &["check output directory permissions and free space"]
            }
            Self::FilesystemError { .. } => &["check directory permissions and free space"],
            Self::ValidationFailed(_) => {
                &["inspect the generated outputs", "re-run with --dry-run to review boundaries"]
            }
            Self::InvalidConfig(_) => &["fix the configuration value and restart"],
            Self::Internal(_) => &["re-run with verbose logging and file a report"],
        };
        hints.iter().map(|h| h.to_string()).collect()
    }
}

/// The specific output-validation check that failed.
#[derive(Debug, Clone, Error)]
pub enum ValidationFailure {
    /// A planned output file is absent or empty.
    #[error("missing or empty output file '{path}'")]
    MissingFile { path: PathBuf },

    /// Page accounting over the accepted boundaries does not match the source.
    #[error("page sum mismatch: expected {expected} pages across outputs, got {actual}")]
    PageSumMismatch { expected: usize, actual: usize },

    /// An output is implausibly small or large relative to its source pages.
    #[error("output '{path}' size {bytes} bytes is outside the plausible range")]
    SizeOutOfRange { path: PathBuf, bytes: u64 },

    /// First/last output page shares no token with the corresponding source page.
    #[error("output '{path}' page {page} shares no content with the source page")]
    ContentSampleMismatch { path: PathBuf, page: usize },
}

impl ValidationFailure {
    /// Short token used in reports (`missing_file`, `page_sum_mismatch`, …).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingFile { .. } => "missing_file",
            Self::PageSumMismatch { .. } => "page_sum_mismatch",
            Self::SizeOutOfRange { .. } => "size_out_of_range",
            Self::ContentSampleMismatch { .. } => "content_sample_mismatch",
        }
    }
}

/// Errors surfaced by model providers.
///
/// Only [`ProviderError::RateLimited`] and [`ProviderError::NetworkTimeout`]
/// are transient; the resilience layer retries those and nothing else.
/// `MalformedResponse` in particular is *not* transient — a model that
/// returned unparseable JSON once will usually do it again, and the
/// deterministic detectors are the better fallback.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// No provider is configured, or its availability probe failed.
    #[error("provider '{provider}' is unavailable")]
    Unavailable { provider: String },

    /// The response could not be parsed into the expected JSON schema.
    #[error("malformed provider response: {detail}")]
    MalformedResponse { detail: String },

    /// The provider returned a rate-limit response (HTTP 429 or equivalent),
    /// or the local limiter denied the call before it was made.
    #[error("rate limited: {detail}")]
    RateLimited { detail: String },

    /// The call did not complete within the per-call timeout.
    #[error("provider call timed out after {secs}s")]
    NetworkTimeout { secs: u64 },

    /// Any other API-level failure (auth, 5xx, protocol).
    #[error("provider API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl ProviderError {
    /// Whether a retry within the backoff budget may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::NetworkTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ProviderError::RateLimited { detail: "429".into() }.is_transient());
        assert!(ProviderError::NetworkTimeout { secs: 30 }.is_transient());
        assert!(!ProviderError::MalformedResponse { detail: "bad json".into() }.is_transient());
        assert!(!ProviderError::Unavailable { provider: "none".into() }.is_transient());
        assert!(!ProviderError::Api { status: 401, message: "auth".into() }.is_transient());
    }

    #[test]
    fn categories_are_stable() {
        let e = SeparatorError::Encrypted { path: "a.pdf".into() };
        assert_eq!(e.category(), "Encrypted");
        assert!(!e.recovery_hints().is_empty());

        let v = SeparatorError::ValidationFailed(ValidationFailure::PageSumMismatch {
            expected: 6,
            actual: 5,
        });
        assert_eq!(v.category(), "ValidationFailed");
    }

    #[test]
    fn validation_failure_kinds() {
        assert_eq!(
            ValidationFailure::MissingFile { path: "x.pdf".into() }.kind(),
            "missing_file"
        );
        assert_eq!(
            ValidationFailure::PageSumMismatch { expected: 1, actual: 2 }.kind(),
            "page_sum_mismatch"
        );
    }
}
