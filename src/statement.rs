//! Core domain types: page-range boundaries and per-statement metadata.
//!
//! A [`Boundary`] is a half-open claim that pages `start_page..=end_page`
//! of the input belong to one bank statement. A [`BoundarySet`] is the
//! ordered, strictly non-overlapping collection of boundaries the engine
//! settled on for one document. [`StatementMetadata`] is the normalized
//! `(bank, account_last4, closing_date)` triple that names the output file.
//!
//! Boundaries are plain data — all invariant enforcement lives in the
//! consolidation step of the detection engine, so these types never reject
//! a candidate on construction.

use serde::{Deserialize, Serialize};

/// Sentinel bank token for statements whose issuer could not be determined.
pub const UNKNOWN_BANK: &str = "unknown";
/// Sentinel last-four for statements whose account could not be determined.
pub const UNKNOWN_ACCOUNT: &str = "0000";
/// Sentinel closing date for statements whose period could not be determined.
pub const UNKNOWN_DATE: &str = "unknown-date";

/// Which strategy produced a boundary (or a whole boundary set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    /// Model-assisted analysis via a provider.
    Model,
    /// Deterministic content detectors (page markers, account changes, headers).
    Content,
    /// Pattern-based metadata extraction.
    Pattern,
    /// Single-statement fallback covering the whole document.
    Default,
}

/// One detected statement: an inclusive 1-based page range plus whatever
/// context the analyzer attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    /// First page of the statement, 1-based inclusive.
    pub start_page: usize,
    /// Last page of the statement, 1-based inclusive.
    pub end_page: usize,
    /// Account number as seen in the document, spacing preserved.
    pub account_number_raw: Option<String>,
    /// Statement period string as seen in the document.
    pub period_raw: Option<String>,
    /// Analyzer confidence in \[0.0, 1.0\].
    pub confidence: f64,
    /// Short diagnostic string naming what triggered this boundary.
    pub reasoning: String,
    /// Which strategy produced this boundary.
    pub source: DetectionSource,
}

impl Boundary {
    pub fn new(start_page: usize, end_page: usize, source: DetectionSource) -> Self {
        Self {
            start_page,
            end_page,
            account_number_raw: None,
            period_raw: None,
            confidence: 0.0,
            reasoning: String::new(),
            source,
        }
    }

    /// Number of pages this boundary spans.
    pub fn page_count(&self) -> usize {
        self.end_page.saturating_sub(self.start_page) + 1
    }

    /// Account number with spaces and dashes stripped, for comparison.
    pub fn normalized_account(&self) -> Option<String> {
        self.account_number_raw.as_ref().map(|a| {
            a.chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect()
        })
    }
}

/// The ordered boundaries the engine settled on for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundarySet {
    pub boundaries: Vec<Boundary>,
    /// The first strategy that produced a non-empty, validated set.
    pub detection_method: DetectionSource,
}

impl BoundarySet {
    pub fn new(boundaries: Vec<Boundary>, detection_method: DetectionSource) -> Self {
        Self {
            boundaries,
            detection_method,
        }
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Whether consecutive boundaries satisfy `end_i < start_{i+1}`.
    pub fn is_strictly_ordered(&self) -> bool {
        self.boundaries
            .windows(2)
            .all(|w| w[0].end_page < w[1].start_page)
    }
}

/// Normalized per-statement descriptor used to name the output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementMetadata {
    /// Lowercase issuer token, `[a-z0-9]{1,10}`, or [`UNKNOWN_BANK`].
    pub bank: String,
    /// Last four digits of the primary account, or [`UNKNOWN_ACCOUNT`].
    pub account_last4: String,
    /// Closing date as `YYYY-MM-DD`, or [`UNKNOWN_DATE`].
    pub closing_date: String,
    /// Extraction confidence in \[0.0, 1.0\].
    pub confidence: f64,
    /// Free-form diagnostics (which patterns hit, what was discarded).
    pub notes: String,
}

impl Default for StatementMetadata {
    fn default() -> Self {
        Self {
            bank: UNKNOWN_BANK.to_string(),
            account_last4: UNKNOWN_ACCOUNT.to_string(),
            closing_date: UNKNOWN_DATE.to_string(),
            confidence: 0.0,
            notes: String::new(),
        }
    }
}

impl StatementMetadata {
    /// Whether every field carries its sentinel (nothing was extracted).
    pub fn is_all_sentinel(&self) -> bool {
        self.bank == UNKNOWN_BANK
            && self.account_last4 == UNKNOWN_ACCOUNT
            && self.closing_date == UNKNOWN_DATE
    }
}
