//! Hallucination validator: structural plausibility checks over analyzer
//! output.
//!
//! Language models produce confident nonsense at a low but steady rate:
//! boundaries past the end of the document, placeholder account numbers,
//! banks that appear nowhere in the text. Each rule here catches one
//! failure shape and emits an [`Alert`]; the response under review is
//! never mutated. A response is rejected when the collected alerts cross
//! the severity threshold, which routes the detection engine to its next
//! strategy.
//!
//! The rules are deliberately cheap — string scans and integer
//! comparisons — so validation costs nothing next to the provider call it
//! guards.

use crate::banks;
use crate::provider::{BoundaryCandidate, MetadataCandidate};
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// The eight alert categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertKind {
    /// More boundaries than pages, or a start page past the document end.
    PhantomStatement,
    /// Inverted or non-positive page range.
    InvalidPageRange,
    /// Statement period year in the impossible past or future.
    ImpossibleDate,
    /// Placeholder-looking or absurd-length account number.
    NonsensicalAccount,
    /// Bank named in the response but absent from both the document text
    /// and the known-bank set.
    FabricatedBank,
    /// Two boundaries with identical page ranges.
    DuplicateBoundaries,
    /// A boundary over pages that carry almost no text.
    MissingContent,
    /// Institution category conflicts with the account format in the text.
    InconsistentData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One rule violation. Attached to the response under review; never
/// mutates it.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub detected_value: String,
    pub expected_value: Option<String>,
    pub description: String,
}

/// Rejection policy: one critical alert, or three high alerts.
pub fn should_reject(alerts: &[Alert]) -> bool {
    let critical = alerts.iter().filter(|a| a.severity == Severity::Critical).count();
    let high = alerts.iter().filter(|a| a.severity == Severity::High).count();
    critical >= 1 || high >= 3
}

static RE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(1[0-9]{3}|2[0-9]{3})\b").unwrap());

/// Account strings models emit when they have nothing real to report.
const PLACEHOLDER_ACCOUNTS: &[&str] = &["123456789", "000000000", "111111111", "***1234***"];

/// Tokens that mark a deposit-style account in statement text.
const SAVINGS_TOKENS: &[&str] = &["savings account", "saver account", "deposit account"];

/// Validate a boundary-analysis response against the document it claims to
/// describe. `page_texts` is the document's per-page text, 0-indexed.
pub fn validate_boundaries(
    candidates: &[BoundaryCandidate],
    page_texts: &[String],
    total_pages: usize,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if candidates.len() > total_pages {
        alerts.push(Alert {
            kind: AlertKind::PhantomStatement,
            severity: Severity::Critical,
            detected_value: format!("{} boundaries", candidates.len()),
            expected_value: Some(format!("at most {} for {} pages", total_pages, total_pages)),
            description: "more statements than pages in the document".into(),
        });
    }

    for c in candidates {
        if c.start_page > total_pages {
            alerts.push(Alert {
                kind: AlertKind::PhantomStatement,
                severity: Severity::High,
                detected_value: format!("start_page {}", c.start_page),
                expected_value: Some(format!("≤ {}", total_pages)),
                description: "boundary starts past the end of the document".into(),
            });
        }

        if c.start_page > c.end_page || c.start_page < 1 || c.end_page < 1 {
            alerts.push(Alert {
                kind: AlertKind::InvalidPageRange,
                severity: Severity::High,
                detected_value: format!("pages {}..{}", c.start_page, c.end_page),
                expected_value: Some("1 ≤ start ≤ end".into()),
                description: "page range is inverted or non-positive".into(),
            });
        }

        if let Some(period) = &c.period {
            alerts.extend(check_period_years(period));
        }

        if let Some(account) = &c.account_number {
            alerts.extend(check_account(account));
        }

        // Content check only for ranges that are structurally sane.
        if c.start_page >= 1 && c.start_page <= c.end_page && c.end_page <= total_pages {
            let chars: usize = page_texts[c.start_page - 1..c.end_page.min(page_texts.len())]
                .iter()
                .map(|t| t.trim().len())
                .sum();
            if chars < 50 {
                alerts.push(Alert {
                    kind: AlertKind::MissingContent,
                    severity: Severity::High,
                    detected_value: format!("{} chars across pages {}..{}", chars, c.start_page, c.end_page),
                    expected_value: Some("≥ 50 chars".into()),
                    description: "claimed statement pages carry almost no text".into(),
                });
            }
        }
    }

    for (i, a) in candidates.iter().enumerate() {
        for b in &candidates[i + 1..] {
            if a.start_page == b.start_page && a.end_page == b.end_page {
                alerts.push(Alert {
                    kind: AlertKind::DuplicateBoundaries,
                    severity: Severity::Medium,
                    detected_value: format!("pages {}..{} twice", a.start_page, a.end_page),
                    expected_value: None,
                    description: "identical page range reported twice".into(),
                });
            }
        }
    }

    alerts
}

/// Validate a metadata-extraction response. `range_text` is the text of
/// the boundary the metadata describes; the bank and account rules apply.
pub fn validate_metadata(candidate: &MetadataCandidate, range_text: &str) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if let Some(bank) = candidate.bank.as_deref().filter(|b| !b.trim().is_empty()) {
        let in_text = range_text.to_lowercase().contains(&bank.to_lowercase());
        // A bank present in the document but missing from the dictionary
        // is accepted; the dictionary only rescues names the text cannot
        // confirm (abbreviations, OCR drift).
        if !in_text && !banks::matches_known_bank(bank) {
            alerts.push(Alert {
                kind: AlertKind::FabricatedBank,
                severity: Severity::High,
                detected_value: bank.to_string(),
                expected_value: None,
                description: "bank appears neither in the document text nor in the known-bank set".into(),
            });
        }
    }

    if let Some(account) = &candidate.account_number {
        alerts.extend(check_account(account));
        alerts.extend(check_account_consistency(account, range_text));
    }

    if let Some(date) = &candidate.closing_date {
        alerts.extend(check_period_years(date));
    }

    alerts
}

fn check_period_years(period: &str) -> Vec<Alert> {
    let current_year = chrono::Utc::now().year();
    let mut alerts = Vec::new();
    for cap in RE_YEAR.captures_iter(period) {
        let year: i32 = cap[1].parse().unwrap_or(0);
        if year > current_year + 1 {
            alerts.push(Alert {
                kind: AlertKind::ImpossibleDate,
                severity: Severity::High,
                detected_value: year.to_string(),
                expected_value: Some(format!("≤ {}", current_year + 1)),
                description: "statement period is in the future".into(),
            });
        } else if year < 1950 {
            alerts.push(Alert {
                kind: AlertKind::ImpossibleDate,
                severity: Severity::Medium,
                detected_value: year.to_string(),
                expected_value: Some("≥ 1950".into()),
                description: "statement period predates electronic banking".into(),
            });
        }
    }
    alerts
}

fn check_account(account: &str) -> Vec<Alert> {
    let stripped: String = account.chars().filter(|c| !c.is_whitespace()).collect();
    let mut alerts = Vec::new();

    if PLACEHOLDER_ACCOUNTS.contains(&stripped.as_str()) {
        alerts.push(Alert {
            kind: AlertKind::NonsensicalAccount,
            severity: Severity::High,
            detected_value: stripped.clone(),
            expected_value: None,
            description: "account number is a well-known placeholder".into(),
        });
    }

    let stripped_len = stripped.chars().count();
    if stripped_len < 4 || stripped_len > 20 {
        alerts.push(Alert {
            kind: AlertKind::NonsensicalAccount,
            severity: Severity::Medium,
            detected_value: format!("{} chars after stripping", stripped_len),
            expected_value: Some("4–20 chars".into()),
            description: "account number length is implausible".into(),
        });
    }

    alerts
}

/// A savings-account token next to a card-format number (15–16 digits
/// starting 4 or 5) is the classic model mix-up between an account on the
/// page and a card advertised on the same page.
fn check_account_consistency(account: &str, range_text: &str) -> Vec<Alert> {
    let stripped: String = account.chars().filter(|c| c.is_ascii_digit()).collect();
    let looks_like_card = (stripped.len() == 15 || stripped.len() == 16)
        && stripped.starts_with(['4', '5']);
    if !looks_like_card {
        return Vec::new();
    }

    let lower = range_text.to_lowercase();
    if SAVINGS_TOKENS.iter().any(|t| lower.contains(t)) {
        vec![Alert {
            kind: AlertKind::InconsistentData,
            severity: Severity::Medium,
            detected_value: "card-format number on a savings statement".into(),
            expected_value: None,
            description: "account format conflicts with the statement type in the text".into(),
        }]
    } else {
        Vec::new()
    }
}
