//! Deterministic content-based boundary detectors.
//!
//! Three detectors scan the concatenated page text for structural signals
//! that a new statement begins: restarting "page 1 of N" footers, a change
//! of account number, and statement-header line clusters. They share one
//! coordinate system — a character offset into the concatenation is mapped
//! to a page number proportionally:
//! `max(1, floor(offset / total_chars × total_pages) + 1)`.
//!
//! Detectors return *candidates*; the consolidation step in the parent
//! module owns all ordering and overlap rules.

use crate::banks;
use crate::statement::{Boundary, DetectionSource};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)page\s+(\d+)\s+of\s+(\d+)").unwrap());

/// Account-number capture patterns, most specific first. Matches are
/// space-stripped and kept only when at least 8 characters remain —
/// shorter digit runs are balances and dates, not accounts.
pub static ACCOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(?:account|card)\s*(?:number|no\.?)?\s*[:]\s*(\d[\d\s]{8,})").unwrap(),
        Regex::new(r"(?i)account\s*[:]\s*(\d+(?:\s+\d+)*)").unwrap(),
        Regex::new(r"(?i)card\s*number\s*[:]\s*(\d+(?:\s+\d+)*)").unwrap(),
    ]
});

/// Statement-period header keywords.
static PERIOD_KEYWORDS: &[&str] = &[
    "statement period",
    "statement from",
    "period covered",
    "statement date",
];

/// Account-header keywords.
static ACCOUNT_KEYWORDS: &[&str] = &["account number", "account no", "card number", "bsb"];

/// Opening-balance keywords.
static BALANCE_KEYWORDS: &[&str] = &[
    "opening balance",
    "previous balance",
    "balance brought forward",
];

/// Map a character offset in the concatenated text to a 1-based page.
pub fn offset_to_page(offset: usize, total_chars: usize, total_pages: usize) -> usize {
    if total_chars == 0 || total_pages == 0 {
        return 1;
    }
    let page = (offset as f64 / total_chars as f64 * total_pages as f64).floor() as usize + 1;
    page.clamp(1, total_pages)
}

/// A detected statement start before it is widened into a page range.
struct StartMark {
    page: usize,
    account_raw: Option<String>,
    confidence: f64,
    reasoning: String,
}

/// Widen start marks into inclusive ranges: each statement runs to the
/// page before the next start, the last to the end of the document. Each
/// boundary keeps its own mark's confidence.
fn boundaries_from_starts(mut marks: Vec<StartMark>, total_pages: usize) -> Vec<Boundary> {
    marks.sort_by_key(|m| m.page);
    marks.dedup_by_key(|m| m.page);

    let pages: Vec<usize> = marks.iter().map(|m| m.page).collect();
    marks
        .into_iter()
        .enumerate()
        .map(|(i, mark)| {
            let end = if i + 1 < pages.len() {
                (pages[i + 1] - 1).max(mark.page)
            } else {
                total_pages
            };
            Boundary {
                start_page: mark.page,
                end_page: end,
                account_number_raw: mark.account_raw,
                period_raw: None,
                confidence: mark.confidence,
                reasoning: mark.reasoning,
                source: DetectionSource::Content,
            }
        })
        .collect()
}

/// Page-marker detector: every `page 1 of N` footer marks a statement
/// start. The strongest of the three signals (confidence 0.9) — documents
/// that carry these footers restart them for every constituent statement.
pub fn page_marker_boundaries(full_text: &str, total_pages: usize) -> Vec<Boundary> {
    let total_chars = full_text.len();
    let marks: Vec<StartMark> = RE_PAGE_MARKER
        .captures_iter(full_text)
        .filter(|cap| cap[1].trim_start_matches('0') == "1")
        .map(|cap| {
            let offset = cap.get(0).map(|m| m.start()).unwrap_or(0);
            StartMark {
                page: offset_to_page(offset, total_chars, total_pages),
                account_raw: None,
                confidence: 0.9,
                reasoning: format!("'{}' footer restarts here", &cap[0]),
            }
        })
        .collect();

    debug!("page-marker detector: {} start marks", marks.len());
    boundaries_from_starts(marks, total_pages)
}

/// All account numbers in the text with their first-occurrence offsets,
/// as `(stripped, raw, offset)` triples in first-seen order.
pub fn account_occurrences(text: &str) -> Vec<(String, String, usize)> {
    let mut seen: Vec<(String, String, usize)> = Vec::new();
    for pattern in ACCOUNT_PATTERNS.iter() {
        for cap in pattern.captures_iter(text) {
            let m = match cap.get(1) {
                Some(m) => m,
                None => continue,
            };
            let raw = m.as_str().trim().to_string();
            let stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            if stripped.len() < 8 {
                continue;
            }
            match seen.iter_mut().find(|(s, _, _)| *s == stripped) {
                Some(entry) => {
                    if m.start() < entry.2 {
                        entry.2 = m.start();
                    }
                }
                None => seen.push((stripped, raw, m.start())),
            }
        }
    }
    seen.sort_by_key(|(_, _, offset)| *offset);
    seen
}

/// Account-change detector: two or more distinct account numbers imply one
/// statement per account, starting where each account first appears.
pub fn account_change_boundaries(full_text: &str, total_pages: usize) -> Vec<Boundary> {
    let occurrences = account_occurrences(full_text);
    if occurrences.len() < 2 {
        return Vec::new();
    }

    let total_chars = full_text.len();
    let marks: Vec<StartMark> = occurrences
        .into_iter()
        .map(|(stripped, raw, offset)| StartMark {
            page: offset_to_page(offset, total_chars, total_pages),
            account_raw: Some(raw),
            confidence: 0.7,
            reasoning: format!("account …{} first appears here", last4(&stripped)),
        })
        .collect();

    debug!("account-change detector: {} start marks", marks.len());
    boundaries_from_starts(marks, total_pages)
}

fn last4(stripped: &str) -> &str {
    &stripped[stripped.len().saturating_sub(4)..]
}

/// Header detector: a line matching at least two distinct keyword groups
/// (period, account, opening balance, institution) looks like the top of a
/// fresh statement. Each start's confidence is its own line's match count
/// over the four groups.
pub fn header_boundaries(full_text: &str, total_pages: usize) -> Vec<Boundary> {
    let total_chars = full_text.len();
    let mut marks = Vec::new();

    let mut offset = 0usize;
    for line in full_text.split_inclusive('\n') {
        let lower = line.to_lowercase();
        let groups = [
            PERIOD_KEYWORDS.iter().any(|k| lower.contains(k)),
            ACCOUNT_KEYWORDS.iter().any(|k| lower.contains(k)),
            BALANCE_KEYWORDS.iter().any(|k| lower.contains(k)),
            banks::contains_known_bank(line),
        ];
        let matches = groups.iter().filter(|&&g| g).count();
        if matches >= 2 {
            marks.push(StartMark {
                page: offset_to_page(offset, total_chars, total_pages),
                account_raw: None,
                confidence: matches as f64 / 4.0,
                reasoning: format!("{} header signals on one line", matches),
            });
        }
        offset += line.len();
    }

    debug!("header detector: {} start marks", marks.len());
    boundaries_from_starts(marks, total_pages)
}
