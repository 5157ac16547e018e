//! Per-statement metadata extraction: bank, account last-four, closing date.
//!
//! Extraction is two-layered like detection: ask the provider when one is
//! available and believe it only after hallucination screening, otherwise
//! (or on rejection) fall back to deterministic patterns over the range
//! text. Extraction never fails a document — any field that resists both
//! layers gets its sentinel and the reason lands in `notes`.
//!
//! Normalization is centralised here because the filename grammar depends
//! on it: bank → lowercase `[a-z0-9]`, at most 10 chars; account → last
//! four digits; closing date → ISO `YYYY-MM-DD`.

use crate::banks;
use crate::detect::content;
use crate::document::Document;
use crate::hallucination;
use crate::provider::{MetadataCandidate, ModelProvider};
use crate::resilience::{call_with_resilience, BackoffPolicy, RateLimiter};
use crate::statement::{
    Boundary, StatementMetadata, UNKNOWN_ACCOUNT, UNKNOWN_BANK, UNKNOWN_DATE,
};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Explicit statement-period pattern: two "D Mon YYYY" dates joined by
/// "to", an en dash, or a hyphen. The second date is the closing date.
static RE_PERIOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)statement\s+period[:\s]+.*?(\d{1,2}\s+[A-Za-z]{3,9}\s+\d{4})\s*(?:to|–|-)\s*(\d{1,2}\s+[A-Za-z]{3,9}\s+\d{4})",
    )
    .unwrap()
});

/// Period-anchored single date, for statements that print only an end date.
static RE_PERIOD_SINGLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)statement\s+(?:period|date|ending)[:\s]+.*?(\d{1,2}\s+[A-Za-z]{3,9}\s+\d{4})")
        .unwrap()
});

/// ISO date anywhere in the text, the last-resort locale variant.
static RE_ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap());

/// Extracts one [`StatementMetadata`] per boundary.
pub struct MetadataExtractor {
    provider: Arc<dyn ModelProvider>,
    limiter: Arc<RateLimiter>,
    backoff: BackoffPolicy,
    text_char_cap: usize,
}

impl MetadataExtractor {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        limiter: Arc<RateLimiter>,
        backoff: BackoffPolicy,
        text_char_cap: usize,
    ) -> Self {
        Self {
            provider,
            limiter,
            backoff,
            text_char_cap,
        }
    }

    /// Extract metadata for one boundary. Infallible by design: provider
    /// trouble and pattern misses degrade to sentinels, never to errors.
    pub async fn extract(&self, document: &Document, boundary: &Boundary) -> StatementMetadata {
        let range_text = document.range_text(boundary.start_page, boundary.end_page);

        if self.provider.is_available() {
            if let Some(metadata) = self.from_provider(boundary, &range_text).await {
                return metadata;
            }
        }

        from_patterns(&range_text, boundary)
    }

    async fn from_provider(
        &self,
        boundary: &Boundary,
        range_text: &str,
    ) -> Option<StatementMetadata> {
        let text: String = range_text.chars().take(self.text_char_cap).collect();
        let result = call_with_resilience(&self.limiter, &self.backoff, "extract_metadata", || {
            self.provider
                .extract_metadata(&text, boundary.start_page, boundary.end_page)
        })
        .await;

        let candidate = match result {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(
                    "metadata extraction via provider failed for pages {}..{}: {:?}",
                    boundary.start_page, boundary.end_page, e
                );
                return None;
            }
        };

        let alerts = hallucination::validate_metadata(&candidate, range_text);
        if hallucination::should_reject(&alerts) {
            warn!(
                "metadata response rejected by hallucination validator ({} alerts)",
                alerts.len()
            );
            return None;
        }

        Some(normalize_candidate(candidate))
    }
}

/// Normalize a screened provider response into the filename grammar.
fn normalize_candidate(candidate: MetadataCandidate) -> StatementMetadata {
    let bank = candidate
        .bank
        .as_deref()
        .map(banks::normalize_bank_token)
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| UNKNOWN_BANK.to_string());

    let account_last4 = candidate
        .account_number
        .as_deref()
        .and_then(last_four_digits)
        .unwrap_or_else(|| UNKNOWN_ACCOUNT.to_string());

    let closing_date = candidate
        .closing_date
        .as_deref()
        .and_then(parse_any_date)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string());

    StatementMetadata {
        bank,
        account_last4,
        closing_date,
        confidence: candidate.confidence.unwrap_or(0.7).clamp(0.0, 1.0),
        notes: candidate.notes.unwrap_or_else(|| "model extraction".into()),
    }
}

/// Deterministic pattern extraction over the range text.
pub fn from_patterns(range_text: &str, boundary: &Boundary) -> StatementMetadata {
    let mut notes = Vec::new();

    let bank = match detect_bank(range_text) {
        Some(b) => b,
        None => {
            notes.push("no known bank token in range".to_string());
            UNKNOWN_BANK.to_string()
        }
    };

    // The boundary's own account (seen during detection) outranks a fresh
    // scan: it is what made this range a statement in the first place.
    let account_source = boundary
        .normalized_account()
        .or_else(|| detect_account(range_text));
    let account_last4 = match account_source.as_deref().and_then(last_four_digits) {
        Some(last4) => last4,
        None => {
            notes.push("no account number matched".to_string());
            UNKNOWN_ACCOUNT.to_string()
        }
    };

    let closing_date = match detect_closing_date(range_text) {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => {
            notes.push("no statement period matched".to_string());
            UNKNOWN_DATE.to_string()
        }
    };

    let extracted = [
        bank != UNKNOWN_BANK,
        account_last4 != UNKNOWN_ACCOUNT,
        closing_date != UNKNOWN_DATE,
    ]
    .iter()
    .filter(|&&hit| hit)
    .count();

    debug!(
        "pattern extraction for pages {}..{}: {}/3 fields",
        boundary.start_page, boundary.end_page, extracted
    );

    StatementMetadata {
        bank,
        account_last4,
        closing_date,
        confidence: extracted as f64 / 3.0,
        notes: if notes.is_empty() {
            "pattern extraction".to_string()
        } else {
            notes.join("; ")
        },
    }
}

/// Earliest known-bank token in the text, normalized. Leftmost match
/// wins, so the bank named in the statement header beats one mentioned in
/// a footer disclaimer.
pub fn detect_bank(text: &str) -> Option<String> {
    banks::find_known_bank(text).map(|(_, token)| banks::normalize_bank_token(&token))
}

/// The account whose first occurrence sits closest to the start of the
/// range, space-stripped.
pub fn detect_account(text: &str) -> Option<String> {
    content::account_occurrences(text)
        .into_iter()
        .min_by_key(|(_, _, offset)| *offset)
        .map(|(stripped, _, _)| stripped)
}

/// Last four digits of an account string, zero-padded never — accounts
/// with fewer than four digits are rejected.
fn last_four_digits(account: &str) -> Option<String> {
    let digits: Vec<char> = account.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return None;
    }
    Some(digits[digits.len() - 4..].iter().collect())
}

/// Find the statement closing date: the second date of an explicit period
/// range, else a period-anchored single date, else the first ISO date in
/// the text.
pub fn detect_closing_date(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = RE_PERIOD.captures(text) {
        if let Some(date) = parse_any_date(&caps[2]).or_else(|| parse_any_date(&caps[1])) {
            return Some(date);
        }
    }

    if let Some(caps) = RE_PERIOD_SINGLE.captures(text) {
        if let Some(date) = parse_any_date(&caps[1]) {
            return Some(date);
        }
    }

    RE_ISO_DATE
        .captures(text)
        .and_then(|caps| parse_any_date(&caps[1]))
}

/// Parse "21 May 2015", "21 MAY 2015", "2015-05-21", or "21/05/2015".
fn parse_any_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let formats = ["%d %b %Y", "%d %B %Y", "%Y-%m-%d", "%d/%m/%Y"];
    formats.iter().find_map(|f| {
        NaiveDate::parse_from_str(s, f)
            .or_else(|_| NaiveDate::parse_from_str(&titlecase_month(s), f))
            .ok()
    })
}

/// chrono's `%b`/`%B` are case-sensitive; statements print months in
/// every casing under the sun.
fn titlecase_month(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            if word.chars().all(|c| c.is_ascii_alphabetic()) {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_ascii_uppercase().to_string() + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::DetectionSource;

    fn boundary() -> Boundary {
        Boundary::new(1, 3, DetectionSource::Content)
    }

    #[test]
    fn bank_detection_prefers_earliest_offset() {
        assert_eq!(
            detect_bank("Westpac Banking Corporation — also mentions citibank later"),
            Some("westpac".to_string())
        );
        assert_eq!(
            detect_bank("citibank first, westpac second"),
            Some("citibank".to_string())
        );
        assert_eq!(detect_bank("no issuer here"), None);
    }

    #[test]
    fn long_bank_names_are_truncated_for_filenames() {
        assert_eq!(
            detect_bank("Commonwealth Bank of Australia"),
            Some("commonweal".to_string())
        );
    }

    #[test]
    fn account_detection_takes_the_range_local_account() {
        let text = "Account Number: 0623 1045 8901 9012\nlater Card Number: 4111 1111 1111 1111";
        assert_eq!(detect_account(text), Some("0623104589019012".to_string()));
    }

    #[test]
    fn closing_date_takes_the_second_period_date() {
        let text = "Statement Period: 1 May 2015 to 21 May 2015";
        assert_eq!(
            detect_closing_date(text),
            NaiveDate::from_ymd_opt(2015, 5, 21)
        );
    }

    #[test]
    fn closing_date_accepts_dash_separators_and_full_months() {
        let text = "STATEMENT PERIOD: 1 January 2019 - 31 January 2019";
        assert_eq!(
            detect_closing_date(text),
            NaiveDate::from_ymd_opt(2019, 1, 31)
        );
    }

    #[test]
    fn closing_date_single_and_iso_fallbacks() {
        assert_eq!(
            detect_closing_date("Statement date: 21 May 2015"),
            NaiveDate::from_ymd_opt(2015, 5, 21)
        );
        assert_eq!(
            detect_closing_date("generated 2015-05-21 by the bank"),
            NaiveDate::from_ymd_opt(2015, 5, 21)
        );
        assert_eq!(detect_closing_date("no dates at all"), None);
    }

    #[test]
    fn pattern_extraction_emits_sentinels_on_misses() {
        let meta = from_patterns("completely uninformative text", &boundary());
        assert!(meta.is_all_sentinel());
        assert_eq!(meta.confidence, 0.0);
        assert!(meta.notes.contains("no known bank token"));
    }

    #[test]
    fn pattern_extraction_assembles_the_triple() {
        let text = "Westpac Banking Corporation\n\
                    Account Number: 0623 1045 8901 9012\n\
                    Statement Period: 1 May 2015 to 21 May 2015\n";
        let meta = from_patterns(text, &boundary());
        assert_eq!(meta.bank, "westpac");
        assert_eq!(meta.account_last4, "9012");
        assert_eq!(meta.closing_date, "2015-05-21");
        assert!((meta.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn boundary_account_outranks_text_scan() {
        let mut b = boundary();
        b.account_number_raw = Some("5555 6666 7777 8888".into());
        let text = "Account Number: 0623 1045 8901 9012";
        let meta = from_patterns(text, &b);
        assert_eq!(meta.account_last4, "8888");
    }

    #[test]
    fn provider_candidates_are_normalized() {
        let meta = normalize_candidate(MetadataCandidate {
            bank: Some("Westpac Banking Corp".into()),
            account_number: Some("0623 1045 8901 9012".into()),
            closing_date: Some("2015-05-21".into()),
            confidence: Some(0.9),
            notes: None,
        });
        assert_eq!(meta.bank, "westpacban");
        assert_eq!(meta.account_last4, "9012");
        assert_eq!(meta.closing_date, "2015-05-21");
    }

    #[test]
    fn unparseable_provider_dates_become_sentinels() {
        let meta = normalize_candidate(MetadataCandidate {
            closing_date: Some("sometime in autumn".into()),
            ..Default::default()
        });
        assert_eq!(meta.closing_date, UNKNOWN_DATE);
        assert_eq!(meta.bank, UNKNOWN_BANK);
        assert_eq!(meta.account_last4, UNKNOWN_ACCOUNT);
    }
}
