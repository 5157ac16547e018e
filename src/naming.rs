//! Canonical output naming: `{bank}-{account_last4}-{closing_date}.pdf`.
//!
//! Filenames are the system's public contract — downstream tooling sorts,
//! dedups, and audits on them — so the grammar is fixed and round-trip
//! parseable: every valid triple formats to a name that parses back to the
//! same triple, sentinels included. Collisions get a numeric suffix before
//! the extension and are no longer canonical (they exist only to avoid
//! clobbering an earlier output).

use crate::statement::{StatementMetadata, UNKNOWN_ACCOUNT, UNKNOWN_BANK, UNKNOWN_DATE};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static RE_BANK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]{1,10}$").unwrap());
static RE_ACCOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}$").unwrap());
static RE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Format the canonical filename for a metadata triple.
pub fn canonical_filename(metadata: &StatementMetadata) -> String {
    format!(
        "{}-{}-{}.pdf",
        metadata.bank, metadata.account_last4, metadata.closing_date
    )
}

/// Parse a canonical filename back into its `(bank, account_last4,
/// closing_date)` triple. Returns `None` for names that do not match the
/// grammar — including collision-suffixed variants.
pub fn parse_filename(name: &str) -> Option<(String, String, String)> {
    let stem = name.strip_suffix(".pdf")?;
    let (bank, rest) = stem.split_once('-')?;
    let (account, date) = rest.split_once('-')?;

    let bank_ok = bank == UNKNOWN_BANK || RE_BANK.is_match(bank);
    let account_ok = account == UNKNOWN_ACCOUNT || RE_ACCOUNT.is_match(account);
    let date_ok = date == UNKNOWN_DATE || RE_DATE.is_match(date);

    if bank_ok && account_ok && date_ok {
        Some((bank.to_string(), account.to_string(), date.to_string()))
    } else {
        None
    }
}

/// Truncate a filename stem so the whole name fits `max_len` bytes,
/// preserving the `.pdf` extension. Only degenerate configurations ever
/// trigger this — the grammar itself stays well under any sane limit.
pub fn enforce_length(filename: &str, max_len: usize) -> String {
    if filename.len() <= max_len {
        return filename.to_string();
    }
    let keep = max_len.saturating_sub(4).max(1);
    let stem = filename.strip_suffix(".pdf").unwrap_or(filename);
    let mut end = keep.min(stem.len());
    while end > 0 && !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}.pdf", &stem[..end])
}

/// Resolve `filename` inside `dir`, appending `-2`, `-3`, … before the
/// extension until the path does not exist.
pub fn collision_free_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let stem = filename.strip_suffix(".pdf").unwrap_or(filename);
    let mut n = 2u32;
    loop {
        let candidate = dir.join(format!("{}-{}.pdf", stem, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
