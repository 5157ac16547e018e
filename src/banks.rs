//! The known-bank set: curated, normalized issuer tokens.
//!
//! Used in exactly two places — the hallucination validator's
//! substantial-word match, and the pattern-based extractor's bank
//! detection. A bank seen in the document text but missing from this set
//! is still accepted; the set widens recognition, it never narrows it.

use once_cell::sync::Lazy;
use regex::Regex;

/// Curated issuer tokens, lowercase, no spaces. Tokens longer than ten
/// characters are truncated by [`normalize_bank_token`] when they reach a
/// filename; the set itself keeps full names for matching.
pub const KNOWN_BANKS: &[&str] = &[
    "westpac",
    "commonwealth",
    "anz",
    "nab",
    "bendigo",
    "suncorp",
    "macquarie",
    "stgeorge",
    "bankwest",
    "chase",
    "wellsfargo",
    "bankofamerica",
    "citibank",
    "jpmorgan",
    "hsbc",
    "barclays",
    "lloyds",
    "natwest",
    "santander",
    "tdbank",
    "scotiabank",
    "amex",
];

/// Generic tokens ignored by the substantial-word match: they appear in
/// nearly every institution name and carry no identity.
pub const GENERIC_TOKENS: &[&str] = &["bank", "banking", "corporation", "the", "of"];

static RE_KNOWN_BANKS: Lazy<Regex> = Lazy::new(|| {
    // Word boundaries matter: plain substring search turns "PURCHASE"
    // into a chase sighting.
    Regex::new(&format!(r"(?i)\b(?:{})\b", KNOWN_BANKS.join("|"))).unwrap()
});

/// Earliest known-bank token in `text`, with its byte offset.
pub fn find_known_bank(text: &str) -> Option<(usize, String)> {
    RE_KNOWN_BANKS
        .find(text)
        .map(|m| (m.start(), m.as_str().to_lowercase()))
}

/// Whether any known-bank token appears in `text` as a whole word.
pub fn contains_known_bank(text: &str) -> bool {
    RE_KNOWN_BANKS.is_match(text)
}

/// Words of a bank name that actually identify the institution: longer
/// than three characters and not generic.
pub fn substantial_words(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3 && !GENERIC_TOKENS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Whether any substantial word of `name` matches a known bank token
/// (in either containment direction, so "wells fargo" matches
/// "wellsfargo" and "commbank" matches "commonwealth bank" inputs).
pub fn matches_known_bank(name: &str) -> bool {
    let words = substantial_words(name);
    if words.is_empty() {
        // Short names like "anz" carry no substantial words; fall back to
        // a direct token comparison.
        let token = normalize_bank_token(name);
        return KNOWN_BANKS.contains(&token.as_str());
    }
    words.iter().any(|w| {
        KNOWN_BANKS
            .iter()
            .any(|known| known.contains(w.as_str()) || w.contains(known))
    })
}

/// Normalize an issuer name to a filename-safe token: lowercase, strip
/// everything outside `[a-z0-9]`, truncate to 10 chars.
pub fn normalize_bank_token(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .take(10)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substantial_words_drop_generics_and_short_words() {
        assert_eq!(
            substantial_words("Westpac Banking Corporation"),
            vec!["westpac".to_string()]
        );
        assert_eq!(substantial_words("Bank of The"), Vec::<String>::new());
    }

    #[test]
    fn known_bank_matching_is_bidirectional() {
        assert!(matches_known_bank("Wells Fargo Bank"));
        assert!(matches_known_bank("westpac"));
        assert!(matches_known_bank("ANZ"));
        assert!(!matches_known_bank("Totally Invented Credit Union"));
    }

    #[test]
    fn whole_word_matching_avoids_substring_traps() {
        assert!(contains_known_bank("Westpac Banking Corporation"));
        assert!(contains_known_bank("your ANZ statement"));
        // "PURCHASE" must not read as "chase".
        assert!(!contains_known_bank("EFTPOS PURCHASE 14 MAY"));

        let (offset, token) = find_known_bank("see citibank and westpac").unwrap();
        assert_eq!(token, "citibank");
        assert_eq!(offset, 4);
    }

    #[test]
    fn normalization_is_filename_safe() {
        assert_eq!(normalize_bank_token("Westpac Banking Corp."), "westpacban");
        assert_eq!(normalize_bank_token("ANZ"), "anz");
        assert_eq!(normalize_bank_token("HSBC (UK)"), "hsbcuk");
        assert!(normalize_bank_token("St.George").len() <= 10);
    }
}
