//! Analysis-text preparation: what a model provider actually sees.
//!
//! Providers cannot be handed raw concatenated text — they need to know
//! where pages begin and end to return page-accurate boundaries. Each page
//! is wrapped in explicit `=== PAGE N ===` / `=== END PAGE N ===` markers.
//!
//! Long documents are truncated head-and-tail rather than tail-only:
//! statement headers (bank name, account, period start) live on early
//! pages and closing balances on late pages, and those are the
//! highest-value signals for boundary detection. Middle transaction pages
//! carry the least information per character.

const TRUNCATION_TRIGGER: usize = 12_000;
const HEAD_PAGES: usize = 3;
const TAIL_PAGES: usize = 3;
const HEAD_CHAR_BUDGET: usize = 6_000;
const TAIL_CHAR_BUDGET: usize = 4_000;

/// Sentinel inserted between the retained head and tail pages.
pub const TRUNCATION_SENTINEL: &str = "[... MIDDLE PAGES TRUNCATED ...]";

/// Build the page-marked analysis text for a provider call.
///
/// When the full marked text exceeds 12,000 characters, only the first
/// three pages (up to 6,000 chars) and last three pages (up to 4,000
/// chars) are retained, joined by [`TRUNCATION_SENTINEL`]. The result is
/// hard-capped at `char_cap` characters.
pub fn prepare_analysis_text(page_texts: &[String], char_cap: usize) -> String {
    let full = mark_pages(page_texts, 0);

    let text = if full.len() > TRUNCATION_TRIGGER && page_texts.len() > HEAD_PAGES + TAIL_PAGES {
        let head = truncate_chars(
            &mark_pages(&page_texts[..HEAD_PAGES], 0),
            HEAD_CHAR_BUDGET,
        );
        let tail_start = page_texts.len() - TAIL_PAGES;
        let tail = truncate_chars(
            &mark_pages(&page_texts[tail_start..], tail_start),
            TAIL_CHAR_BUDGET,
        );
        format!("{}\n\n{}\n\n{}", head, TRUNCATION_SENTINEL, tail)
    } else {
        full
    };

    truncate_chars(&text, char_cap)
}

/// Wrap each page with explicit markers, numbering from `first_index`
/// (0-based offset into the document).
fn mark_pages(page_texts: &[String], first_index: usize) -> String {
    page_texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let n = first_index + i + 1;
            format!("=== PAGE {} ===\n{}\n=== END PAGE {} ===", n, text.trim_end(), n)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Truncate at a char boundary without splitting a UTF-8 sequence.
fn truncate_chars(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut end = cap;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
