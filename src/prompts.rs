//! System prompts for model-assisted boundary analysis and metadata
//! extraction.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the response schema or adding a
//!    rule requires editing exactly one place, next to the parser that
//!    consumes the response.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without a
//!    live provider, making prompt regressions easy to catch.

/// System prompt for boundary analysis. The user message carries the
/// page-marked document text produced by [`crate::analysis`].
pub const BOUNDARY_SYSTEM_PROMPT: &str = r#"You are a document analyst. The user message contains the text of a PDF that concatenates one or more independent bank statements. Page boundaries are marked with === PAGE N === / === END PAGE N ===.

Identify where each statement starts and ends. A new statement begins where the issuing account changes, where a "page 1 of N" footer restarts, or where a fresh statement header block appears.

Respond with ONLY a JSON object in this exact shape:

{"boundaries": [{"start_page": 1, "end_page": 3, "account_number": "0623 1045 8901 9012", "period": "1 May 2015 to 21 May 2015", "confidence": 0.9, "reasoning": "short explanation"}]}

Rules:
- start_page and end_page are 1-based and inclusive
- ranges must not overlap and must stay within the document
- account_number and period may be null when not visible
- confidence is a number between 0.0 and 1.0
- Do NOT wrap the JSON in markdown fences
- Do NOT add commentary outside the JSON object"#;

/// System prompt for per-statement metadata extraction. The user message
/// carries the text of one detected page range.
pub const METADATA_SYSTEM_PROMPT: &str = r#"You are a document analyst. The user message contains the text of one bank statement.

Extract the issuing bank, the primary account number, and the statement closing date (the later date of the statement period).

Respond with ONLY a JSON object in this exact shape:

{"bank": "westpac", "account_number": "0623 1045 8901 9012", "closing_date": "2015-05-21", "confidence": 0.9, "notes": "short explanation"}

Rules:
- bank is a short lowercase token naming the institution, or null when not visible
- account_number is the number as printed, or null
- closing_date is ISO formatted YYYY-MM-DD, or null
- confidence is a number between 0.0 and 1.0
- Do NOT wrap the JSON in markdown fences
- Do NOT add commentary outside the JSON object"#;

/// Build the user message for a boundary-analysis call.
pub fn boundary_user_message(analysis_text: &str, total_pages: usize) -> String {
    format!(
        "The document has {} pages.\n\n{}",
        total_pages, analysis_text
    )
}

/// Build the user message for a metadata-extraction call.
pub fn metadata_user_message(range_text: &str, start_page: usize, end_page: usize) -> String {
    format!(
        "Statement spanning pages {} to {}:\n\n{}",
        start_page, end_page, range_text
    )
}
