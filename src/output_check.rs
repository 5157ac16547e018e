//! Output validation: prove the generated files actually contain the
//! statements they claim to.
//!
//! Four checks run after generation and organization, all of which must
//! pass:
//!
//! 1. **Existence** — every planned output is present and non-empty.
//! 2. **Page sum** — pages across accepted outputs equal the source page
//!    count minus pages lost to filtered fragments. The expected total is
//!    computed *before* generation so a generator bug cannot adjust its
//!    own budget.
//! 3. **Byte-size sanity** — each output is at least the backend's minimum
//!    for a non-empty PDF and at most twice its proportional share of the
//!    source, plus a fixed structural allowance for the per-file skeleton
//!    (catalog, xref, fonts).
//! 4. **Content sample** — the first and last page of each output share at
//!    least one token with the corresponding source page text, proving
//!    the right pages landed in the right file.
//!
//! The first failed check aborts validation; the workflow driver treats
//! the failure as fatal and quarantines the input.

use crate::document::Document;
use crate::error::{SeparatorError, ValidationFailure};
use crate::pdf::{self, PdfBackend};
use crate::statement::Boundary;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Structural bytes a PDF writer adds per file regardless of content.
const PER_FILE_OVERHEAD_BYTES: u64 = 16 * 1024;

/// One generated output awaiting validation.
#[derive(Debug, Clone)]
pub struct GeneratedOutput {
    pub boundary: Boundary,
    pub path: PathBuf,
}

/// Validate every generated output against the source document.
///
/// `expected_pages` is the page budget precomputed before generation:
/// total pages minus the pages of filtered fragments.
pub async fn validate_outputs(
    backend: &Arc<dyn PdfBackend>,
    document: &Document,
    outputs: &[GeneratedOutput],
    expected_pages: usize,
) -> Result<Vec<String>, SeparatorError> {
    let mut passed = Vec::new();

    // ── Check 1: existence ───────────────────────────────────────────────
    for output in outputs {
        let size = file_size(&output.path);
        if size == 0 {
            return Err(SeparatorError::ValidationFailed(
                ValidationFailure::MissingFile {
                    path: output.path.clone(),
                },
            ));
        }
    }
    passed.push(format!("existence: {} files present", outputs.len()));

    // ── Check 2: page sum ────────────────────────────────────────────────
    let actual: usize = outputs.iter().map(|o| o.boundary.page_count()).sum();
    if actual != expected_pages {
        return Err(SeparatorError::ValidationFailed(
            ValidationFailure::PageSumMismatch {
                expected: expected_pages,
                actual,
            },
        ));
    }
    passed.push(format!("page sum: {} pages accounted for", actual));

    // ── Check 3: byte-size sanity ────────────────────────────────────────
    let min_bytes = backend.min_output_bytes();
    for output in outputs {
        let size = file_size(&output.path);
        let share = document.byte_size * output.boundary.page_count() as u64
            / document.total_pages.max(1) as u64;
        let max_bytes = share * 2 + PER_FILE_OVERHEAD_BYTES;
        if size < min_bytes || size > max_bytes {
            return Err(SeparatorError::ValidationFailed(
                ValidationFailure::SizeOutOfRange {
                    path: output.path.clone(),
                    bytes: size,
                },
            ));
        }
        debug!(
            "{}: {} bytes within [{}, {}]",
            output.path.display(),
            size,
            min_bytes,
            max_bytes
        );
    }
    passed.push("byte size: all outputs within range".to_string());

    // ── Check 4: content sample ──────────────────────────────────────────
    for output in outputs {
        let texts = pdf::page_texts(backend, &output.path).await?;
        check_content_sample(document, output, &texts, 0, output.boundary.start_page)?;
        if texts.len() > 1 {
            check_content_sample(
                document,
                output,
                &texts,
                texts.len() - 1,
                output.boundary.end_page,
            )?;
        }
    }
    passed.push("content sample: first/last pages match source".to_string());

    info!("output validation passed ({} checks)", passed.len());
    Ok(passed)
}

/// Require one shared non-whitespace token between an output page and its
/// source page. Source pages with no tokens at all (image-only) have
/// nothing to compare and are skipped.
fn check_content_sample(
    document: &Document,
    output: &GeneratedOutput,
    output_texts: &[String],
    output_index: usize,
    source_page: usize,
) -> Result<(), SeparatorError> {
    let source_tokens: HashSet<String> = document
        .page_text(source_page)
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    if source_tokens.is_empty() {
        return Ok(());
    }

    let matched = output_texts
        .get(output_index)
        .map(|text| {
            text.split_whitespace()
                .map(str::to_lowercase)
                .any(|token| source_tokens.contains(&token))
        })
        .unwrap_or(false);

    if matched {
        Ok(())
    } else {
        Err(SeparatorError::ValidationFailed(
            ValidationFailure::ContentSampleMismatch {
                path: output.path.clone(),
                page: source_page,
            },
        ))
    }
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Compute the expected page budget before generation: every page of the
/// document except those belonging to filtered fragments.
pub fn expected_page_budget(total_pages: usize, fragment_pages: usize) -> usize {
    total_pages.saturating_sub(fragment_pages)
}
