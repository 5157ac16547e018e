//! Document ingestion: resource limits, safety checks, text extraction.
//!
//! Ingestion is the only stage that touches the raw input file. Everything
//! after it works from the immutable [`Document`] produced here: page
//! texts are extracted once and shared read-only, and the fingerprint keys
//! the detection cache. Limits (`max_file_size_mb`, `max_total_pages`) are
//! enforced *before* any model call so a runaway input can never spend
//! provider budget.

use crate::config::{Config, Strictness};
use crate::error::SeparatorError;
use crate::pdf::{self, PdfBackend};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// An ingested input document. Immutable after construction; page text is
/// shared read-only across the detection and extraction stages.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub total_pages: usize,
    pub page_texts: Arc<Vec<String>>,
    pub byte_size: u64,
    /// Stable SHA-256 over the concatenated page texts; keys the
    /// boundary-detection cache.
    pub fingerprint: String,
}

impl Document {
    /// Concatenated text of pages `[start_page, end_page]` (1-based inclusive),
    /// joined by newlines. Out-of-range pages are skipped.
    pub fn range_text(&self, start_page: usize, end_page: usize) -> String {
        let start = start_page.max(1);
        let end = end_page.min(self.total_pages);
        if start > end {
            return String::new();
        }
        self.page_texts[start - 1..end]
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text of a single 1-based page, or empty for out-of-range requests.
    pub fn page_text(&self, page: usize) -> &str {
        if page >= 1 && page <= self.total_pages {
            &self.page_texts[page - 1]
        } else {
            ""
        }
    }
}

/// Stable hash over the concatenated per-page text.
pub fn fingerprint(page_texts: &[String]) -> String {
    let mut hasher = Sha256::new();
    for text in page_texts {
        hasher.update(text.as_bytes());
        // Separator so ["ab", "c"] and ["a", "bc"] hash differently.
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Ingest an input file, enforcing the configured limits.
///
/// Returns the immutable [`Document`] plus non-fatal warnings. Fatal
/// failures are the input-error categories: `FileMissing`,
/// `ExtensionDisallowed`, `PathOutsideAllowedRoots`, `SizeExceeded`,
/// `Encrypted`, `PdfUnreadable`, `PageCountExceeded`. Low text content and
/// file age degrade to warnings except under [`Strictness::Strict`].
pub async fn ingest(
    backend: &Arc<dyn PdfBackend>,
    path: &Path,
    config: &Config,
) -> Result<(Document, Vec<String>), SeparatorError> {
    let mut warnings = Vec::new();

    if !path.exists() {
        return Err(SeparatorError::FileMissing {
            path: path.to_path_buf(),
        });
    }

    let is_pdf_ext = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf_ext {
        return Err(SeparatorError::ExtensionDisallowed {
            path: path.to_path_buf(),
        });
    }

    check_allowed_roots(path, &config.allowed_input_roots)?;

    if let Some(limit_days) = config.max_file_age_days {
        if let Some(age_days) = file_age_days(path) {
            if age_days > limit_days {
                if config.strictness == Strictness::Strict {
                    return Err(SeparatorError::AgeExceeded {
                        path: path.to_path_buf(),
                        age_days,
                        limit_days,
                    });
                }
                warnings.push(format!(
                    "file is {} days old (limit {})",
                    age_days, limit_days
                ));
            }
        }
    }

    let info = pdf::inspect(backend, path).await?;

    let size_mb = info.byte_size as f64 / (1024.0 * 1024.0);
    if size_mb > config.max_file_size_mb as f64 {
        return Err(SeparatorError::SizeExceeded {
            path: path.to_path_buf(),
            size_mb,
            limit_mb: config.max_file_size_mb,
        });
    }

    if info.encrypted {
        return Err(SeparatorError::Encrypted {
            path: path.to_path_buf(),
        });
    }

    if info.page_count == 0 {
        return Err(SeparatorError::PdfUnreadable {
            path: path.to_path_buf(),
            detail: "document has no pages".into(),
        });
    }

    if info.page_count > config.max_total_pages {
        return Err(SeparatorError::PageCountExceeded {
            pages: info.page_count,
            limit: config.max_total_pages,
        });
    }

    let page_texts = pdf::page_texts(backend, path).await?;

    if config.require_text_content {
        let non_empty = page_texts.iter().filter(|t| !t.trim().is_empty()).count();
        let ratio = non_empty as f64 / page_texts.len() as f64;
        if ratio < config.min_text_content_ratio {
            if config.strictness == Strictness::Strict {
                return Err(SeparatorError::LowTextContent {
                    path: path.to_path_buf(),
                    ratio: ratio * 100.0,
                });
            }
            warnings.push(format!(
                "only {:.0}% of pages carry text; detection quality will suffer",
                ratio * 100.0
            ));
        }
    }

    let fp = fingerprint(&page_texts);
    info!(
        "ingested {} ({} pages, {:.1} MB, fingerprint {})",
        path.display(),
        info.page_count,
        size_mb,
        &fp[..12]
    );
    for w in &warnings {
        warn!("{}: {}", path.display(), w);
    }

    Ok((
        Document {
            path: path.to_path_buf(),
            total_pages: info.page_count,
            page_texts: Arc::new(page_texts),
            byte_size: info.byte_size,
            fingerprint: fp,
        },
        warnings,
    ))
}

/// Reject paths that resolve outside every allowed root. An empty root set
/// allows any path.
fn check_allowed_roots(path: &Path, roots: &[PathBuf]) -> Result<(), SeparatorError> {
    if roots.is_empty() {
        return Ok(());
    }

    let resolved = path
        .canonicalize()
        .map_err(|e| SeparatorError::FilesystemError {
            path: path.to_path_buf(),
            source: e,
        })?;

    for root in roots {
        // Unresolvable roots are skipped rather than failing the document.
        let root = match root.canonicalize() {
            Ok(r) => r,
            Err(_) => continue,
        };
        if resolved.starts_with(&root) {
            return Ok(());
        }
    }

    Err(SeparatorError::PathOutsideAllowedRoots {
        path: path.to_path_buf(),
    })
}

fn file_age_days(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let age = SystemTime::now().duration_since(modified).ok()?;
    debug!("{}: mtime age {}s", path.display(), age.as_secs());
    Some(age.as_secs() / 86_400)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_boundary_sensitive() {
        let a = fingerprint(&["ab".into(), "c".into()]);
        let b = fingerprint(&["ab".into(), "c".into()]);
        let c = fingerprint(&["a".into(), "bc".into()]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn range_text_clamps_and_joins() {
        let doc = Document {
            path: "x.pdf".into(),
            total_pages: 3,
            page_texts: Arc::new(vec!["one".into(), "two".into(), "three".into()]),
            byte_size: 10,
            fingerprint: String::new(),
        };
        assert_eq!(doc.range_text(1, 2), "one\ntwo");
        assert_eq!(doc.range_text(2, 99), "two\nthree");
        assert_eq!(doc.range_text(3, 1), "");
        assert_eq!(doc.page_text(2), "two");
        assert_eq!(doc.page_text(9), "");
    }

    #[test]
    fn allowed_roots_empty_allows_everything() {
        check_allowed_roots(Path::new("/anywhere/at/all.pdf"), &[]).unwrap();
    }

    #[test]
    fn allowed_roots_rejects_outsiders() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().join("doc.pdf");
        std::fs::write(&inside, b"%PDF").unwrap();

        let other = tempfile::tempdir().unwrap();

        check_allowed_roots(&inside, &[dir.path().to_path_buf()]).unwrap();
        let err =
            check_allowed_roots(&inside, &[other.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, SeparatorError::PathOutsideAllowedRoots { .. }));
    }
}
