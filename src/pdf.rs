//! PDF backend: page counting, per-page text extraction, page-range output.
//!
//! ## Why a trait?
//!
//! Everything the core needs from a PDF library is three operations:
//! inspect a file, read its per-page text, and write a page range to a new
//! file. Putting those behind [`PdfBackend`] keeps the detection and
//! workflow code free of any PDF-library types and lets the test suite run
//! against synthetic documents without touching a parser.
//!
//! ## Why spawn_blocking?
//!
//! PDF parsing is CPU-bound and the lopdf API is synchronous. The async
//! wrappers at the bottom move backend calls onto tokio's blocking pool so
//! document workers never stall the runtime's worker threads.

use crate::error::SeparatorError;
use lopdf::Document as LopdfDocument;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cheap facts about a PDF, gathered without extracting text.
#[derive(Debug, Clone)]
pub struct PdfInfo {
    /// Total page count.
    pub page_count: usize,
    /// Whether the document is encrypted. Encrypted inputs are rejected.
    pub encrypted: bool,
    /// On-disk size in bytes.
    pub byte_size: u64,
}

/// The three operations the core needs from a PDF library.
pub trait PdfBackend: Send + Sync {
    /// Open the file and report page count, encryption, and byte size.
    fn inspect(&self, path: &Path) -> Result<PdfInfo, SeparatorError>;

    /// Extract text for every page, in page order. Pages whose text cannot
    /// be extracted yield an empty string rather than failing the document.
    fn page_texts(&self, path: &Path) -> Result<Vec<String>, SeparatorError>;

    /// Write pages `[start_page, end_page]` (1-based inclusive) of `src`
    /// to a new PDF at `dest`.
    fn save_page_range(
        &self,
        src: &Path,
        start_page: usize,
        end_page: usize,
        dest: &Path,
    ) -> Result<(), SeparatorError>;

    /// Smallest byte size a non-empty output from this backend can have.
    /// Used by the output validator's size check.
    fn min_output_bytes(&self) -> u64 {
        1024
    }
}

// ── lopdf implementation ─────────────────────────────────────────────────

/// Production backend built on [`lopdf`].
///
/// lopdf both parses existing documents (page tree, text operators) and
/// mutates them, which is exactly the split-by-page-range shape this crate
/// needs: load, delete the pages outside the range, prune, save.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfBackend;

impl LopdfBackend {
    pub fn new() -> Self {
        Self
    }

    fn load(&self, path: &Path) -> Result<LopdfDocument, SeparatorError> {
        verify_pdf_magic(path)?;
        LopdfDocument::load(path).map_err(|e| SeparatorError::PdfUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}

impl PdfBackend for LopdfBackend {
    fn inspect(&self, path: &Path) -> Result<PdfInfo, SeparatorError> {
        let byte_size = std::fs::metadata(path)
            .map_err(|e| SeparatorError::FilesystemError {
                path: path.to_path_buf(),
                source: e,
            })?
            .len();

        let doc = self.load(path)?;
        Ok(PdfInfo {
            page_count: doc.get_pages().len(),
            encrypted: doc.is_encrypted(),
            byte_size,
        })
    }

    fn page_texts(&self, path: &Path) -> Result<Vec<String>, SeparatorError> {
        let doc = self.load(path)?;
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();

        let mut texts = Vec::with_capacity(page_numbers.len());
        for page in page_numbers {
            match doc.extract_text(&[page]) {
                Ok(text) => texts.push(text),
                Err(e) => {
                    // Image-only or damaged pages still occupy a slot so page
                    // numbering stays aligned with the document.
                    warn!("page {}: text extraction failed: {}", page, e);
                    texts.push(String::new());
                }
            }
        }
        debug!("extracted text for {} pages from {}", texts.len(), path.display());
        Ok(texts)
    }

    fn save_page_range(
        &self,
        src: &Path,
        start_page: usize,
        end_page: usize,
        dest: &Path,
    ) -> Result<(), SeparatorError> {
        let mut doc = self.load(src)?;
        let total = doc.get_pages().len();

        let to_delete: Vec<u32> = (1..=total as u32)
            .filter(|&p| (p as usize) < start_page || (p as usize) > end_page)
            .collect();
        if to_delete.len() == total {
            return Err(SeparatorError::PdfGenerationFailed {
                path: dest.to_path_buf(),
                detail: format!("page range {}..={} selects no pages", start_page, end_page),
            });
        }

        doc.delete_pages(&to_delete);
        doc.prune_objects();
        doc.renumber_objects();
        doc.save(dest).map_err(|e| SeparatorError::PdfGenerationFailed {
            path: dest.to_path_buf(),
            detail: e.to_string(),
        })?;

        debug!(
            "wrote pages {}..={} of {} to {}",
            start_page,
            end_page,
            src.display(),
            dest.display()
        );
        Ok(())
    }
}

/// Verify the `%PDF` magic bytes before handing the file to a parser, so
/// callers get a meaningful error rather than a parser panic on junk input.
fn verify_pdf_magic(path: &Path) -> Result<(), SeparatorError> {
    let mut f = std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SeparatorError::FileMissing {
                path: path.to_path_buf(),
            }
        } else {
            SeparatorError::FilesystemError {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(SeparatorError::PdfUnreadable {
            path: path.to_path_buf(),
            detail: format!("missing %PDF header, first bytes {:?}", magic),
        });
    }
    Ok(())
}

// ── Async wrappers ───────────────────────────────────────────────────────

/// Run [`PdfBackend::inspect`] on the blocking pool.
pub async fn inspect(
    backend: &Arc<dyn PdfBackend>,
    path: &Path,
) -> Result<PdfInfo, SeparatorError> {
    let backend = Arc::clone(backend);
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || backend.inspect(&path))
        .await
        .map_err(|e| SeparatorError::Internal(format!("inspect task panicked: {}", e)))?
}

/// Run [`PdfBackend::page_texts`] on the blocking pool.
pub async fn page_texts(
    backend: &Arc<dyn PdfBackend>,
    path: &Path,
) -> Result<Vec<String>, SeparatorError> {
    let backend = Arc::clone(backend);
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || backend.page_texts(&path))
        .await
        .map_err(|e| SeparatorError::Internal(format!("page_texts task panicked: {}", e)))?
}

/// Run [`PdfBackend::save_page_range`] on the blocking pool.
pub async fn save_page_range(
    backend: &Arc<dyn PdfBackend>,
    src: &Path,
    start_page: usize,
    end_page: usize,
    dest: &Path,
) -> Result<PathBuf, SeparatorError> {
    let backend = Arc::clone(backend);
    let src = src.to_path_buf();
    let dest_owned = dest.to_path_buf();
    let result_path = dest_owned.clone();
    tokio::task::spawn_blocking(move || {
        backend.save_page_range(&src, start_page, end_page, &dest_owned)
    })
    .await
    .map_err(|e| SeparatorError::Internal(format!("save task panicked: {}", e)))??;
    Ok(result_path)
}
