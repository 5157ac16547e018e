//! Document-management sink and source capabilities.
//!
//! The core never speaks HTTP to a document-management service itself —
//! it consumes these traits. A concrete client (paperless-style or
//! otherwise) lives with the embedding application; the test suite uses
//! recording fakes. What the core *does* own is the delivery choreography:
//! ensure tags exist, upload, wait out the sink's eventually-consistent
//! indexing, then apply tags.
//!
//! Sink failures are softer than everything else in the crate: an
//! individual upload failure is retryable, and a complete outage merely
//! downgrades the run to local-only success unless the sink is declared
//! mandatory.

use crate::statement::StatementMetadata;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Identifier assigned by the sink to an uploaded document.
pub type RemoteId = u64;

/// Errors surfaced by sink and source implementations.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// 5xx-style failure; worth retrying.
    #[error("sink server error (status {status}): {message}")]
    ServerError { status: u16, message: String },

    /// The sink cannot be reached at all.
    #[error("sink unreachable: {detail}")]
    Outage { detail: String },

    /// The sink refused the document or operation.
    #[error("sink rejected the request: {detail}")]
    Rejected { detail: String },

    /// A download produced something other than a PDF.
    #[error("content type mismatch: expected application/pdf, got {got}")]
    ContentTypeMismatch { got: String },
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServerError { .. })
    }
}

/// Metadata attached to an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadMetadata {
    pub title: String,
    pub correspondent: Option<String>,
    pub document_type: Option<String>,
    pub storage_path: Option<String>,
    /// ISO date the sink should record as the document date.
    pub created: Option<String>,
}

/// Push side: upload outputs and tag them.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    async fn upload(&self, file: &Path, metadata: &UploadMetadata) -> Result<RemoteId, SinkError>;

    async fn create_tag_if_missing(&self, name: &str) -> Result<u64, SinkError>;

    async fn create_correspondent_if_missing(&self, name: &str) -> Result<u64, SinkError>;

    async fn create_document_type_if_missing(&self, name: &str) -> Result<u64, SinkError>;

    async fn resolve_storage_path(&self, path: &str) -> Result<u64, SinkError>;

    /// Apply tags to an uploaded document. Implementations wait
    /// `wait_secs` before applying, because sink indexing is eventually
    /// consistent and tagging an unindexed document silently no-ops.
    async fn apply_tags(
        &self,
        remote_id: RemoteId,
        tag_ids: &[u64],
        wait_secs: u64,
    ) -> Result<(), SinkError>;
}

/// A document reference returned by a source query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRef {
    pub id: u64,
    pub title: String,
    pub content_type: String,
}

/// Filter for source queries.
#[derive(Debug, Clone, Default)]
pub struct SourceQuery {
    pub tags: Vec<String>,
    pub correspondent: Option<String>,
    pub document_type: Option<String>,
    pub limit: usize,
    pub timeout_secs: u64,
}

/// Pull side: enumerate and download inputs.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn query(&self, query: &SourceQuery) -> Result<Vec<DocRef>, SinkError>;

    async fn download(&self, doc: &DocRef) -> Result<PathBuf, SinkError>;
}

/// Query a source and download every matching PDF, rejecting any other
/// content type before bytes are fetched.
pub async fn pull_documents(
    source: &Arc<dyn DocumentSource>,
    query: &SourceQuery,
) -> Result<Vec<PathBuf>, SinkError> {
    let refs = source.query(query).await?;
    let mut paths = Vec::with_capacity(refs.len());
    for doc in refs {
        if doc.content_type != "application/pdf" {
            warn!(
                "skipping '{}' (id {}): content type {}",
                doc.title, doc.id, doc.content_type
            );
            return Err(SinkError::ContentTypeMismatch {
                got: doc.content_type,
            });
        }
        paths.push(source.download(&doc).await?);
    }
    Ok(paths)
}

/// Deliver one output file: ensure tags exist, upload, apply tags after
/// the configured indexing wait.
pub async fn deliver(
    sink: &Arc<dyn DocumentSink>,
    file: &Path,
    metadata: &StatementMetadata,
    tags: &[String],
    correspondent: Option<&str>,
    wait_secs: u64,
) -> Result<RemoteId, SinkError> {
    let mut tag_ids = Vec::with_capacity(tags.len());
    for tag in tags {
        tag_ids.push(sink.create_tag_if_missing(tag).await?);
    }

    let upload_meta = UploadMetadata {
        title: file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| metadata.bank.clone()),
        correspondent: correspondent.map(str::to_string),
        document_type: Some("bank-statement".to_string()),
        storage_path: None,
        created: (metadata.closing_date != crate::statement::UNKNOWN_DATE)
            .then(|| metadata.closing_date.clone()),
    };

    let remote_id = sink.upload(file, &upload_meta).await?;
    sink.apply_tags(remote_id, &tag_ids, wait_secs).await?;

    info!(
        "delivered {} as remote document {}",
        file.display(),
        remote_id
    );
    Ok(remote_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Recording fake used across the crate's tests.
    #[derive(Default)]
    pub struct RecordingSink {
        pub uploads: Mutex<Vec<(PathBuf, UploadMetadata)>>,
        pub tags: Mutex<Vec<String>>,
        pub applied: Mutex<Vec<(RemoteId, Vec<u64>, u64)>>,
        pub fail_uploads: Mutex<u32>,
    }

    #[async_trait]
    impl DocumentSink for RecordingSink {
        async fn upload(
            &self,
            file: &Path,
            metadata: &UploadMetadata,
        ) -> Result<RemoteId, SinkError> {
            let mut failures = self.fail_uploads.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(SinkError::ServerError {
                    status: 503,
                    message: "warming up".into(),
                });
            }
            let mut uploads = self.uploads.lock();
            uploads.push((file.to_path_buf(), metadata.clone()));
            Ok(uploads.len() as RemoteId)
        }

        async fn create_tag_if_missing(&self, name: &str) -> Result<u64, SinkError> {
            let mut tags = self.tags.lock();
            if let Some(pos) = tags.iter().position(|t| t == name) {
                return Ok(pos as u64 + 1);
            }
            tags.push(name.to_string());
            Ok(tags.len() as u64)
        }

        async fn create_correspondent_if_missing(&self, _name: &str) -> Result<u64, SinkError> {
            Ok(1)
        }

        async fn create_document_type_if_missing(&self, _name: &str) -> Result<u64, SinkError> {
            Ok(1)
        }

        async fn resolve_storage_path(&self, _path: &str) -> Result<u64, SinkError> {
            Ok(1)
        }

        async fn apply_tags(
            &self,
            remote_id: RemoteId,
            tag_ids: &[u64],
            wait_secs: u64,
        ) -> Result<(), SinkError> {
            self.applied.lock().push((remote_id, tag_ids.to_vec(), wait_secs));
            Ok(())
        }
    }

    #[tokio::test]
    async fn deliver_creates_tags_then_uploads_then_applies() {
        let sink: Arc<dyn DocumentSink> = Arc::new(RecordingSink::default());
        let metadata = StatementMetadata {
            bank: "westpac".into(),
            account_last4: "2819".into(),
            closing_date: "2015-05-21".into(),
            confidence: 1.0,
            notes: String::new(),
        };

        let id = deliver(
            &sink,
            Path::new("/out/westpac-2819-2015-05-21.pdf"),
            &metadata,
            &["bank-statement".into(), "processed".into()],
            Some("Westpac"),
            5,
        )
        .await
        .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn pull_rejects_non_pdf_content() {
        struct OneDocSource;

        #[async_trait]
        impl DocumentSource for OneDocSource {
            async fn query(&self, _q: &SourceQuery) -> Result<Vec<DocRef>, SinkError> {
                Ok(vec![DocRef {
                    id: 7,
                    title: "scan".into(),
                    content_type: "image/png".into(),
                }])
            }

            async fn download(&self, _doc: &DocRef) -> Result<PathBuf, SinkError> {
                panic!("download must not be called for non-PDF content");
            }
        }

        let source: Arc<dyn DocumentSource> = Arc::new(OneDocSource);
        let err = pull_documents(&source, &SourceQuery::default()).await.unwrap_err();
        assert!(matches!(err, SinkError::ContentTypeMismatch { .. }));
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(SinkError::ServerError { status: 503, message: String::new() }.is_transient());
        assert!(!SinkError::Rejected { detail: String::new() }.is_transient());
        assert!(!SinkError::Outage { detail: String::new() }.is_transient());
    }
}
