//! # statement-separator
//!
//! Split PDF files that concatenate several independent bank statements
//! into one PDF per statement, named so downstream tooling can sort and
//! audit on the filename alone: `{bank}-{account_last4}-{closing_date}.pdf`.
//!
//! ## Why this crate?
//!
//! Scanners, export tools, and document-management systems routinely
//! bundle a month of statements into one PDF. Splitting them by hand does
//! not scale, and naive page-count splitting breaks the moment statements
//! vary in length. This crate finds the real statement boundaries — with
//! a language model when one is configured, with deterministic text
//! detectors always — and proves the output is right before calling a
//! document done.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Ingest    limits, encryption check, per-page text, fingerprint
//!  ├─ 2. Analyze   page-marked text for the model provider (optional)
//!  ├─ 3. Detect    model → hallucination screen → content detectors → default
//!  ├─ 4. Extract   (bank, account last-4, closing date) per statement
//!  ├─ 5. Generate  one PDF per boundary via the PDF backend
//!  ├─ 6. Organize  canonical names, collision suffixes
//!  ├─ 7. Validate  existence, page sum, byte size, content sample
//!  └─ 8. Sink      optional upload + tagging to a document-management service
//! ```
//!
//! Fatal failures at any stage move the input to quarantine with a JSON
//! error report; batch runs continue past quarantined documents.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use statement_separator::{Config, WorkflowDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::builder()
//!         .output_dir("./separated")
//!         .quarantine_dir("./quarantine")
//!         .build()?;
//!     let driver = WorkflowDriver::new(config);
//!     let report = driver.process("statements.pdf".as_ref()).await;
//!     println!("{} statement(s)", report.statements);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `stmtsep` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analysis;
pub mod banks;
pub mod batch;
pub mod config;
pub mod detect;
pub mod document;
pub mod error;
pub mod extract;
pub mod hallucination;
pub mod naming;
pub mod output_check;
pub mod pdf;
pub mod prompts;
pub mod provider;
pub mod quarantine;
pub mod resilience;
pub mod sink;
pub mod statement;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{batch_process, BatchOptions, BatchSummary};
pub use config::{Config, ConfigBuilder, ErrorSeverity, ProviderKind, Strictness};
pub use document::Document;
pub use error::{ProviderError, SeparatorError, ValidationFailure};
pub use pdf::{LopdfBackend, PdfBackend};
pub use provider::ModelProvider;
pub use resilience::{RateLimiter, RateLimiterStats};
pub use statement::{Boundary, BoundarySet, DetectionSource, StatementMetadata};
pub use workflow::{RunOutcome, RunReport, WorkflowDriver};
