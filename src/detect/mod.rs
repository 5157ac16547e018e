//! Boundary detection engine: model-assisted first, deterministic second,
//! whole-document default last.
//!
//! ## Strategy cascade
//!
//! 1. **Model-assisted** — ask the configured provider, screen the answer
//!    with the hallucination validator. A rejected or failed response
//!    costs nothing but the call; the cascade moves on.
//! 2. **Content-based** — run the three deterministic detectors in order
//!    of signal strength (page markers, account changes, headers); the
//!    first to find two or more statements wins.
//! 3. **Single-statement default** — one boundary spanning the document.
//!    Detection never returns empty: a document that defeats every
//!    detector is treated as one statement, which is the most common
//!    reality anyway.
//!
//! Every accepted candidate list — model or content — passes through the
//! same [`consolidate`] step, which owns the ordering and overlap rules.
//! The engine itself is stateless; the optional [`cache::DetectionCache`]
//! memoises finished sets by document fingerprint.

pub mod cache;
pub mod content;

use crate::config::{Config, Strictness};
use crate::document::Document;
use crate::error::SeparatorError;
use crate::hallucination;
use crate::provider::{BoundaryCandidate, ModelProvider};
use crate::resilience::{call_with_resilience, BackoffPolicy, RateLimiter, ResilientCallError};
use crate::statement::{Boundary, BoundarySet, DetectionSource};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use cache::DetectionCache;

/// Boundary detection over one document.
pub struct DetectionEngine {
    provider: Arc<dyn ModelProvider>,
    limiter: Arc<RateLimiter>,
    backoff: BackoffPolicy,
    strictness: Strictness,
    cache: Option<Arc<DetectionCache>>,
}

impl DetectionEngine {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        limiter: Arc<RateLimiter>,
        config: &Config,
        cache: Option<Arc<DetectionCache>>,
    ) -> Self {
        Self {
            provider,
            limiter,
            backoff: BackoffPolicy {
                base_secs: config.backoff_min,
                max_secs: config.backoff_max,
                multiplier: config.backoff_multiplier,
                max_attempts: config.max_attempts,
            },
            strictness: config.strictness,
            cache,
        }
    }

    /// Detect statement boundaries. `analysis_text` is the page-marked
    /// provider input prepared by [`crate::analysis`]; it is empty when no
    /// provider is configured.
    ///
    /// Fails only under [`Strictness::Strict`] with an exhausted provider;
    /// every other failure downshifts to the next strategy.
    pub async fn detect(
        &self,
        document: &Document,
        analysis_text: &str,
    ) -> Result<BoundarySet, SeparatorError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&document.fingerprint, document.total_pages) {
                return Ok(hit);
            }
        }

        let set = self.detect_uncached(document, analysis_text).await?;

        if let Some(cache) = &self.cache {
            cache.insert(document.fingerprint.clone(), document.total_pages, set.clone());
        }
        Ok(set)
    }

    async fn detect_uncached(
        &self,
        document: &Document,
        analysis_text: &str,
    ) -> Result<BoundarySet, SeparatorError> {
        let total_pages = document.total_pages;

        // ── Strategy 1: model-assisted ───────────────────────────────────
        if self.provider.is_available() && !analysis_text.is_empty() {
            match self.model_boundaries(document, analysis_text).await? {
                Some(boundaries) if !boundaries.is_empty() => {
                    let consolidated = consolidate(boundaries, total_pages);
                    if !consolidated.is_empty() {
                        info!(
                            "model analysis produced {} boundaries",
                            consolidated.len()
                        );
                        return Ok(BoundarySet::new(consolidated, DetectionSource::Model));
                    }
                }
                _ => {}
            }
        }

        // ── Strategy 2: content-based ────────────────────────────────────
        let full_text = document.page_texts.join("\n");
        let detectors: [(&str, Vec<Boundary>); 3] = [
            ("page-marker", content::page_marker_boundaries(&full_text, total_pages)),
            ("account-change", content::account_change_boundaries(&full_text, total_pages)),
            ("header", content::header_boundaries(&full_text, total_pages)),
        ];

        for (name, candidates) in detectors {
            if candidates.len() >= 2 {
                let consolidated = consolidate(candidates, total_pages);
                if !consolidated.is_empty() {
                    info!(
                        "{} detector produced {} boundaries",
                        name,
                        consolidated.len()
                    );
                    return Ok(BoundarySet::new(consolidated, DetectionSource::Content));
                }
            }
        }

        // ── Strategy 3: single-statement default ─────────────────────────
        debug!("no multi-statement signal; defaulting to one boundary");
        Ok(default_set(total_pages))
    }

    /// Run the provider with resilience and hallucination screening.
    /// `Ok(None)` means "strategy unavailable, fall through".
    async fn model_boundaries(
        &self,
        document: &Document,
        analysis_text: &str,
    ) -> Result<Option<Vec<Boundary>>, SeparatorError> {
        let total_pages = document.total_pages;
        let result = call_with_resilience(&self.limiter, &self.backoff, "analyze_boundaries", || {
            self.provider.analyze_boundaries(analysis_text, total_pages)
        })
        .await;

        let candidates = match result {
            Ok(candidates) => candidates,
            Err(ResilientCallError::Provider(e)) => {
                warn!("model analysis failed, falling back: {}", e);
                return Ok(None);
            }
            Err(ResilientCallError::Exhausted { attempts, last_error }) => {
                if self.strictness == Strictness::Strict {
                    return Err(SeparatorError::ProviderExhausted {
                        attempts,
                        last_error: last_error.to_string(),
                    });
                }
                warn!(
                    "provider exhausted after {} attempts ({}), falling back to content detection",
                    attempts, last_error
                );
                return Ok(None);
            }
        };

        let alerts =
            hallucination::validate_boundaries(&candidates, &document.page_texts, total_pages);
        if hallucination::should_reject(&alerts) {
            warn!(
                "model response rejected by hallucination validator ({} alerts)",
                alerts.len()
            );
            for alert in &alerts {
                debug!("alert {:?}/{:?}: {}", alert.kind, alert.severity, alert.description);
            }
            return Ok(None);
        }

        Ok(Some(candidates.into_iter().map(boundary_from_candidate).collect()))
    }
}

fn boundary_from_candidate(c: BoundaryCandidate) -> Boundary {
    Boundary {
        start_page: c.start_page,
        end_page: c.end_page,
        account_number_raw: c.account_number,
        period_raw: c.period,
        confidence: c.confidence.unwrap_or(0.8).clamp(0.0, 1.0),
        reasoning: c.reasoning.unwrap_or_default(),
        source: DetectionSource::Model,
    }
}

/// The never-empty fallback: one statement covering the whole document.
pub fn default_set(total_pages: usize) -> BoundarySet {
    let mut boundary = Boundary::new(1, total_pages.max(1), DetectionSource::Default);
    boundary.confidence = 0.5;
    boundary.reasoning = "no multi-statement signal detected".into();
    BoundarySet::new(vec![boundary], DetectionSource::Default)
}

/// Consolidate candidate boundaries into an ordered, strictly
/// non-overlapping sequence.
///
/// Rules, in order:
/// 1. Clip `end_page` to the document; drop inverted or out-of-range
///    candidates.
/// 2. Walking in `start_page` order, accept any candidate starting after
///    the last accepted boundary ends. Adjacent boundaries
///    (`start == last_end + 1`) are separate statements, never merged —
///    collapsing them is how distinct single-statement runs get lost.
/// 3. A true overlap merges only when both sides name the same normalized
///    account (confidence becomes the minimum), or when neither names one
///    (minimum × 0.8, since the merge is a guess). Overlaps with
///    *different* accounts keep the earlier boundary and discard the
///    later.
pub fn consolidate(candidates: Vec<Boundary>, total_pages: usize) -> Vec<Boundary> {
    let mut candidates: Vec<Boundary> = candidates
        .into_iter()
        .map(|mut b| {
            if b.end_page > total_pages {
                b.end_page = total_pages;
            }
            b
        })
        .filter(|b| b.start_page >= 1 && b.start_page <= b.end_page)
        .collect();

    candidates.sort_by_key(|b| (b.start_page, b.end_page));

    let mut accepted: Vec<Boundary> = Vec::new();
    for b in candidates {
        match accepted.last_mut() {
            None => accepted.push(b),
            Some(a) if b.start_page > a.end_page => accepted.push(b),
            Some(a) => {
                let merged = match (a.normalized_account(), b.normalized_account()) {
                    (Some(x), Some(y)) if x == y => {
                        a.confidence = a.confidence.min(b.confidence);
                        true
                    }
                    (None, None) => {
                        a.confidence = a.confidence.min(b.confidence) * 0.8;
                        true
                    }
                    _ => false,
                };
                if merged {
                    a.end_page = a.end_page.max(b.end_page);
                    debug!(
                        "merged overlapping boundary into pages {}..{}",
                        a.start_page, a.end_page
                    );
                } else {
                    debug!(
                        "discarded overlapping boundary {}..{} (different account)",
                        b.start_page, b.end_page
                    );
                }
            }
        }
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary(start: usize, end: usize, account: Option<&str>, confidence: f64) -> Boundary {
        Boundary {
            start_page: start,
            end_page: end,
            account_number_raw: account.map(str::to_string),
            period_raw: None,
            confidence,
            reasoning: String::new(),
            source: DetectionSource::Content,
        }
    }

    #[test]
    fn adjacent_boundaries_stay_separate() {
        // Regression shape: three adjacent ranges with distinct accounts
        // must survive untouched.
        let input = vec![
            boundary(1, 2, Some("1111 2222"), 0.9),
            boundary(3, 4, Some("3333 4444"), 0.9),
            boundary(5, 6, Some("5555 6666"), 0.9),
        ];
        let out = consolidate(input.clone(), 6);
        assert_eq!(out, input);
    }

    #[test]
    fn same_account_overlap_merges_with_min_confidence() {
        let out = consolidate(
            vec![
                boundary(1, 5, Some("12 34"), 0.9),
                boundary(3, 7, Some("1234"), 0.7),
            ],
            10,
        );
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start_page, out[0].end_page), (1, 7));
        assert_eq!(out[0].confidence, 0.7);
    }

    #[test]
    fn different_account_overlap_keeps_the_earlier() {
        let out = consolidate(
            vec![
                boundary(1, 5, Some("11112222"), 0.9),
                boundary(3, 7, Some("33334444"), 0.9),
            ],
            10,
        );
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start_page, out[0].end_page), (1, 5));
    }

    #[test]
    fn accountless_overlap_merges_with_penalty() {
        let out = consolidate(
            vec![boundary(1, 5, None, 0.9), boundary(3, 7, None, 0.8)],
            10,
        );
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start_page, out[0].end_page), (1, 7));
        assert!((out[0].confidence - 0.8 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn clips_and_drops_invalid_candidates() {
        let out = consolidate(
            vec![
                boundary(1, 99, None, 0.9),
                boundary(5, 3, None, 0.9),
                boundary(0, 2, None, 0.9),
            ],
            6,
        );
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start_page, out[0].end_page), (1, 6));
    }

    #[test]
    fn default_set_covers_the_document() {
        let set = default_set(7);
        assert_eq!(set.detection_method, DetectionSource::Default);
        assert_eq!(set.boundaries.len(), 1);
        assert_eq!(
            (set.boundaries[0].start_page, set.boundaries[0].end_page),
            (1, 7)
        );
        assert_eq!(set.boundaries[0].confidence, 0.5);
    }

    #[test]
    fn consolidated_output_is_strictly_ordered() {
        let out = consolidate(
            vec![
                boundary(4, 6, None, 0.9),
                boundary(1, 2, None, 0.9),
                boundary(3, 3, None, 0.9),
                boundary(2, 3, Some("99998888"), 0.9),
            ],
            8,
        );
        for w in out.windows(2) {
            assert!(w[0].end_page < w[1].start_page);
        }
    }
}
