//! Parse provider completions into structured candidates.
//!
//! Models are prompted to return bare JSON but occasionally wrap it in
//! markdown fences or lead with prose anyway. The parser tolerates exactly
//! those two quirks — fence stripping and outermost-object extraction —
//! and nothing more. Anything that still fails to deserialize is a
//! [`ProviderError::MalformedResponse`], which is never retried: a model
//! that produced junk once will usually produce it again, and the
//! deterministic detectors are the better fallback.

use super::{BoundaryCandidate, MetadataCandidate};
use crate::error::ProviderError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*\n(.*)\n```\s*$").unwrap());

#[derive(Debug, Deserialize)]
struct BoundariesEnvelope {
    boundaries: Vec<BoundaryCandidate>,
}

/// Parse a boundary-analysis completion.
pub fn parse_boundaries(raw: &str) -> Result<Vec<BoundaryCandidate>, ProviderError> {
    let json = extract_json_object(raw)?;
    let envelope: BoundariesEnvelope =
        serde_json::from_str(&json).map_err(|e| ProviderError::MalformedResponse {
            detail: format!("boundary schema mismatch: {}", e),
        })?;
    Ok(envelope.boundaries)
}

/// Parse a metadata-extraction completion.
pub fn parse_metadata(raw: &str) -> Result<MetadataCandidate, ProviderError> {
    let json = extract_json_object(raw)?;
    serde_json::from_str(&json).map_err(|e| ProviderError::MalformedResponse {
        detail: format!("metadata schema mismatch: {}", e),
    })
}

/// Strip fences if present, then take the outermost `{ … }` span.
fn extract_json_object(raw: &str) -> Result<String, ProviderError> {
    let trimmed = raw.trim();
    let unfenced = match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    };

    let start = unfenced.find('{');
    let end = unfenced.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(unfenced[s..=e].to_string()),
        _ => Err(ProviderError::MalformedResponse {
            detail: format!(
                "no JSON object in response ({} chars): {:?}",
                unfenced.len(),
                unfenced.chars().take(80).collect::<String>()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let raw = r#"{"boundaries": [{"start_page": 1, "end_page": 3, "account_number": "1234 5678 9012", "confidence": 0.9}]}"#;
        let candidates = parse_boundaries(raw).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].start_page, 1);
        assert_eq!(candidates[0].end_page, 3);
        assert_eq!(candidates[0].confidence, Some(0.9));
        assert_eq!(candidates[0].period, None);
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = "```json\n{\"boundaries\": [{\"start_page\": 1, \"end_page\": 2}]}\n```";
        let candidates = parse_boundaries(raw).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn tolerates_leading_prose() {
        let raw = "Here is the analysis:\n{\"boundaries\": []}";
        assert!(parse_boundaries(raw).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_boundaries("I could not analyze this document.").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn rejects_schema_mismatch() {
        let err = parse_boundaries(r#"{"pages": [1, 2, 3]}"#).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[test]
    fn parses_metadata_with_nulls() {
        let raw = r#"{"bank": "westpac", "account_number": null, "closing_date": "2015-05-21", "confidence": 0.8, "notes": "header match"}"#;
        let meta = parse_metadata(raw).unwrap();
        assert_eq!(meta.bank.as_deref(), Some("westpac"));
        assert_eq!(meta.account_number, None);
        assert_eq!(meta.closing_date.as_deref(), Some("2015-05-21"));
    }
}
