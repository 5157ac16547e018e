//! Model provider abstraction: one capability, three backends.
//!
//! A provider exposes exactly two operations — boundary analysis over the
//! page-marked document text, and metadata extraction over one page range.
//! Three implementations exist: [`remote::RemoteProvider`] (OpenAI-style
//! chat endpoint), [`local::LocalProvider`] (Ollama-style endpoint), and
//! [`NullProvider`] (always unavailable; selected when model assistance is
//! disabled).
//!
//! Selection is a single process-wide configuration choice. There is no
//! implicit multiplexing or fallback *between* providers — fallback is a
//! detection-strategy concern and lives in [`crate::detect`].
//!
//! Callers never invoke a provider directly: every call goes through the
//! resilience layer, and every successful response is screened by the
//! hallucination validator before it is believed.

pub mod local;
mod parse;
pub mod remote;

pub use local::LocalProvider;
pub use remote::RemoteProvider;

use crate::config::{Config, ProviderKind};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A candidate statement range as returned by a provider, before any
/// validation or consolidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCandidate {
    pub start_page: usize,
    pub end_page: usize,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// A candidate metadata triple as returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataCandidate {
    #[serde(default)]
    pub bank: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub closing_date: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Identity of a provider, for logs and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    /// Stable identifier: "remote", "local", or "none".
    pub identifier: &'static str,
    /// Model name the provider will invoke.
    pub model: String,
    /// Endpoint base URL, empty for the null provider.
    pub endpoint: String,
}

/// The uniform model-provider capability.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Propose statement boundaries for the page-marked `text`.
    async fn analyze_boundaries(
        &self,
        text: &str,
        total_pages: usize,
    ) -> Result<Vec<BoundaryCandidate>, ProviderError>;

    /// Extract the metadata triple for one detected page range.
    async fn extract_metadata(
        &self,
        text: &str,
        start_page: usize,
        end_page: usize,
    ) -> Result<MetadataCandidate, ProviderError>;

    /// Cheap availability probe; no network traffic.
    fn is_available(&self) -> bool;

    fn info(&self) -> ProviderInfo;
}

/// The always-unavailable provider, selected when `provider_kind = none`.
///
/// Existing as a real implementation (rather than an `Option`) keeps the
/// detection engine free of special cases: it probes `is_available()` and
/// moves on.
#[derive(Debug, Default)]
pub struct NullProvider;

#[async_trait]
impl ModelProvider for NullProvider {
    async fn analyze_boundaries(
        &self,
        _text: &str,
        _total_pages: usize,
    ) -> Result<Vec<BoundaryCandidate>, ProviderError> {
        Err(ProviderError::Unavailable {
            provider: "none".into(),
        })
    }

    async fn extract_metadata(
        &self,
        _text: &str,
        _start_page: usize,
        _end_page: usize,
    ) -> Result<MetadataCandidate, ProviderError> {
        Err(ProviderError::Unavailable {
            provider: "none".into(),
        })
    }

    fn is_available(&self) -> bool {
        false
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            identifier: "none",
            model: String::new(),
            endpoint: String::new(),
        }
    }
}

/// Construct the configured provider.
pub fn from_config(config: &Config) -> Arc<dyn ModelProvider> {
    match config.provider_kind {
        ProviderKind::Remote => Arc::new(RemoteProvider::new(
            config
                .endpoint
                .clone()
                .unwrap_or_else(|| remote::DEFAULT_ENDPOINT.to_string()),
            config
                .model_name
                .clone()
                .unwrap_or_else(|| remote::DEFAULT_MODEL.to_string()),
            config.api_key.clone().unwrap_or_default(),
            config.provider_timeout_secs,
        )),
        ProviderKind::Local => Arc::new(LocalProvider::new(
            config
                .endpoint
                .clone()
                .unwrap_or_else(|| local::DEFAULT_ENDPOINT.to_string()),
            config
                .model_name
                .clone()
                .unwrap_or_else(|| local::DEFAULT_MODEL.to_string()),
            config.provider_timeout_secs,
        )),
        ProviderKind::None => Arc::new(NullProvider),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn null_provider_is_never_available() {
        let p = NullProvider;
        assert!(!p.is_available());
        assert!(matches!(
            p.analyze_boundaries("text", 3).await,
            Err(ProviderError::Unavailable { .. })
        ));
        assert!(matches!(
            p.extract_metadata("text", 1, 3).await,
            Err(ProviderError::Unavailable { .. })
        ));
        assert_eq!(p.info().identifier, "none");
    }

    #[test]
    fn factory_respects_provider_kind() {
        let config = Config::builder().build().unwrap();
        assert_eq!(from_config(&config).info().identifier, "none");

        let config = Config::builder()
            .provider_kind(ProviderKind::Remote)
            .api_key("sk-test")
            .model_name("gpt-4.1-nano")
            .build()
            .unwrap();
        let provider = from_config(&config);
        assert_eq!(provider.info().identifier, "remote");
        assert_eq!(provider.info().model, "gpt-4.1-nano");

        let config = Config::builder()
            .provider_kind(ProviderKind::Local)
            .build()
            .unwrap();
        assert_eq!(from_config(&config).info().identifier, "local");
    }
}
