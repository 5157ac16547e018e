//! Locally hosted provider speaking the Ollama generate protocol.
//!
//! Local models need no API key and keep bank documents off the network,
//! which is the main reason this variant exists. The generate endpoint is
//! simpler than the chat protocol: one concatenated prompt in, one
//! response string out, with `format: "json"` nudging the model toward
//! parseable output. The shared parser still guards the result — local
//! models disobey formatting instructions more often than hosted ones.

use super::parse;
use super::{BoundaryCandidate, MetadataCandidate, ModelProvider, ProviderInfo};
use crate::error::ProviderError;
use crate::prompts;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1";

pub struct LocalProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl LocalProvider {
    pub fn new(endpoint: String, model: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            timeout_secs,
        }
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.endpoint);
        let body = json!({
            "model": self.model,
            "prompt": format!("{}\n\n{}", system, user),
            "stream": false,
            "format": "json",
            "options": {"temperature": 0.0},
        });

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::NetworkTimeout {
                    secs: self.timeout_secs,
                }
            } else {
                ProviderError::Unavailable {
                    provider: format!("local ({})", e),
                }
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                detail: format!("{} returned 429", url),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let generated: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    detail: format!("generate envelope: {}", e),
                })?;

        debug!("local completion: {} chars", generated.response.len());
        Ok(generated.response)
    }
}

#[async_trait]
impl ModelProvider for LocalProvider {
    async fn analyze_boundaries(
        &self,
        text: &str,
        total_pages: usize,
    ) -> Result<Vec<BoundaryCandidate>, ProviderError> {
        let user = prompts::boundary_user_message(text, total_pages);
        let completion = self.generate(prompts::BOUNDARY_SYSTEM_PROMPT, &user).await?;
        parse::parse_boundaries(&completion)
    }

    async fn extract_metadata(
        &self,
        text: &str,
        start_page: usize,
        end_page: usize,
    ) -> Result<MetadataCandidate, ProviderError> {
        let user = prompts::metadata_user_message(text, start_page, end_page);
        let completion = self.generate(prompts::METADATA_SYSTEM_PROMPT, &user).await?;
        parse::parse_metadata(&completion)
    }

    fn is_available(&self) -> bool {
        !self.endpoint.is_empty()
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            identifier: "local",
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_ollama() {
        let p = LocalProvider::new(DEFAULT_ENDPOINT.into(), DEFAULT_MODEL.into(), 30);
        assert!(p.is_available());
        assert_eq!(p.info().identifier, "local");
        assert_eq!(p.info().endpoint, "http://localhost:11434");
    }
}
