//! Remote hosted provider speaking the OpenAI-compatible chat protocol.
//!
//! Any endpoint implementing `POST {base}/chat/completions` works —
//! OpenAI itself, Azure front-ends, or proxy gateways. The provider sends
//! a system prompt demanding bare JSON plus one user message, temperature
//! zero, and hands the completion text to the shared parser.
//!
//! Error mapping is deliberately coarse: HTTP 429 → rate limited
//! (transient), request timeout → network timeout (transient), everything
//! else → API error (not retried). Finer-grained status handling has never
//! paid for itself here.

use super::parse;
use super::{BoundaryCandidate, MetadataCandidate, ModelProvider, ProviderInfo};
use crate::error::ProviderError;
use crate::prompts;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

pub struct RemoteProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl RemoteProvider {
    pub fn new(endpoint: String, model: String, api_key: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
            timeout_secs,
        }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let body = json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::NetworkTimeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    ProviderError::Api {
                        status: 0,
                        message: e.to_string(),
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

        let chat: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    detail: format!("chat envelope: {}", e),
                })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse {
                detail: "empty choices array".into(),
            })?;

        debug!("remote completion: {} chars", content.len());
        Ok(content)
    }
}

#[async_trait]
impl ModelProvider for RemoteProvider {
    async fn analyze_boundaries(
        &self,
        text: &str,
        total_pages: usize,
    ) -> Result<Vec<BoundaryCandidate>, ProviderError> {
        let user = prompts::boundary_user_message(text, total_pages);
        let completion = self.complete(prompts::BOUNDARY_SYSTEM_PROMPT, &user).await?;
        parse::parse_boundaries(&completion)
    }

    async fn extract_metadata(
        &self,
        text: &str,
        start_page: usize,
        end_page: usize,
    ) -> Result<MetadataCandidate, ProviderError> {
        let user = prompts::metadata_user_message(text, start_page, end_page);
        let completion = self.complete(prompts::METADATA_SYSTEM_PROMPT, &user).await?;
        parse::parse_metadata(&completion)
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            identifier: "remote",
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_follows_api_key() {
        let with_key = RemoteProvider::new(
            DEFAULT_ENDPOINT.into(),
            DEFAULT_MODEL.into(),
            "sk-test".into(),
            30,
        );
        assert!(with_key.is_available());

        let without = RemoteProvider::new(
            DEFAULT_ENDPOINT.into(),
            DEFAULT_MODEL.into(),
            String::new(),
            30,
        );
        assert!(!without.is_available());
    }

    #[test]
    fn endpoint_trailing_slash_is_normalised() {
        let p = RemoteProvider::new(
            "https://example.test/v1/".into(),
            DEFAULT_MODEL.into(),
            "k".into(),
            30,
        );
        assert_eq!(p.info().endpoint, "https://example.test/v1");
    }
}
