//! HTTP collaborators.
//!
//! - `AnthropicContentGenerator` — Anthropic-compatible Messages API
//! - `HttpAssetLookup` — JSON asset search service
//! - `HttpPriceLookup` — JSON price service
//!
//! API keys are read from the environment variable named in the config.
//! A missing key is a configuration error at construction time.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::collaborators::{AssetLookup, AssetQuery, ContentGenerator, ContentRequest, PriceLookup};
use crate::config::{ContentGeneratorConfig, EndpointConfig};
use crate::error::{GenerationError, RelayError};
use crate::handoff::{AssetDescriptor, PriceSummary};

fn read_api_key(env_name: &str, collaborator: &str) -> Result<String, RelayError> {
    match std::env::var(env_name) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(RelayError::Configuration(format!(
            "{} collaborator needs an API key in ${}",
            collaborator, env_name
        ))),
    }
}

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

fn transport(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout(0)
    } else {
        GenerationError::Transport(e.to_string())
    }
}

/// Calls the Anthropic-compatible Messages API.
///
/// POST {base_url}/v1/messages
/// Headers:
///   x-api-key: {api_key}
///   anthropic-version: 2023-06-01
///   content-type: application/json
pub struct AnthropicContentGenerator {
    client: reqwest::Client,
    config: ContentGeneratorConfig,
    api_key: String,
}

impl AnthropicContentGenerator {
    pub fn from_config(config: &ContentGeneratorConfig) -> Result<Self, RelayError> {
        let api_key = read_api_key(&config.api_key_env, "content")?;
        Ok(Self::with_api_key(config.clone(), api_key))
    }

    pub fn with_api_key(config: ContentGeneratorConfig, api_key: String) -> Self {
        Self {
            client: build_client(),
            config,
            api_key,
        }
    }
}

#[async_trait]
impl ContentGenerator for AnthropicContentGenerator {
    async fn generate(&self, request: &ContentRequest) -> Result<String, GenerationError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": request.full_prompt()
                }
            ]
        });
        if !request.system.is_empty() {
            body["system"] = serde_json::Value::String(request.system.clone());
        }
        if let Some(temp) = self.config.temperature {
            if let Some(n) = serde_json::Number::from_f64(temp) {
                body["temperature"] = serde_json::Value::Number(n);
            }
        }

        tracing::info!(
            "[ContentGenerator] Calling messages API: {} (model: {})",
            url,
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(GenerationError::from_status(status.as_u16(), text));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| GenerationError::InvalidOutput(format!("Response is not JSON: {}", e)))?;

        let content = extract_text_blocks(&json);
        if content.trim().is_empty() {
            return Err(GenerationError::InvalidOutput(
                "Response contained no text blocks".to_string(),
            ));
        }
        Ok(content)
    }
}

/// Join every `{"type": "text"}` block of a Messages API response.
pub fn extract_text_blocks(json: &serde_json::Value) -> String {
    json.get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// POST {base_url}/v1/assets/search with `AssetQuery`, expects `{"assets": [...]}`.
pub struct HttpAssetLookup {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct AssetSearchResponse {
    #[serde(default)]
    assets: Vec<AssetDescriptor>,
}

impl HttpAssetLookup {
    pub fn from_config(config: &EndpointConfig) -> Result<Self, RelayError> {
        Ok(Self {
            client: build_client(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: read_api_key(&config.api_key_env, "assets")?,
        })
    }
}

#[async_trait]
impl AssetLookup for HttpAssetLookup {
    async fn search(&self, query: &AssetQuery) -> Result<Vec<AssetDescriptor>, GenerationError> {
        let url = format!("{}/v1/assets/search", self.base_url);
        tracing::debug!("[AssetLookup] Searching {} for {:?}", url, query.tags);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(query)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status.as_u16(), body));
        }
        let parsed: AssetSearchResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidOutput(format!("Bad asset response: {}", e)))?;
        Ok(parsed.assets)
    }
}

/// GET {base_url}/v1/prices?origin=..&destination=.., expects a `PriceSummary`.
pub struct HttpPriceLookup {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPriceLookup {
    pub fn from_config(config: &EndpointConfig) -> Result<Self, RelayError> {
        Ok(Self {
            client: build_client(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: read_api_key(&config.api_key_env, "pricing")?,
        })
    }
}

#[async_trait]
impl PriceLookup for HttpPriceLookup {
    async fn lowest_price(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<PriceSummary, GenerationError> {
        let url = format!("{}/v1/prices", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("origin", origin), ("destination", destination)])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GenerationError::Unavailable(format!(
                "No price for {} -> {}",
                origin, destination
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status.as_u16(), body));
        }
        response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidOutput(format!("Bad price response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_blocks_skips_non_text() {
        let json = serde_json::json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "second"}
            ]
        });
        assert_eq!(extract_text_blocks(&json), "first\nsecond");
        assert_eq!(extract_text_blocks(&serde_json::json!({})), "");
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let config = ContentGeneratorConfig {
            api_key_env: "RELAY_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..Default::default()
        };
        let err = AnthropicContentGenerator::from_config(&config).err().unwrap();
        assert!(matches!(err, RelayError::Configuration(msg) if msg.contains("RELAY_TEST_KEY_THAT_IS_NEVER_SET")));
    }
}
