use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use zeroize::Zeroize;

use crate::providers::ProviderError;
use crate::traits::{Candidate, GenerateResponse, ModelProvider};

/// Google Gemini over the `generateContent` REST endpoint.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl Drop for GeminiProvider {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl GeminiProvider {
    pub fn new(api_key: &str, base_url: &str) -> anyhow::Result<Self> {
        let client = crate::providers::build_http_client(Duration::from_secs(120))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn build_request_body(prompt: &str, media: Option<(&str, &[u8])>) -> Value {
        let mut parts = vec![json!({ "text": prompt })];
        if let Some((mime_type, data)) = media {
            parts.push(json!({
                "inline_data": {
                    "mime_type": mime_type,
                    "data": BASE64.encode(data),
                }
            }));
        }
        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generation_config": {
                "temperature": 0.9,
                "top_p": 1,
                "max_output_tokens": 2048,
            },
        })
    }

    async fn call(&self, model: &str, body: &Value) -> anyhow::Result<GenerateResponse> {
        // Header-based authentication keeps the API key out of URLs,
        // proxies, and error messages.
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        debug!(model, url_prefix = %self.base_url, "Calling Google GenAI");

        let resp = match self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!("Google GenAI HTTP request failed: {}", e);
                return Err(ProviderError::network(&e).into());
            }
        };

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            error!("Failed to read response body: {}", e);
            ProviderError::network(&e)
        })?;

        if !status.is_success() {
            let err = ProviderError::from_status(status.as_u16(), &text);
            error!(model, status = status.as_u16(), "Google GenAI error: {}", err.message);
            return Err(err.into());
        }

        let data: Value = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("malformed Google GenAI response: {}", e))?;
        Ok(parse_response(&data, model))
    }
}

/// Parse a `generateContent` response into ranked candidates, keeping every
/// candidate's ordered text parts. Choosing among candidates is the
/// caller's concern.
fn parse_response(data: &Value, model: &str) -> GenerateResponse {
    let empty = vec![];
    let raw_candidates = data["candidates"].as_array().unwrap_or(&empty);

    if raw_candidates.is_empty() {
        let block_reason = data["promptFeedback"]["blockReason"].as_str().unwrap_or("");
        warn!(model, block_reason, "Gemini returned no candidates");
        return GenerateResponse { candidates: vec![] };
    }

    let candidates = raw_candidates
        .iter()
        .map(|candidate| {
            let parts = candidate["content"]["parts"]
                .as_array()
                .unwrap_or(&empty)
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .map(|t| t.to_string())
                .collect();
            Candidate { parts }
        })
        .collect();

    GenerateResponse { candidates }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn generate(&self, model: &str, prompt: &str) -> anyhow::Result<GenerateResponse> {
        let body = Self::build_request_body(prompt, None);
        self.call(model, &body).await
    }

    async fn generate_with_media(
        &self,
        model: &str,
        prompt: &str,
        mime_type: &str,
        data: &[u8],
    ) -> anyhow::Result<GenerateResponse> {
        let body = Self::build_request_body(prompt, Some((mime_type, data)));
        self.call(model, &body).await
    }
}
