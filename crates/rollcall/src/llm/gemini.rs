//! Google Gemini `generateContent` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use super::endpoint::{EndpointError, InferenceEndpoint, InferencePayload};
use crate::config::GatewaySettings;
use crate::rate_limit::parse_retry_after;

/// Gemini vision endpoint.
pub struct GeminiEndpoint {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl GeminiEndpoint {
    pub fn new(settings: &GatewaySettings) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EndpointError::Failed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            temperature: settings.temperature,
        })
    }

    fn build_request(&self, payload: &InferencePayload) -> GeminiRequest {
        let mut parts = vec![GeminiPart::Text {
            text: payload.prompt.clone(),
        }];
        parts.extend(payload.images.iter().map(|image| GeminiPart::InlineData {
            inline_data: GeminiInlineData {
                mime_type: image.mime_type.clone(),
                data: BASE64.encode(&image.data),
            },
        }));

        GeminiRequest {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: 8192,
            },
        }
    }
}

#[async_trait]
impl InferenceEndpoint for GeminiEndpoint {
    fn name(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    async fn generate(&self, payload: &InferencePayload) -> Result<String, EndpointError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            EndpointError::NotConfigured(
                "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/".to_string(),
            )
        })?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&self.build_request(payload))
            .send()
            .await
            .map_err(|e| EndpointError::Failed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok());
            return Err(EndpointError::RateLimited {
                retry_after: parse_retry_after(retry_after),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EndpointError::Failed(format!(
                "Gemini API error ({}): {}",
                status, body
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| EndpointError::Failed(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = gemini_response.error {
            return Err(EndpointError::Failed(format!(
                "Gemini API error: {}",
                error.message
            )));
        }

        let text: String = gemini_response
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(EndpointError::Failed("Gemini returned no text".to_string()));
        }
        Ok(text)
    }
}
